//! Rule, role, policy and user store.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::AuthContext;
use crate::expander::{ResourceExpander, ResourceProvider};
use crate::policy::{Assignment, Policy};
use crate::quantifier::Quantifier;
use crate::{AccessError, AccessResult};

/// Rule binding a predicate to a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule name, unique within the store.
    pub name: String,
    /// Raw predicate body (`{"FIND": ...}` or `{"MATCH": ...}`).
    pub body: Value,
}

impl Rule {
    /// Creates a new rule.
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Parses the body.
    pub fn quantifier(&self) -> AccessResult<Quantifier> {
        Quantifier::parse(&self.name, &self.body)
    }

    /// Evaluates the rule against a document.
    pub fn matches(&self, document: &Value) -> AccessResult<bool> {
        Ok(self.quantifier()?.matches(document))
    }
}

/// Stored rule with its body parsed once on write.
#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    quantifier: Option<Arc<Quantifier>>,
}

impl CompiledRule {
    fn new(rule: Rule) -> Self {
        let quantifier = match rule.quantifier() {
            Ok(quantifier) => Some(Arc::new(quantifier)),
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "Rule body is invalid and will never match");
                None
            }
        };
        Self { rule, quantifier }
    }
}

/// Role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: String,
    /// Policy names, in declaration order.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Rule names granting this role dynamically.
    #[serde(default)]
    pub rules: Vec<String>,
}

impl Role {
    /// Creates a new role.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policies: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Adds a policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policies.push(policy.into());
        self
    }

    /// Adds multiple policies.
    #[must_use]
    pub fn with_policies(mut self, policies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.policies.extend(policies.into_iter().map(Into::into));
        self
    }

    /// Adds a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }
}

/// User definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User name.
    pub name: String,
    /// Directly assigned roles.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether roles may also be granted through rules.
    #[serde(default)]
    pub allow_run_as: bool,
}

impl User {
    /// Creates a new user.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
            allow_run_as: false,
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Allows rule-based role grants.
    #[must_use]
    pub fn run_as(mut self) -> Self {
        self.allow_run_as = true;
        self
    }
}

/// Serialized access model, as exported from the document index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSnapshot {
    /// Rules.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Policies.
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Roles.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Users.
    #[serde(default)]
    pub users: Vec<User>,
}

impl AccessSnapshot {
    /// Decodes a JSON snapshot.
    pub fn from_json(raw: &str) -> AccessResult<Self> {
        serde_json::from_str(raw).map_err(|e| AccessError::Snapshot(e.to_string()))
    }
}

/// In-memory access model.
///
/// Each index sits behind its own lock, so a reader sees every entity either
/// before or after a write, never half-written.
pub struct RbacStore {
    rules: RwLock<HashMap<String, CompiledRule>>,
    policies: RwLock<HashMap<String, Policy>>,
    roles: RwLock<HashMap<String, Role>>,
    users: RwLock<HashMap<String, User>>,
}

impl RbacStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a store seeded from a snapshot.
    pub fn from_snapshot(snapshot: &AccessSnapshot) -> AccessResult<Self> {
        let store = Self::new();
        store.load_snapshot(snapshot)?;
        Ok(store)
    }

    /// Loads every entity of a snapshot.
    ///
    /// The snapshot is validated as a whole first; on error nothing is loaded.
    pub fn load_snapshot(&self, snapshot: &AccessSnapshot) -> AccessResult<()> {
        let mut seen = HashSet::new();
        for rule in &snapshot.rules {
            if !seen.insert(rule.name.as_str()) || self.rules.read().contains_key(&rule.name) {
                return Err(AccessError::DuplicateRule(rule.name.clone()));
            }
        }
        for policy in &snapshot.policies {
            policy.validate()?;
        }

        {
            let mut rules = self.rules.write();
            for rule in &snapshot.rules {
                rules.insert(rule.name.clone(), CompiledRule::new(rule.clone()));
            }
        }
        {
            let mut policies = self.policies.write();
            for policy in &snapshot.policies {
                policies.insert(policy.name.clone(), policy.clone());
            }
        }
        {
            let mut roles = self.roles.write();
            for role in &snapshot.roles {
                roles.insert(role.name.clone(), role.clone());
            }
        }
        {
            let mut users = self.users.write();
            for user in &snapshot.users {
                users.insert(user.name.clone(), user.clone());
            }
        }

        info!(
            rules = snapshot.rules.len(),
            policies = snapshot.policies.len(),
            roles = snapshot.roles.len(),
            users = snapshot.users.len(),
            "Access snapshot loaded"
        );
        Ok(())
    }

    /// Adds a rule; names are unique.
    pub fn add_rule(&self, rule: Rule) -> AccessResult<()> {
        let compiled = CompiledRule::new(rule);
        let mut rules = self.rules.write();
        if rules.contains_key(&compiled.rule.name) {
            return Err(AccessError::DuplicateRule(compiled.rule.name));
        }
        rules.insert(compiled.rule.name.clone(), compiled);
        Ok(())
    }

    /// Replaces an existing rule.
    pub fn update_rule(&self, rule: Rule) -> AccessResult<()> {
        let compiled = CompiledRule::new(rule);
        let mut rules = self.rules.write();
        match rules.get_mut(&compiled.rule.name) {
            Some(existing) => {
                *existing = compiled;
                Ok(())
            }
            None => Err(AccessError::RuleNotFound(compiled.rule.name)),
        }
    }

    /// Removes a rule.
    pub fn remove_rule(&self, name: &str) -> Option<Rule> {
        self.rules.write().remove(name).map(|compiled| compiled.rule)
    }

    /// Gets a rule by name.
    pub fn get_rule(&self, name: &str) -> Option<Rule> {
        self.rules.read().get(name).map(|compiled| compiled.rule.clone())
    }

    /// Lists all rules.
    pub fn get_rules(&self) -> Vec<Rule> {
        self.rules.read().values().map(|compiled| compiled.rule.clone()).collect()
    }

    /// Names of the rules matching `document`.
    ///
    /// Without a document every rule name is returned. Rules whose body cannot
    /// be parsed never match.
    pub fn matching_rules(&self, document: Option<&Value>) -> BTreeSet<String> {
        let Some(document) = document else {
            return self.rules.read().keys().cloned().collect();
        };

        let predicates: Vec<(String, Arc<Quantifier>)> = self
            .rules
            .read()
            .iter()
            .filter_map(|(name, compiled)| Some((name.clone(), compiled.quantifier.clone()?)))
            .collect();

        predicates
            .into_iter()
            .filter(|(_, quantifier)| quantifier.matches(document))
            .map(|(name, _)| name)
            .collect()
    }

    /// Adds or replaces a policy.
    pub fn add_policy(&self, policy: Policy) -> AccessResult<()> {
        policy.validate()?;
        self.policies.write().insert(policy.name.clone(), policy);
        Ok(())
    }

    /// Removes a policy.
    pub fn remove_policy(&self, name: &str) -> Option<Policy> {
        self.policies.write().remove(name)
    }

    /// Gets a policy by name.
    pub fn get_policy(&self, name: &str) -> Option<Policy> {
        self.policies.read().get(name).cloned()
    }

    /// Lists all policies.
    pub fn list_policies(&self) -> Vec<Policy> {
        self.policies.read().values().cloned().collect()
    }

    /// Adds or replaces a role.
    pub fn add_role(&self, role: Role) {
        self.roles.write().insert(role.name.clone(), role);
    }

    /// Removes a role.
    pub fn remove_role(&self, name: &str) -> Option<Role> {
        self.roles.write().remove(name)
    }

    /// Gets a role by name.
    pub fn get_role(&self, name: &str) -> Option<Role> {
        self.roles.read().get(name).cloned()
    }

    /// Lists all roles.
    pub fn list_roles(&self) -> Vec<Role> {
        self.roles.read().values().cloned().collect()
    }

    /// Adds or replaces a user.
    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.name.clone(), user);
    }

    /// Removes a user.
    pub fn remove_user(&self, name: &str) -> Option<User> {
        self.users.write().remove(name)
    }

    /// Gets a user by name.
    pub fn get_user(&self, name: &str) -> Option<User> {
        self.users.read().get(name).cloned()
    }

    /// Lists all users.
    pub fn list_users(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }

    /// Assigns a role to a user.
    pub fn assign_role(&self, user: &str, role: &str) -> AccessResult<()> {
        if !self.roles.read().contains_key(role) {
            return Err(AccessError::RoleNotFound(role.to_string()));
        }

        let mut users = self.users.write();
        let entry = users
            .get_mut(user)
            .ok_or_else(|| AccessError::UserNotFound(user.to_string()))?;
        if !entry.roles.iter().any(|r| r == role) {
            entry.roles.push(role.to_string());
        }
        Ok(())
    }

    /// Removes a role from a user.
    pub fn revoke_role(&self, user: &str, role: &str) {
        if let Some(entry) = self.users.write().get_mut(user) {
            entry.roles.retain(|r| r != role);
        }
    }

    /// Roles held by `user`: direct roles first, then rule-granted roles.
    ///
    /// Rule-granted roles are only considered for users allowed to run as
    /// another identity and when an authorization document is supplied.
    pub fn roles_for(&self, user: &str, document: Option<&Value>) -> AccessResult<Vec<Role>> {
        let user = self
            .get_user(user)
            .ok_or_else(|| AccessError::UserNotFound(user.to_string()))?;

        let roles = self.roles.read();
        let mut granted: Vec<Role> = Vec::new();
        let mut seen = HashSet::new();

        for name in &user.roles {
            match roles.get(name) {
                Some(role) if seen.insert(name.clone()) => granted.push(role.clone()),
                Some(_) => {}
                None => warn!(user = %user.name, role = %name, "User references unknown role"),
            }
        }

        if let (true, Some(document)) = (user.allow_run_as, document) {
            let matched = self.matching_rules(Some(document));
            let mut dynamic: Vec<&Role> = roles
                .values()
                .filter(|role| !seen.contains(&role.name))
                .filter(|role| role.rules.iter().any(|rule| matched.contains(rule)))
                .collect();
            dynamic.sort_by(|a, b| a.name.cmp(&b.name));

            debug!(user = %user.name, granted = dynamic.len(), "Rule-granted roles resolved");
            granted.extend(dynamic.into_iter().cloned());
        }

        Ok(granted)
    }

    /// Effective assignments of `user`, in role then policy declaration order.
    pub fn effective_assignments(
        &self,
        user: &str,
        document: Option<&Value>,
    ) -> AccessResult<Vec<Assignment>> {
        let mut assignments = Vec::new();

        for role in self.roles_for(user, document)? {
            for name in &role.policies {
                match self.get_policy(name) {
                    Some(policy) => assignments.extend(policy.assignments()?),
                    None => warn!(role = %role.name, policy = %name, "Role references unknown policy"),
                }
            }
        }

        Ok(assignments)
    }

    /// Registers the store as the provider of its own resource types.
    pub fn register_with(self: &Arc<Self>, expander: &mut ResourceExpander) {
        for resource in [
            StoreResource::Rule,
            StoreResource::Policy,
            StoreResource::Role,
            StoreResource::User,
        ] {
            expander.register(
                resource.resource_type(),
                Arc::new(StoreProvider {
                    store: Arc::clone(self),
                    resource,
                }),
            );
        }
    }
}

impl Default for RbacStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource types owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreResource {
    /// `rule:*`
    Rule,
    /// `policy:*`
    Policy,
    /// `role:*`
    Role,
    /// `user:*`
    User,
}

impl StoreResource {
    /// Descriptor type name.
    #[must_use]
    pub fn resource_type(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Policy => "policy",
            Self::Role => "role",
            Self::User => "user",
        }
    }
}

/// Expansion of store-owned resource types.
pub struct StoreProvider {
    store: Arc<RbacStore>,
    resource: StoreResource,
}

#[async_trait]
impl ResourceProvider for StoreProvider {
    async fn list_all(&self, _attribute: &str, context: &AuthContext) -> AccessResult<BTreeSet<String>> {
        let names = match self.resource {
            StoreResource::Rule => self.store.matching_rules(context.document()),
            StoreResource::Policy => self.store.policies.read().keys().cloned().collect(),
            StoreResource::Role => self.store.roles.read().keys().cloned().collect(),
            StoreResource::User => self.store.users.read().keys().cloned().collect(),
        };
        Ok(names)
    }
}
