//! Policies and the assignments they grant.

use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceDescriptor;
use crate::{AccessError, AccessResult, WILDCARD};

/// Policy effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Allow access.
    Allow,
    /// Deny access.
    Deny,
}

impl Effect {
    /// Returns true for [`Effect::Allow`].
    #[must_use]
    pub fn is_allow(self) -> bool {
        self == Self::Allow
    }
}

/// Policy document.
///
/// A policy grants `effect` for every combination of its actions and
/// resources. `level` orders conflicting policies: the higher level wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name.
    pub name: String,
    /// Actions (exact, `*`, or `prefix:*`).
    pub actions: Vec<String>,
    /// Resource descriptors; `*:*:*` for resourceless actions.
    pub resources: Vec<String>,
    /// Effect (allow/deny).
    pub effect: Effect,
    /// Priority level.
    #[serde(default)]
    pub level: i32,
}

impl Policy {
    /// Creates an allow policy.
    pub fn allow(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            resources: Vec::new(),
            effect: Effect::Allow,
            level: 0,
        }
    }

    /// Creates a deny policy.
    pub fn deny(name: impl Into<String>) -> Self {
        let mut policy = Self::allow(name);
        policy.effect = Effect::Deny;
        policy
    }

    /// Sets actions.
    #[must_use]
    pub fn for_actions(mut self, actions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.actions = actions.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Sets resources.
    #[must_use]
    pub fn on_resources(mut self, resources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.resources = resources.into_iter().map(|r| r.into()).collect();
        self
    }

    /// Sets the level.
    #[must_use]
    pub fn at_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Checks the policy invariants.
    pub fn validate(&self) -> AccessResult<()> {
        if self.name.trim().is_empty() {
            return Err(AccessError::InvalidPolicy("policy name is empty".to_string()));
        }
        if !self.actions.is_empty() && self.resources.is_empty() {
            return Err(AccessError::InvalidPolicy(format!(
                "{}: actions without resources",
                self.name
            )));
        }
        for resource in &self.resources {
            let descriptor = ResourceDescriptor::parse(resource)?;
            if descriptor.placeholder().is_some() {
                return Err(AccessError::InvalidPolicy(format!(
                    "{}: placeholder in {}",
                    self.name, resource
                )));
            }
        }
        Ok(())
    }

    /// Flattens the policy into one assignment per action and resource.
    pub fn assignments(&self) -> AccessResult<Vec<Assignment>> {
        self.validate()?;

        let mut assignments = Vec::with_capacity(self.actions.len() * self.resources.len());
        for action in &self.actions {
            for resource in &self.resources {
                assignments.push(Assignment {
                    action: action.clone(),
                    resource: ResourceDescriptor::parse(resource)?,
                    effect: self.effect,
                    level: self.level,
                    policy: self.name.clone(),
                });
            }
        }
        Ok(assignments)
    }
}

/// One `(action, resource, effect, level)` grant held by a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Action pattern.
    pub action: String,
    /// Resource pattern.
    pub resource: ResourceDescriptor,
    /// Effect.
    pub effect: Effect,
    /// Level.
    pub level: i32,
    /// Name of the policy it came from.
    pub policy: String,
}

impl Assignment {
    /// Creates a standalone assignment.
    pub fn new(
        action: impl Into<String>,
        resource: &str,
        effect: Effect,
        level: i32,
    ) -> AccessResult<Self> {
        let action = action.into();
        let descriptor = ResourceDescriptor::parse(resource)?;
        if descriptor.placeholder().is_some() {
            return Err(AccessError::InvalidPolicy(format!(
                "{}: placeholder in {}",
                action, resource
            )));
        }
        Ok(Self {
            policy: format!("{}@{}", action, resource),
            action,
            resource: descriptor,
            effect,
            level,
        })
    }

    /// Checks if this assignment governs `action`.
    #[must_use]
    pub fn matches_action(&self, action: &str) -> bool {
        action_matches(&self.action, action)
    }
}

/// Matches an action pattern: exact, `*`, or prefix wildcard (`agent:*`).
#[must_use]
pub fn action_matches(pattern: &str, action: &str) -> bool {
    if pattern == action || pattern.split(':').all(|part| part == WILDCARD) {
        return true;
    }
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => action.starts_with(prefix),
        None => false,
    }
}
