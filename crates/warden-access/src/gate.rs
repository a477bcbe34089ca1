//! Authorization gate.
//!
//! Guarded operations are registered once with an [`OperationSpec`] naming
//! their actions and resource parameters. Every call then goes through
//! [`AuthorizationGate::call`], which:
//!
//! - expands the operation's resource descriptors and the caller's assignment
//!   patterns, concurrently;
//! - evaluates every candidate for every declared action;
//! - refuses the call with [`AccessError::AccessDenied`] when nothing at all is
//!   permitted;
//! - otherwise substitutes the permitted identifiers for the operation's
//!   resource arguments and runs it.

use futures::future::{try_join, try_join_all};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::audit::{AccessAudit, AuditDecision, AuditEvent, InMemoryAuditSink, TracingAuditSink};
use crate::config::AccessConfig;
use crate::context::{AuthContext, Mode};
use crate::descriptor::ResourceDescriptor;
use crate::evaluator::{Evaluation, PermissionEvaluator, ResolvedAssignment, Scope};
use crate::expander::{bound_values, ResourceExpander};
use crate::policy::Assignment;
use crate::rbac::RbacStore;
use crate::{AccessError, AccessResult};

/// Named arguments of a guarded operation.
pub type Arguments = serde_json::Map<String, Value>;

/// One resource parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequirement {
    /// Descriptor to expand.
    pub descriptor: ResourceDescriptor,
    /// Argument receiving the permitted identifiers.
    pub target: Option<String>,
}

impl ResourceRequirement {
    /// Creates a requirement bound to the descriptor's placeholder, if any.
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        let target = descriptor.placeholder().map(str::to_string);
        Self { descriptor, target }
    }

    /// Binds the permitted identifiers to `target`.
    #[must_use]
    pub fn bound_to(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Declaration of a guarded operation.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Operation name.
    pub name: String,
    /// Actions the caller must hold.
    pub actions: Vec<String>,
    /// Resource parameters; empty for resourceless operations.
    pub resources: Vec<ResourceRequirement>,
}

impl OperationSpec {
    /// Creates a spec without actions or resources.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Adds a resource descriptor; `&`-compounds add one requirement per part.
    pub fn resource(mut self, raw: &str) -> AccessResult<Self> {
        self.resources.extend(
            ResourceDescriptor::parse_compound(raw)?
                .into_iter()
                .map(ResourceRequirement::new),
        );
        Ok(self)
    }

    /// Adds a descriptor whose permitted identifiers are bound to `target`.
    pub fn resource_into(mut self, raw: &str, target: impl Into<String>) -> AccessResult<Self> {
        let descriptor = ResourceDescriptor::parse(raw)?;
        self.resources.push(ResourceRequirement::new(descriptor).bound_to(target));
        Ok(self)
    }

    /// Checks if the operation acts on no resource.
    #[must_use]
    pub fn is_resourceless(&self) -> bool {
        self.resources.is_empty()
    }

    fn validate(&self) -> AccessResult<()> {
        if self.name.trim().is_empty() {
            return Err(AccessError::Configuration("operation name is empty".to_string()));
        }
        if self.actions.is_empty() {
            return Err(AccessError::Configuration(format!(
                "operation {} declares no action",
                self.name
            )));
        }
        Ok(())
    }
}

/// Outcome for one resource parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    /// Descriptor that was expanded.
    pub descriptor: ResourceDescriptor,
    /// Argument receiving the permitted identifiers.
    pub target: Option<String>,
    /// Identifiers the operation may act on.
    pub permitted: BTreeSet<String>,
    /// Identifiers refused.
    pub denied: BTreeSet<String>,
    /// Whether the candidates were supplied by the caller.
    pub requested: bool,
}

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Operation name.
    pub operation: String,
    /// One binding per resource parameter, in declaration order.
    pub bindings: Vec<ResourceBinding>,
    /// Set when enforcement was disabled.
    pub bypassed: bool,
}

impl Authorization {
    fn unchecked(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            bindings: Vec::new(),
            bypassed: true,
        }
    }

    /// Permitted identifiers bound to `target`.
    #[must_use]
    pub fn permitted(&self, target: &str) -> Option<&BTreeSet<String>> {
        self.bindings
            .iter()
            .find(|b| b.target.as_deref() == Some(target))
            .map(|b| &b.permitted)
    }

    /// Caller-supplied identifiers that were refused.
    ///
    /// Operations report these as failed items with the access-denied code.
    #[must_use]
    pub fn failed_items(&self) -> BTreeSet<String> {
        self.bindings
            .iter()
            .filter(|b| b.requested)
            .flat_map(|b| b.denied.iter().cloned())
            .collect()
    }

    /// Replaces every bound argument with its permitted identifiers.
    pub fn apply(&self, args: &mut Arguments) {
        for binding in &self.bindings {
            if let Some(target) = &binding.target {
                let ids = binding.permitted.iter().cloned().map(Value::String).collect();
                args.insert(target.clone(), Value::Array(ids));
            }
        }
    }
}

/// The single interceptor in front of every guarded operation.
pub struct AuthorizationGate {
    expander: Arc<ResourceExpander>,
    operations: RwLock<HashMap<String, Arc<OperationSpec>>>,
    audit: AccessAudit,
    history: Option<Arc<InMemoryAuditSink>>,
    enabled: bool,
    default_mode: Mode,
}

impl AuthorizationGate {
    /// Creates an enforcing gate without audit sinks.
    pub fn new(expander: Arc<ResourceExpander>) -> Self {
        Self {
            expander,
            operations: RwLock::new(HashMap::new()),
            audit: AccessAudit::new(),
            history: None,
            enabled: true,
            default_mode: Mode::default(),
        }
    }

    /// Creates a gate from configuration, auditing to `tracing` and to a
    /// bounded decision history.
    pub fn from_config(expander: Arc<ResourceExpander>, config: &AccessConfig) -> Self {
        let history = Arc::new(InMemoryAuditSink::new(config.audit_capacity));
        let audit = AccessAudit::new()
            .with_sink(history.clone())
            .with_sink(Arc::new(TracingAuditSink));

        Self {
            history: Some(history),
            ..Self::new(expander)
                .with_audit(audit)
                .with_enforcement(config.enabled)
                .with_default_mode(config.default_mode)
        }
    }

    /// Replaces the audit sinks.
    #[must_use]
    pub fn with_audit(mut self, audit: AccessAudit) -> Self {
        self.audit = audit;
        self
    }

    /// Turns enforcement on or off.
    #[must_use]
    pub fn with_enforcement(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the mode given to principals resolved through [`Self::context_for`].
    #[must_use]
    pub fn with_default_mode(mut self, mode: Mode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Mode given to principals without an explicit one.
    #[must_use]
    pub fn default_mode(&self) -> Mode {
        self.default_mode
    }

    /// Resolves the context of a stored user under the gate's default mode.
    pub fn context_for(
        &self,
        store: &RbacStore,
        user: &str,
        document: Option<Value>,
    ) -> AccessResult<AuthContext> {
        AuthContext::for_user(store, user, self.default_mode, document)
    }

    /// Checks if enforcement is on.
    #[must_use]
    pub fn is_enforcing(&self) -> bool {
        self.enabled
    }

    /// Recent decisions, when built from configuration.
    #[must_use]
    pub fn history(&self) -> Option<&InMemoryAuditSink> {
        self.history.as_deref()
    }

    /// Registers an operation, replacing any previous spec of the same name.
    pub fn register(&self, spec: OperationSpec) -> AccessResult<()> {
        spec.validate()?;
        debug!(operation = %spec.name, resources = spec.resources.len(), "Operation registered");
        self.operations.write().insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    /// Gets a registered operation.
    pub fn operation(&self, name: &str) -> Option<Arc<OperationSpec>> {
        self.operations.read().get(name).cloned()
    }

    /// Computes what `context` may do through `operation` with `args`.
    ///
    /// Nothing is bound to `args`; see [`Authorization::apply`].
    #[instrument(skip(self, context, args), fields(principal = %context.principal()))]
    pub async fn authorize(
        &self,
        context: &AuthContext,
        operation: &str,
        args: &Arguments,
    ) -> AccessResult<Authorization> {
        let spec = self
            .operation(operation)
            .ok_or_else(|| AccessError::UnknownOperation(operation.to_string()))?;

        if !self.enabled {
            self.audit.record(
                &AuditEvent::new(context, operation, &spec.actions).with_decision(AuditDecision::Bypassed),
            );
            return Ok(Authorization::unchecked(operation));
        }

        match self.decide(context, &spec, args).await {
            Ok(authorization) => {
                let (permitted, denied) = outcome(&authorization.bindings);
                let decision = if denied.is_empty() {
                    AuditDecision::Allowed
                } else {
                    AuditDecision::Partial
                };
                self.audit.record(
                    &AuditEvent::new(context, operation, &spec.actions)
                        .with_decision(decision)
                        .with_outcome(permitted, denied),
                );
                Ok(authorization)
            }
            Err(AccessError::AccessDenied { operation, denied }) => {
                warn!(operation = %operation, mode = ?context.mode(), refused = denied.len(), "Access denied");
                self.audit.record(
                    &AuditEvent::new(context, operation.clone(), &spec.actions)
                        .with_decision(AuditDecision::Denied)
                        .with_outcome(BTreeSet::new(), denied.clone()),
                );
                Err(AccessError::AccessDenied { operation, denied })
            }
            Err(e) => {
                self.audit.record(
                    &AuditEvent::new(context, operation, &spec.actions)
                        .with_decision(AuditDecision::Error)
                        .with_reason(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Authorizes and runs `op` with the permitted identifiers bound.
    ///
    /// `op` is never invoked on a refused call.
    pub async fn call<T, E, F, Fut>(
        &self,
        context: &AuthContext,
        operation: &str,
        mut args: Arguments,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AccessError>,
    {
        let authorization = self.authorize(context, operation, &args).await?;
        authorization.apply(&mut args);
        op(args).await
    }

    /// Like [`AuthorizationGate::call`], with the context installed for the
    /// current task.
    pub async fn call_current<T, E, F, Fut>(&self, operation: &str, args: Arguments, op: F) -> Result<T, E>
    where
        F: FnOnce(Arguments) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<AccessError>,
    {
        let context = AuthContext::current()?;
        self.call(&context, operation, args, op).await
    }

    async fn decide(
        &self,
        context: &AuthContext,
        spec: &OperationSpec,
        args: &Arguments,
    ) -> AccessResult<Authorization> {
        let requirements = if spec.is_resourceless() {
            vec![ResourceRequirement::new(ResourceDescriptor::any())]
        } else {
            spec.resources.clone()
        };

        let candidates = try_join_all(
            requirements
                .iter()
                .map(|r| self.expander.expand(&r.descriptor, args, context)),
        );
        let (assignments, candidates) = try_join(self.resolve_assignments(context, spec), candidates).await?;

        let evaluator = PermissionEvaluator::new(context.mode());
        let mut bindings = Vec::with_capacity(requirements.len());

        for (requirement, candidates) in requirements.into_iter().zip(candidates) {
            let key = requirement.descriptor.key();
            let evaluation = spec
                .actions
                .iter()
                .map(|action| evaluator.evaluate(action, &key, &candidates, &assignments))
                .reduce(Evaluation::intersect)
                .unwrap_or_default();

            let requested = requirement
                .descriptor
                .placeholder()
                .map_or(false, |name| matches!(bound_values(name, args), Ok(Some(_))));

            bindings.push(ResourceBinding {
                target: if spec.is_resourceless() { None } else { requirement.target },
                descriptor: requirement.descriptor,
                permitted: evaluation.permitted,
                denied: evaluation.denied,
                requested,
            });
        }

        if bindings.iter().all(|b| b.permitted.is_empty()) {
            let (_, denied) = outcome(&bindings);
            return Err(AccessError::AccessDenied {
                operation: spec.name.clone(),
                denied,
            });
        }

        debug!(operation = %spec.name, bindings = bindings.len(), "Call authorized");
        Ok(Authorization {
            operation: spec.name.clone(),
            bindings,
            bypassed: false,
        })
    }

    /// Expands the resource patterns of the assignments governing `spec`.
    ///
    /// Each distinct pattern is expanded once per call.
    async fn resolve_assignments(
        &self,
        context: &AuthContext,
        spec: &OperationSpec,
    ) -> AccessResult<Vec<ResolvedAssignment>> {
        let relevant: Vec<(usize, &Assignment)> = context
            .assignments()
            .iter()
            .enumerate()
            .filter(|(_, a)| spec.actions.iter().any(|action| a.matches_action(action)))
            .collect();

        let patterns: Vec<&ResourceDescriptor> = relevant
            .iter()
            .map(|(_, a)| &a.resource)
            .filter(|d| !d.is_any())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let no_args = Arguments::new();
        let expanded = try_join_all(
            patterns
                .iter()
                .map(|pattern| self.expander.expand(pattern, &no_args, context)),
        )
        .await?;
        let cache: HashMap<&ResourceDescriptor, BTreeSet<String>> = patterns.into_iter().zip(expanded).collect();

        Ok(relevant
            .into_iter()
            .map(|(order, assignment)| ResolvedAssignment {
                action: assignment.action.clone(),
                scope: match cache.get(&assignment.resource) {
                    Some(ids) => Scope::Ids {
                        key: assignment.resource.key(),
                        ids: ids.clone(),
                    },
                    None => Scope::Any,
                },
                effect: assignment.effect,
                level: assignment.level,
                order,
                policy: assignment.policy.clone(),
            })
            .collect())
    }
}

fn outcome(bindings: &[ResourceBinding]) -> (BTreeSet<String>, BTreeSet<String>) {
    let permitted = bindings.iter().flat_map(|b| b.permitted.iter().cloned()).collect();
    let denied = bindings.iter().flat_map(|b| b.denied.iter().cloned()).collect();
    (permitted, denied)
}
