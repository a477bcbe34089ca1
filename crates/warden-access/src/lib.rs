//! Resource-scoped authorization for Warden.
//!
//! Every privileged operation is screened by the [`AuthorizationGate`] before
//! it runs. The gate does not answer a plain allow/deny: it computes, for every
//! resource parameter of the operation, the subset of identifiers the caller
//! is entitled to act on and hands that subset to the operation.
//!
//! The crate is organised leaves first:
//! - [`quantifier`]: `FIND` / `MATCH` rule predicates
//! - [`rbac`]: the rule, role, policy and user store
//! - [`descriptor`]: `type:attribute:value` resource descriptors
//! - [`expander`]: descriptor expansion against resource providers
//! - [`evaluator`]: level-ordered, mode-aware permission evaluation
//! - [`context`]: the task-scoped authorization context
//! - [`gate`]: operation registration and the interceptor itself
//! - [`audit`]: one event per gate decision

pub mod audit;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod evaluator;
pub mod expander;
pub mod gate;
pub mod policy;
pub mod quantifier;
pub mod rbac;
pub mod telemetry;

pub use audit::{
    AccessAudit, AuditDecision, AuditEvent, AuditQuery, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use config::{AccessConfig, TelemetryConfig};
pub use context::{AuthContext, Mode};
pub use descriptor::{ResourceDescriptor, ValueToken};
pub use error::{AccessError, AccessResult};
pub use evaluator::{Evaluation, PermissionEvaluator, ResolvedAssignment, Scope};
pub use expander::{ResourceExpander, ResourceProvider, StaticProvider};
pub use gate::{
    Arguments, Authorization, AuthorizationGate, OperationSpec, ResourceBinding, ResourceRequirement,
};
pub use policy::{Assignment, Effect, Policy};
pub use quantifier::Quantifier;
pub use rbac::{AccessSnapshot, RbacStore, Role, Rule, StoreProvider, StoreResource, User};
pub use telemetry::init_telemetry;

/// Wildcard value token: every existing instance of a type/attribute.
pub const WILDCARD: &str = "*";

/// Descriptor naming any resource at all, used by resourceless operations.
pub const ANY_RESOURCE: &str = "*:*:*";

/// Application error code raised for fully denied calls.
pub const ACCESS_DENIED_CODE: u16 = 4000;
