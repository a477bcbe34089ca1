//! Access control error types.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::ACCESS_DENIED_CODE;

/// Access control result type.
pub type AccessResult<T> = Result<T, AccessError>;

/// Access control errors.
#[derive(Error, Debug, Clone)]
pub enum AccessError {
    /// Every declared resource of a guarded call was denied.
    #[error("Permission denied for {operation} ({} resources refused)", denied.len())]
    AccessDenied {
        /// Operation that was refused.
        operation: String,
        /// Caller-supplied identifiers that were refused.
        denied: BTreeSet<String>,
    },

    /// A rule body has an unknown tag or a malformed structure.
    #[error("Invalid body for rule {rule}: {reason}")]
    InvalidRuleBody {
        /// Rule name.
        rule: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A resource provider failed to list its identifiers.
    #[error("Lookup of {resource_type} resources failed: {reason}")]
    UpstreamLookupFailure {
        /// Resource type being expanded.
        resource_type: String,
        /// Provider-supplied reason.
        reason: String,
    },

    /// Resource descriptor does not follow `type:attribute:value`.
    #[error("Invalid resource descriptor: {0}")]
    InvalidDescriptor(String),

    /// Placeholder refers to an argument with an unusable value.
    #[error("Invalid value for parameter {0}")]
    MissingParameter(String),

    /// Invalid policy.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Rule name already taken.
    #[error("Rule already exists: {0}")]
    DuplicateRule(String),

    /// Role not found.
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// Policy not found.
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    /// Rule not found.
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Operation was never registered with the gate.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// No authorization context installed for the current task.
    #[error("No authorization context for the current task")]
    ContextNotSet,

    /// Access model snapshot could not be decoded.
    #[error("Invalid access snapshot: {0}")]
    Snapshot(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AccessError {
    /// Creates an upstream lookup failure.
    pub fn upstream(resource_type: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::UpstreamLookupFailure {
            resource_type: resource_type.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an invalid rule body error.
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRuleBody {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::InvalidRuleBody { .. } => "INVALID_RULE_BODY",
            Self::UpstreamLookupFailure { .. } => "UPSTREAM_LOOKUP_FAILURE",
            Self::InvalidDescriptor(_) => "INVALID_DESCRIPTOR",
            Self::MissingParameter(_) => "MISSING_PARAMETER",
            Self::InvalidPolicy(_) => "INVALID_POLICY",
            Self::DuplicateRule(_) => "DUPLICATE_RULE",
            Self::RoleNotFound(_) => "ROLE_NOT_FOUND",
            Self::PolicyNotFound(_) => "POLICY_NOT_FOUND",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::UnknownOperation(_) => "UNKNOWN_OPERATION",
            Self::ContextNotSet => "CONTEXT_NOT_SET",
            Self::Snapshot(_) => "INVALID_SNAPSHOT",
            Self::Configuration(_) => "CONFIG_ERROR",
        }
    }

    /// Returns the platform application code, if the error carries one.
    #[must_use]
    pub fn application_code(&self) -> Option<u16> {
        match self {
            Self::AccessDenied { .. } => Some(ACCESS_DENIED_CODE),
            _ => None,
        }
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AccessDenied { .. } => 403,
            Self::ContextNotSet => 401,
            Self::RoleNotFound(_)
            | Self::PolicyNotFound(_)
            | Self::RuleNotFound(_)
            | Self::UserNotFound(_)
            | Self::UnknownOperation(_) => 404,
            Self::InvalidDescriptor(_)
            | Self::MissingParameter(_)
            | Self::InvalidPolicy(_)
            | Self::InvalidRuleBody { .. }
            | Self::Snapshot(_)
            | Self::Configuration(_) => 400,
            Self::DuplicateRule(_) => 409,
            Self::UpstreamLookupFailure { .. } => 502,
        }
    }

    /// Returns true for the access-denied outcome.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
