//! Authorization context of the request being served.
//!
//! A context is built once per inbound call and never changes afterwards. It
//! travels either as an explicit `&AuthContext` argument or through
//! [`AuthContext::scope`], which makes it visible to [`AuthContext::current`]
//! for the duration of one task only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::policy::{Assignment, Effect};
use crate::rbac::RbacStore;
use crate::{AccessError, AccessResult};

tokio::task_local! {
    static CURRENT: AuthContext;
}

/// Enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Default-permit: anything not explicitly denied is allowed.
    Black,
    /// Default-deny: anything not explicitly allowed is denied.
    #[default]
    White,
}

impl Mode {
    /// Effect applied when no assignment governs a resource.
    #[must_use]
    pub fn default_effect(self) -> Effect {
        match self {
            Self::Black => Effect::Allow,
            Self::White => Effect::Deny,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            other => Err(AccessError::Configuration(format!("unknown rbac mode {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
struct ContextInner {
    principal: String,
    mode: Mode,
    assignments: Vec<Assignment>,
    document: Option<Value>,
}

/// Effective permissions of the current principal.
#[derive(Debug, Clone)]
pub struct AuthContext {
    inner: Arc<ContextInner>,
}

impl AuthContext {
    /// Creates a context from already-resolved assignments.
    pub fn new(principal: impl Into<String>, mode: Mode, assignments: Vec<Assignment>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                principal: principal.into(),
                mode,
                assignments,
                document: None,
            }),
        }
    }

    /// Attaches the authorization document rules are evaluated against.
    #[must_use]
    pub fn with_document(mut self, document: Value) -> Self {
        Arc::make_mut(&mut self.inner).document = Some(document);
        self
    }

    /// Resolves the context of a stored user.
    pub fn for_user(
        store: &RbacStore,
        user: &str,
        mode: Mode,
        document: Option<Value>,
    ) -> AccessResult<Self> {
        let assignments = store.effective_assignments(user, document.as_ref())?;
        let context = Self::new(user, mode, assignments);
        Ok(match document {
            Some(document) => context.with_document(document),
            None => context,
        })
    }

    /// Principal name.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.inner.principal
    }

    /// Enforcement mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// All assignments, in declaration order.
    #[must_use]
    pub fn assignments(&self) -> &[Assignment] {
        &self.inner.assignments
    }

    /// Assignments governing `action`.
    pub fn assignments_for<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a Assignment> + 'a {
        self.inner
            .assignments
            .iter()
            .filter(move |assignment| assignment.matches_action(action))
    }

    /// Authorization document, if one was supplied.
    #[must_use]
    pub fn document(&self) -> Option<&Value> {
        self.inner.document.as_ref()
    }

    /// Runs `future` with this context installed for the current task.
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        CURRENT.scope(self, future).await
    }

    /// Context installed by [`AuthContext::scope`].
    pub fn current() -> AccessResult<Self> {
        CURRENT
            .try_with(Clone::clone)
            .map_err(|_| AccessError::ContextNotSet)
    }
}
