//! Permission evaluation.
//!
//! Given the candidate identifiers of one resource pattern and the caller's
//! assignments, already expanded into concrete scopes, decides which
//! candidates are permitted:
//!
//! 1. only assignments governing the action are considered;
//! 2. among those covering a candidate the highest level wins;
//! 3. DENY wins between equal levels, then the earliest declared;
//! 4. uncovered candidates get the mode's default effect.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::debug;

use crate::context::Mode;
use crate::policy::{action_matches, Effect};

/// Concrete reach of an assignment after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// `*:*:*`: every resource of every type.
    Any,
    /// Identifiers of one `type:attribute` namespace.
    Ids {
        /// `type:attribute`.
        key: String,
        /// Identifiers.
        ids: BTreeSet<String>,
    },
}

impl Scope {
    /// Checks if the scope covers `id` in namespace `key`.
    #[must_use]
    pub fn covers(&self, key: &str, id: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Ids { key: own, ids } => own == key && ids.contains(id),
        }
    }
}

/// Assignment whose resource pattern has been expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssignment {
    /// Action pattern.
    pub action: String,
    /// Expanded scope.
    pub scope: Scope,
    /// Effect.
    pub effect: Effect,
    /// Level.
    pub level: i32,
    /// Declaration order within the caller's assignments.
    pub order: usize,
    /// Originating policy.
    pub policy: String,
}

/// Outcome for one resource pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Candidates the caller may act on.
    pub permitted: BTreeSet<String>,
    /// Candidates refused.
    pub denied: BTreeSet<String>,
}

impl Evaluation {
    /// Keeps only what both evaluations permit.
    #[must_use]
    pub fn intersect(self, other: Evaluation) -> Evaluation {
        let permitted: BTreeSet<String> = self.permitted.intersection(&other.permitted).cloned().collect();
        let denied = self
            .denied
            .into_iter()
            .chain(other.denied)
            .chain(self.permitted.difference(&permitted).cloned().collect::<Vec<_>>())
            .chain(other.permitted.difference(&permitted).cloned().collect::<Vec<_>>())
            .collect();
        Evaluation { permitted, denied }
    }

    /// Checks if nothing was permitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permitted.is_empty()
    }
}

/// Mode-aware evaluator.
#[derive(Debug, Clone, Copy)]
pub struct PermissionEvaluator {
    mode: Mode,
}

impl PermissionEvaluator {
    /// Creates an evaluator for `mode`.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Enforcement mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Winning assignment for one identifier, if any covers it.
    ///
    /// Highest level first, then deny over allow, then the earliest declared.
    pub fn winner<'a>(
        &self,
        action: &str,
        key: &str,
        id: &str,
        assignments: &'a [ResolvedAssignment],
    ) -> Option<&'a ResolvedAssignment> {
        assignments
            .iter()
            .filter(|a| action_matches(&a.action, action) && a.scope.covers(key, id))
            .max_by_key(|a| (a.level, a.effect == Effect::Deny, Reverse(a.order)))
    }

    /// Effect applied to one identifier.
    pub fn decide(&self, action: &str, key: &str, id: &str, assignments: &[ResolvedAssignment]) -> Effect {
        self.winner(action, key, id, assignments)
            .map_or_else(|| self.mode.default_effect(), |a| a.effect)
    }

    /// Splits `candidates` into permitted and denied identifiers.
    pub fn evaluate(
        &self,
        action: &str,
        key: &str,
        candidates: &BTreeSet<String>,
        assignments: &[ResolvedAssignment],
    ) -> Evaluation {
        let (permitted, denied): (BTreeSet<String>, BTreeSet<String>) = candidates
            .iter()
            .cloned()
            .partition(|id| self.decide(action, key, id, assignments).is_allow());

        debug!(
            action,
            key,
            mode = ?self.mode,
            permitted = permitted.len(),
            denied = denied.len(),
            "Permissions evaluated"
        );
        Evaluation { permitted, denied }
    }
}
