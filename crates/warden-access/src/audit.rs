//! Gate decision auditing.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::context::{AuthContext, Mode};

/// Audited gate decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event ID.
    pub id: String,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
    /// Principal the call ran for.
    pub principal: String,
    /// Guarded operation.
    pub operation: String,
    /// Actions checked.
    pub actions: Vec<String>,
    /// Enforcement mode.
    pub mode: Mode,
    /// Decision.
    pub decision: AuditDecision,
    /// Identifiers the operation was allowed to act on.
    pub permitted: BTreeSet<String>,
    /// Identifiers refused.
    pub denied: BTreeSet<String>,
    /// Failure reason, for errored decisions.
    pub reason: Option<String>,
}

/// Audit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDecision {
    /// Every candidate permitted.
    Allowed,
    /// Some candidates refused, the call went ahead.
    Partial,
    /// Call refused.
    Denied,
    /// Enforcement disabled, the call went ahead unchecked.
    Bypassed,
    /// Evaluation failed.
    Error,
}

impl AuditEvent {
    /// Creates an event for `operation` run by the principal of `context`.
    pub fn new(context: &AuthContext, operation: impl Into<String>, actions: &[String]) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            principal: context.principal().to_string(),
            operation: operation.into(),
            actions: actions.to_vec(),
            mode: context.mode(),
            decision: AuditDecision::Allowed,
            permitted: BTreeSet::new(),
            denied: BTreeSet::new(),
            reason: None,
        }
    }

    /// Sets the decision.
    #[must_use]
    pub fn with_decision(mut self, decision: AuditDecision) -> Self {
        self.decision = decision;
        self
    }

    /// Sets the permitted and denied identifiers.
    #[must_use]
    pub fn with_outcome(mut self, permitted: BTreeSet<String>, denied: BTreeSet<String>) -> Self {
        self.permitted = permitted;
        self.denied = denied;
        self
    }

    /// Sets the failure reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Audit log sink trait.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &AuditEvent);

    /// Flushes any buffered events.
    fn flush(&self) {}
}

/// Bounded in-memory sink; the oldest events are dropped first.
pub struct InMemoryAuditSink {
    events: RwLock<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl InMemoryAuditSink {
    /// Creates a sink keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Returns all events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Returns the events matching `query`.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let events = self.events.read();
        let matching = events.iter().filter(|e| query.matches(e)).cloned();
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Clears all events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        let mut events = self.events.write();
        if events.len() == self.capacity {
            events.pop_front();
        }
        if self.capacity > 0 {
            events.push_back(event.clone());
        }
    }
}

/// Sink writing decisions to `tracing`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event.decision {
            AuditDecision::Allowed | AuditDecision::Partial | AuditDecision::Bypassed => {
                tracing::info!(
                    principal = %event.principal,
                    operation = %event.operation,
                    decision = ?event.decision,
                    permitted = event.permitted.len(),
                    denied = event.denied.len(),
                    "Access audit"
                );
            }
            AuditDecision::Denied => {
                tracing::warn!(
                    principal = %event.principal,
                    operation = %event.operation,
                    mode = ?event.mode,
                    denied = ?event.denied,
                    "Access audit"
                );
            }
            AuditDecision::Error => {
                tracing::error!(
                    principal = %event.principal,
                    operation = %event.operation,
                    reason = ?event.reason,
                    "Access audit"
                );
            }
        }
    }
}

/// Fan-out to every configured sink.
#[derive(Default, Clone)]
pub struct AccessAudit {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AccessAudit {
    /// Creates an audit without sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Adds a sink.
    pub fn add_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Records an event to all sinks.
    pub fn record(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }

    /// Flushes all sinks.
    pub fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Filter over recorded events.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Filter by principal.
    pub principal: Option<String>,
    /// Filter by operation.
    pub operation: Option<String>,
    /// Filter by decision.
    pub decision: Option<AuditDecision>,
    /// Start time.
    pub start_time: Option<DateTime<Utc>>,
    /// End time.
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// Creates a query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by principal.
    #[must_use]
    pub fn for_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Filters by operation.
    #[must_use]
    pub fn for_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Filters by decision.
    #[must_use]
    pub fn with_decision(mut self, decision: AuditDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Filters by time range.
    #[must_use]
    pub fn in_time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Caps the result count.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Matches an event against this query.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.principal.as_ref().map_or(true, |p| &event.principal == p)
            && self.operation.as_ref().map_or(true, |o| &event.operation == o)
            && self.decision.map_or(true, |d| event.decision == d)
            && self.start_time.map_or(true, |start| event.timestamp >= start)
            && self.end_time.map_or(true, |end| event.timestamp <= end)
    }
}
