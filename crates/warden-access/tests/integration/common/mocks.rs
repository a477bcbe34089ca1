//! Mock resource providers.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use warden_access::{AccessError, AccessResult, AuthContext, ResourceProvider};

/// Provider whose backing index is down.
pub struct FailingProvider;

#[async_trait]
impl ResourceProvider for FailingProvider {
    async fn list_all(&self, _attribute: &str, _context: &AuthContext) -> AccessResult<BTreeSet<String>> {
        Err(AccessError::upstream("agent", "indexer unreachable"))
    }
}

/// Provider that never answers.
pub struct StalledProvider;

#[async_trait]
impl ResourceProvider for StalledProvider {
    async fn list_all(&self, _attribute: &str, _context: &AuthContext) -> AccessResult<BTreeSet<String>> {
        futures::future::pending::<()>().await;
        Ok(BTreeSet::new())
    }
}

/// Provider counting how often it is asked.
pub struct CountingProvider {
    ids: BTreeSet<String>,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProvider for CountingProvider {
    async fn list_all(&self, _attribute: &str, _context: &AuthContext) -> AccessResult<BTreeSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.ids.clone())
    }
}
