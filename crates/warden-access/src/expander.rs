//! Resource descriptor expansion.
//!
//! Turns descriptors into the concrete identifiers they denote at the moment
//! of the call. Wildcards are delegated to the [`ResourceProvider`] owning the
//! resource type; placeholders are read from the call's arguments; literals
//! stand for themselves.

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::context::AuthContext;
use crate::descriptor::{ResourceDescriptor, ValueToken};
use crate::gate::Arguments;
use crate::{AccessError, AccessResult, WILDCARD};

/// Owner of a resource type, able to enumerate its instances.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Lists every existing identifier under `attribute`.
    ///
    /// Failures of the backing store should be reported as
    /// [`AccessError::UpstreamLookupFailure`].
    async fn list_all(&self, attribute: &str, context: &AuthContext) -> AccessResult<BTreeSet<String>>;
}

/// In-memory provider keyed by attribute.
#[derive(Default)]
pub struct StaticProvider {
    ids: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl StaticProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider holding `ids` under `attribute`.
    pub fn with_ids(attribute: impl Into<String>, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let provider = Self::new();
        provider.insert(attribute, ids);
        provider
    }

    /// Adds identifiers under `attribute`.
    pub fn insert(&self, attribute: impl Into<String>, ids: impl IntoIterator<Item = impl Into<String>>) {
        self.ids
            .write()
            .entry(attribute.into())
            .or_default()
            .extend(ids.into_iter().map(Into::into));
    }

    /// Removes an identifier.
    pub fn remove(&self, attribute: &str, id: &str) {
        if let Some(ids) = self.ids.write().get_mut(attribute) {
            ids.remove(id);
        }
    }
}

#[async_trait]
impl ResourceProvider for StaticProvider {
    async fn list_all(&self, attribute: &str, _context: &AuthContext) -> AccessResult<BTreeSet<String>> {
        Ok(self.ids.read().get(attribute).cloned().unwrap_or_default())
    }
}

/// Descriptor expander.
#[derive(Default)]
pub struct ResourceExpander {
    providers: HashMap<String, Arc<dyn ResourceProvider>>,
}

impl ResourceExpander {
    /// Creates an expander without providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provider of `resource_type`, replacing any previous one.
    pub fn register(&mut self, resource_type: impl Into<String>, provider: Arc<dyn ResourceProvider>) {
        self.providers.insert(resource_type.into(), provider);
    }

    /// Checks if a provider is registered for `resource_type`.
    #[must_use]
    pub fn has_provider(&self, resource_type: &str) -> bool {
        self.providers.contains_key(resource_type)
    }

    /// Expands one descriptor.
    pub async fn expand(
        &self,
        descriptor: &ResourceDescriptor,
        params: &Arguments,
        context: &AuthContext,
    ) -> AccessResult<BTreeSet<String>> {
        if descriptor.is_any() {
            return Ok(BTreeSet::from([WILDCARD.to_string()]));
        }

        match descriptor.value() {
            ValueToken::Literal(value) => Ok(BTreeSet::from([value.clone()])),
            ValueToken::Wildcard => self.list_all(descriptor, context).await,
            ValueToken::Placeholder(name) => match bound_values(name, params)? {
                Some(values) => Ok(values),
                None => self.list_all(descriptor, context).await,
            },
        }
    }

    /// Expands a compound descriptor, one set per part in declaration order.
    pub async fn expand_compound(
        &self,
        raw: &str,
        params: &Arguments,
        context: &AuthContext,
    ) -> AccessResult<Vec<BTreeSet<String>>> {
        let parts = ResourceDescriptor::parse_compound(raw)?;
        try_join_all(parts.iter().map(|part| self.expand(part, params, context))).await
    }

    async fn list_all(
        &self,
        descriptor: &ResourceDescriptor,
        context: &AuthContext,
    ) -> AccessResult<BTreeSet<String>> {
        let Some(provider) = self.providers.get(descriptor.resource_type()) else {
            debug!(resource_type = %descriptor.resource_type(), "No provider registered, expanding to nothing");
            return Ok(BTreeSet::new());
        };

        let ids = provider
            .list_all(descriptor.attribute(), context)
            .await
            .map_err(|e| match e {
                AccessError::UpstreamLookupFailure { .. } => e,
                other => AccessError::upstream(descriptor.resource_type(), other),
            })?;

        debug!(descriptor = %descriptor, count = ids.len(), "Wildcard expanded");
        Ok(ids)
    }
}

/// Values bound to placeholder `name`; `None` when the caller left it unset.
///
/// `null`, an absent key and the wildcard token (alone or inside a list) all
/// leave the set unnarrowed. An empty list narrows to nothing, so the
/// parameter binds no candidates.
pub fn bound_values(name: &str, params: &Arguments) -> AccessResult<Option<BTreeSet<String>>> {
    let scalar = |value: &Value| match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(AccessError::MissingParameter(name.to_string())),
    };

    let values: BTreeSet<String> = match params.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items.iter().map(scalar).collect::<AccessResult<_>>()?,
        Some(other) => BTreeSet::from([scalar(other)?]),
    };

    if values.contains(WILDCARD) {
        return Ok(None);
    }
    Ok(Some(values))
}
