//! Configuration-time assembly.
//!
//! [`Configuration`] is where the object graph is put together before any
//! request runs: interceptors are registered (with their properties) into the
//! chain, mapping contracts and their statements are registered, and every
//! extensible component is passed through the whole chain exactly once.
//!
//! Settings types ([`Properties`], [`CacheConfig`]) are plain serde structs
//! so they can be loaded by whatever configuration source the host uses.

use crate::binding::{ContractRegistry, DispatchProxy, Session, StatementCatalog, StatementKind};
use crate::cache::{Cache, LockingPolicy, PerpetualCache, SynchronizedCache};
use crate::chain::InterceptorChain;
use crate::component::Component;
use crate::contract::Contract;
use crate::errors::{PluginError, PluginResult};
use crate::interceptor::Interceptor;
use crate::points;
use crate::types::Value;
use crate::weak_cache::{CacheRef, WeakCache, WeakEntry, DEFAULT_HARD_LINKS};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════

/// String-keyed settings handed to an interceptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    values: HashMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property. A value that cannot be serialized is logged and left out.
    pub fn set(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        if let Err(err) = self.insert(key.as_str(), value) {
            warn!(
                "event=property_set module=config status=error key={} error={}",
                key, err
            );
        }
        self
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) -> PluginResult<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| {
            PluginError::configuration("properties", format!("property {}: {}", key, e))
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Get a property as `T`, if present and convertible
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get a property as `T`, failing when it is missing or has the wrong shape
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> PluginResult<T> {
        let value = self.values.get(key).ok_or_else(|| {
            PluginError::configuration("properties", format!("missing property {}", key))
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            PluginError::configuration("properties", format!("property {}: {}", key, e))
        })
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════
// CACHE SETTINGS
// ═══════════════════════════════════════════════════════════════════

/// How a configured cache will be accessed. Has no default: every cache
/// configuration states it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// One owner at a time; the cache is used through `&mut`.
    Exclusive,

    /// Shared between threads behind a mutex.
    Synchronized,
}

fn default_hard_links() -> usize {
    DEFAULT_HARD_LINKS
}

/// Settings for one evicting reference cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache identifier
    pub id: String,

    /// Retention ring capacity
    #[serde(default = "default_hard_links")]
    pub hard_links: usize,

    /// Stated concurrency expectation
    pub concurrency: Concurrency,
}

impl CacheConfig {
    pub fn new(id: impl Into<String>, concurrency: Concurrency) -> Self {
        Self {
            id: id.into(),
            hard_links: DEFAULT_HARD_LINKS,
            concurrency,
        }
    }

    /// Set the retention ring capacity
    pub fn hard_links(mut self, hard_links: usize) -> Self {
        self.hard_links = hard_links;
        self
    }

    pub fn validate(&self) -> PluginResult<()> {
        if self.id.trim().is_empty() {
            return Err(PluginError::configuration("cache", "cache id must not be empty"));
        }
        Ok(())
    }

    /// Build a weak cache over a [`PerpetualCache`] according to these settings.
    pub fn build<K, V>(&self) -> PluginResult<ConfiguredCache<K, V>>
    where
        K: Eq + Hash + Clone + Send + 'static,
    {
        self.validate()?;
        let cache = WeakCache::from_config(PerpetualCache::new(self.id.as_str()), self);
        debug!(
            "event=cache_build module=config id={} hard_links={} concurrency={:?}",
            self.id, self.hard_links, self.concurrency
        );
        Ok(match self.concurrency {
            Concurrency::Exclusive => ConfiguredCache::Exclusive(cache),
            Concurrency::Synchronized => {
                ConfiguredCache::Synchronized(SynchronizedCache::new::<K, CacheRef<V>>(cache))
            }
        })
    }
}

/// Weak cache over the default store.
pub type DefaultWeakCache<K, V> = WeakCache<K, V, PerpetualCache<K, WeakEntry<V>>>;

/// A cache built from a [`CacheConfig`].
pub enum ConfiguredCache<K, V> {
    Exclusive(DefaultWeakCache<K, V>),
    Synchronized(SynchronizedCache<DefaultWeakCache<K, V>>),
}

impl<K, V> ConfiguredCache<K, V> {
    /// A cloneable shared handle, when built as [`Concurrency::Synchronized`].
    pub fn shared(&self) -> Option<SynchronizedCache<DefaultWeakCache<K, V>>> {
        match self {
            Self::Exclusive(_) => None,
            Self::Synchronized(shared) => Some(shared.clone()),
        }
    }
}

impl<K, V> Cache<K, CacheRef<V>> for ConfiguredCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn id(&self) -> &str {
        match self {
            Self::Exclusive(cache) => cache.id(),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::id(cache),
        }
    }

    fn put(&mut self, key: K, value: CacheRef<V>) {
        match self {
            Self::Exclusive(cache) => cache.put(key, value),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::put(cache, key, value),
        }
    }

    fn get(&mut self, key: &K) -> Option<CacheRef<V>> {
        match self {
            Self::Exclusive(cache) => cache.get(key),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::get(cache, key),
        }
    }

    fn remove(&mut self, key: &K) -> Option<CacheRef<V>> {
        match self {
            Self::Exclusive(cache) => cache.remove(key),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::remove(cache, key),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Exclusive(cache) => cache.clear(),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::clear(cache),
        }
    }

    fn size(&mut self) -> usize {
        match self {
            Self::Exclusive(cache) => cache.size(),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::size(cache),
        }
    }

    fn locking_policy(&self) -> LockingPolicy {
        match self {
            Self::Exclusive(cache) => cache.locking_policy(),
            Self::Synchronized(cache) => Cache::<K, CacheRef<V>>::locking_policy(cache),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════

/// Configuration-time registry of interceptors, contracts and statements.
///
/// Build it once, then share it read-only (for example behind an `Arc`).
#[derive(Debug, Default)]
pub struct Configuration {
    interceptor_chain: InterceptorChain,
    contracts: ContractRegistry,
    statements: StatementCatalog,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `interceptor` with `properties` and append it to the chain.
    pub fn add_interceptor<I>(&mut self, mut interceptor: I, properties: &Properties) -> PluginResult<()>
    where
        I: Interceptor + 'static,
    {
        if let Err(err) = interceptor.set_properties(properties) {
            warn!(
                "event=interceptor_configure module=config status=error interceptor={} error={}",
                interceptor.name(),
                err
            );
            return Err(err);
        }
        self.interceptor_chain.add_interceptor(Arc::new(interceptor));
        Ok(())
    }

    /// Append an already configured, shared interceptor.
    pub fn add_shared_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptor_chain.add_interceptor(interceptor);
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.interceptor_chain.interceptors()
    }

    pub fn interceptor_chain(&self) -> &InterceptorChain {
        &self.interceptor_chain
    }

    /// Apply every registered interceptor to `target`.
    pub fn plugin(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.interceptor_chain.plugin_all(target)
    }

    fn new_point(&self, point: &str, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        if !target.implements(point) {
            return Err(PluginError::configuration(
                target.component_type().name(),
                format!("component does not implement {}", point),
            ));
        }
        self.plugin(target)
    }

    /// Wrap a freshly created executor.
    pub fn new_executor(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.new_point(points::EXECUTOR, target)
    }

    /// Wrap a freshly created statement handler.
    pub fn new_statement_handler(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.new_point(points::STATEMENT_HANDLER, target)
    }

    /// Wrap a freshly created parameter handler.
    pub fn new_parameter_handler(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.new_point(points::PARAMETER_HANDLER, target)
    }

    /// Wrap a freshly created result-set handler.
    pub fn new_result_set_handler(&self, target: Arc<dyn Component>) -> PluginResult<Arc<dyn Component>> {
        self.new_point(points::RESULT_SET_HANDLER, target)
    }

    pub fn add_contract(&mut self, contract: Arc<Contract>) -> PluginResult<()> {
        self.contracts.add_contract(contract)
    }

    pub fn has_contract(&self, name: &str) -> bool {
        self.contracts.has_contract(name)
    }

    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    /// Dispatch proxy for a registered contract.
    pub fn proxy(&self, name: &str, session: Arc<dyn Session>) -> PluginResult<Arc<DispatchProxy>> {
        self.contracts.proxy(name, session)
    }

    pub fn add_statement(&mut self, id: impl Into<String>, kind: StatementKind) {
        self.statements.add(id, kind);
    }

    pub fn statements(&self) -> &StatementCatalog {
        &self.statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_typed_access() {
        let props = Properties::new()
            .set("threshold_ms", 250)
            .set("label", "slow-query");

        assert_eq!(props.get::<u64>("threshold_ms"), Some(250));
        assert_eq!(props.get_string("label"), Some("slow-query".to_string()));
        assert!(props.get::<u64>("label").is_none());
        assert!(props.require::<u64>("missing").is_err());
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_unserializable_property_is_rejected() {
        let mut by_pair = HashMap::new();
        by_pair.insert((1u8, 2u8), "pair");

        let mut props = Properties::new();
        let err = props.insert("pairs", &by_pair).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Configuration);
        assert!(err.to_string().contains("property pairs"));
        assert!(!props.contains("pairs"));

        let props = Properties::new().set("pairs", &by_pair).set("limit", 5);
        assert!(!props.contains("pairs"));
        assert_eq!(props.get::<u32>("limit"), Some(5));
    }

    #[test]
    fn test_properties_deserialize() {
        let props: Properties = serde_json::from_str(r#"{"limit": 10}"#).unwrap();
        assert_eq!(props.require::<u32>("limit").unwrap(), 10);
    }

    #[test]
    fn test_cache_config_requires_concurrency() {
        let missing = serde_json::from_str::<CacheConfig>(r#"{"id": "users"}"#);
        assert!(missing.is_err());

        let config: CacheConfig =
            serde_json::from_str(r#"{"id": "users", "concurrency": "exclusive"}"#).unwrap();
        assert_eq!(config.hard_links, DEFAULT_HARD_LINKS);
        assert_eq!(config.concurrency, Concurrency::Exclusive);
    }

    #[test]
    fn test_cache_config_builds_requested_policy() {
        let mut exclusive = CacheConfig::new("a", Concurrency::Exclusive)
            .build::<String, u32>()
            .unwrap();
        assert_eq!(exclusive.locking_policy(), LockingPolicy::None);
        assert!(exclusive.shared().is_none());

        let value = CacheRef::new(7u32);
        exclusive.put("k".to_string(), value.clone());
        assert_eq!(exclusive.get(&"k".to_string()).map(|v| *v), Some(7));

        let synchronized = CacheConfig::new("b", Concurrency::Synchronized)
            .hard_links(8)
            .build::<String, u32>()
            .unwrap();
        assert_eq!(synchronized.locking_policy(), LockingPolicy::Mutex);
        assert_eq!(synchronized.id(), "b");
        assert!(synchronized.shared().is_some());
    }

    #[test]
    fn test_empty_cache_id_rejected() {
        let err = CacheConfig::new(" ", Concurrency::Exclusive)
            .build::<String, u32>()
            .err()
            .unwrap();
        assert!(err.to_string().contains("cache id"));
    }
}
