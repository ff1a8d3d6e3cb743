//! Cache decorator contract.
//!
//! Caches are built by stacking decorators over a plain store. Every
//! decorator implements [`Cache`] and owns its delegate. Mutating operations
//! take `&mut self`: a cache declares no lock of its own unless it says so
//! through [`Cache::locking_policy`], and sharing one across threads means
//! wrapping it in [`SynchronizedCache`] (or another lock the caller owns).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How a cache serializes concurrent access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingPolicy {
    /// No lock of its own; the caller provides a single synchronization
    /// scope per operation.
    None,

    /// Every operation runs under an internal mutex.
    Mutex,
}

/// A key/value store, possibly decorating another one.
pub trait Cache<K, V> {
    /// Identifier of the cache (shared by every decorator in a stack).
    fn id(&self) -> &str;

    /// Insert or replace.
    fn put(&mut self, key: K, value: V);

    fn get(&mut self, key: &K) -> Option<V>;

    fn remove(&mut self, key: &K) -> Option<V>;

    fn clear(&mut self);

    /// Number of held entries.
    fn size(&mut self) -> usize;

    fn locking_policy(&self) -> LockingPolicy {
        LockingPolicy::None
    }
}

/// Plain `HashMap` store at the bottom of a decorator stack.
#[derive(Debug, Clone)]
pub struct PerpetualCache<K, V> {
    id: String,
    entries: HashMap<K, V>,
}

impl<K, V> PerpetualCache<K, V> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: HashMap::new(),
        }
    }
}

impl<K, V> Cache<K, V> for PerpetualCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    fn get(&mut self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn size(&mut self) -> usize {
        self.entries.len()
    }
}

/// Cloneable handle serializing every operation on the wrapped cache.
#[derive(Debug)]
pub struct SynchronizedCache<C> {
    id: String,
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for SynchronizedCache<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> SynchronizedCache<C> {
    pub fn new<K, V>(cache: C) -> Self
    where
        C: Cache<K, V>,
    {
        Self {
            id: cache.id().to_string(),
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the wrapped cache.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn put<K, V>(&self, key: K, value: V)
    where
        C: Cache<K, V>,
    {
        self.lock().put(key, value)
    }

    pub fn get<K, V>(&self, key: &K) -> Option<V>
    where
        C: Cache<K, V>,
    {
        self.lock().get(key)
    }

    pub fn remove<K, V>(&self, key: &K) -> Option<V>
    where
        C: Cache<K, V>,
    {
        self.lock().remove(key)
    }

    pub fn clear<K, V>(&self)
    where
        C: Cache<K, V>,
    {
        self.lock().clear()
    }

    pub fn size<K, V>(&self) -> usize
    where
        C: Cache<K, V>,
    {
        self.lock().size()
    }
}

impl<K, V, C> Cache<K, V> for SynchronizedCache<C>
where
    C: Cache<K, V>,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&mut self, key: K, value: V) {
        self.lock().put(key, value)
    }

    fn get(&mut self, key: &K) -> Option<V> {
        self.lock().get(key)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    fn clear(&mut self) {
        self.lock().clear()
    }

    fn size(&mut self) -> usize {
        self.lock().size()
    }

    fn locking_policy(&self) -> LockingPolicy {
        LockingPolicy::Mutex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perpetual_cache() {
        let mut cache = PerpetualCache::new("users");
        cache.put("a", 1);
        cache.put("a", 2);
        cache.put("b", 3);
        assert_eq!(cache.id(), "users");
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.remove(&"b"), Some(3));
        cache.clear();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.locking_policy(), LockingPolicy::None);
    }

    #[test]
    fn test_synchronized_cache_shares_state() {
        let shared = SynchronizedCache::new::<u32, u32>(PerpetualCache::new("shared"));
        std::thread::scope(|scope| {
            for t in 0..4u32 {
                let handle = shared.clone();
                scope.spawn(move || {
                    for i in 0..25 {
                        handle.put(t * 100 + i, i);
                    }
                });
            }
        });
        assert_eq!(shared.size::<u32, u32>(), 100);
        assert_eq!(shared.get::<u32, u32>(&301), Some(1));
        assert_eq!(
            Cache::<u32, u32>::locking_policy(&shared),
            LockingPolicy::Mutex
        );
    }
}
