//! Evicting reference cache.
//!
//! [`WeakCache`] stores values behind weak references and keeps a bounded
//! ring of strong references to the most recently read values. A value lives
//! as long as something outside the cache (or the ring) holds a
//! [`CacheRef`] to it. When the last one is released, the value's drop hook
//! posts its key to the reclamation queue, and the entry is purged the next
//! time the cache is written to or sized.
//!
//! ```text
//!   put(k, v) ──▶ delegate[k] = Weak(v) ──────────────┐
//!                                                     │ last CacheRef dropped
//!   get(k) ──▶ upgrade ──▶ ring.push_front(v)          ▼
//!                          ring.len() > cap ⇒ pop   queue ◀── k
//!                                                     │
//!   put / remove / size / clear ──▶ drain queue ──▶ delegate.remove(k)
//! ```
//!
//! Nothing runs in the background: purging piggybacks on those operations.

use crate::cache::{Cache, LockingPolicy};
use crate::config::CacheConfig;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Default number of strongly held, recently read values.
pub const DEFAULT_HARD_LINKS: usize = 256;

type ReclaimHook = Box<dyn FnOnce() + Send>;

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(0);

struct Tracked<V> {
    value: V,
    hooks: Mutex<HashMap<u64, ReclaimHook>>,
}

impl<V> Drop for Tracked<V> {
    fn drop(&mut self) {
        let hooks = std::mem::take(self.hooks.get_mut().unwrap_or_else(PoisonError::into_inner));
        for (_, hook) in hooks {
            hook();
        }
    }
}

/// Reclaim hook owned by one cache entry. Dropping the last copy of the
/// entry unregisters the hook, so a removed or replaced entry never
/// reports its key.
struct Registration<V> {
    id: u64,
    value: Weak<Tracked<V>>,
}

impl<V> Drop for Registration<V> {
    fn drop(&mut self) {
        if let Some(tracked) = self.value.upgrade() {
            tracked
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

/// Strong handle to a cached value.
///
/// Cloning is cheap. The value is reclaimed when the last handle is dropped,
/// at which point every cache holding it is notified.
pub struct CacheRef<V>(Arc<Tracked<V>>);

impl<V> CacheRef<V> {
    pub fn new(value: V) -> Self {
        Self(Arc::new(Tracked {
            value,
            hooks: Mutex::new(HashMap::new()),
        }))
    }

    /// True when both handles point at the same value.
    pub fn ptr_eq(&self, other: &CacheRef<V>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live strong handles.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn on_reclaim(&self, hook: ReclaimHook) -> Registration<V> {
        let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
        self.0
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, hook);
        Registration {
            id,
            value: Arc::downgrade(&self.0),
        }
    }
}

impl<V> Clone for CacheRef<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V> Deref for CacheRef<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.0.value
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for CacheRef<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheRef").field(&self.0.value).finish()
    }
}

/// Entry stored in the delegate: a reference that does not keep the value
/// alive.
///
/// The entry also owns the value's reclaim hook for its cache and key.
/// Clones share the hook; it is released together with the last clone.
pub struct WeakEntry<V> {
    value: Weak<Tracked<V>>,
    _registration: Arc<Registration<V>>,
}

impl<V> WeakEntry<V> {
    fn registered(value: &CacheRef<V>, registration: Registration<V>) -> Self {
        Self {
            value: Arc::downgrade(&value.0),
            _registration: Arc::new(registration),
        }
    }

    /// The value, unless it has been reclaimed.
    pub fn upgrade(&self) -> Option<CacheRef<V>> {
        self.value.upgrade().map(CacheRef)
    }

    pub fn is_reclaimed(&self) -> bool {
        self.value.strong_count() == 0
    }
}

impl<V> Clone for WeakEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Weak::clone(&self.value),
            _registration: Arc::clone(&self._registration),
        }
    }
}

impl<V> std::fmt::Debug for WeakEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakEntry")
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}

/// Cache decorator holding values weakly with a bounded strong-reference ring.
///
/// Declares no lock: mutating operations need `&mut self`, so concurrent use
/// requires an external lock such as
/// [`SynchronizedCache`](crate::cache::SynchronizedCache).
pub struct WeakCache<K, V, D> {
    delegate: D,
    hard_links: VecDeque<CacheRef<V>>,
    number_of_hard_links: usize,
    reclaimed_tx: UnboundedSender<K>,
    reclaimed_rx: UnboundedReceiver<K>,
}

impl<K, V, D> WeakCache<K, V, D>
where
    K: Clone + Send + 'static,
    D: Cache<K, WeakEntry<V>>,
{
    pub fn new(delegate: D) -> Self {
        let (reclaimed_tx, reclaimed_rx) = mpsc::unbounded_channel();
        Self {
            delegate,
            hard_links: VecDeque::new(),
            number_of_hard_links: DEFAULT_HARD_LINKS,
            reclaimed_tx,
            reclaimed_rx,
        }
    }

    /// Build from settings; only `hard_links` applies to this decorator.
    pub fn from_config(delegate: D, config: &CacheConfig) -> Self {
        Self::new(delegate).with_hard_links(config.hard_links)
    }

    /// Set the retention ring capacity
    pub fn with_hard_links(mut self, size: usize) -> Self {
        self.number_of_hard_links = size;
        self
    }

    /// Change the retention ring capacity. A smaller ring is trimmed on the
    /// next `get`.
    pub fn set_hard_links(&mut self, size: usize) {
        self.number_of_hard_links = size;
    }

    pub fn hard_link_capacity(&self) -> usize {
        self.number_of_hard_links
    }

    /// Values currently held strongly, most recently read first.
    pub fn retained(&self) -> impl Iterator<Item = &CacheRef<V>> {
        self.hard_links.iter()
    }

    pub fn retained_len(&self) -> usize {
        self.hard_links.len()
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    fn remove_garbage_collected_items(&mut self) {
        let mut removed = 0usize;
        while let Ok(key) = self.reclaimed_rx.try_recv() {
            // The key may have been re-put with a live value since.
            let stale = self
                .delegate
                .get(&key)
                .is_some_and(|entry| entry.is_reclaimed());
            if stale {
                self.delegate.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(
                "event=cache_purge module=weak_cache id={} removed={}",
                self.delegate.id(),
                removed
            );
        }
    }
}

impl<K, V, D> Cache<K, CacheRef<V>> for WeakCache<K, V, D>
where
    K: Clone + Send + 'static,
    D: Cache<K, WeakEntry<V>>,
{
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&mut self, key: K, value: CacheRef<V>) {
        self.remove_garbage_collected_items();
        let queue = self.reclaimed_tx.clone();
        let reclaimed_key = key.clone();
        let registration = value.on_reclaim(Box::new(move || {
            // The cache may be gone already
            let _ = queue.send(reclaimed_key);
        }));
        self.delegate
            .put(key, WeakEntry::registered(&value, registration));
    }

    fn get(&mut self, key: &K) -> Option<CacheRef<V>> {
        let entry = self.delegate.get(key)?;
        match entry.upgrade() {
            None => {
                self.delegate.remove(key);
                None
            }
            Some(value) => {
                self.hard_links.push_front(value.clone());
                while self.hard_links.len() > self.number_of_hard_links {
                    self.hard_links.pop_back();
                }
                Some(value)
            }
        }
    }

    fn remove(&mut self, key: &K) -> Option<CacheRef<V>> {
        self.remove_garbage_collected_items();
        self.delegate.remove(key).and_then(|entry| entry.upgrade())
    }

    fn clear(&mut self) {
        self.hard_links.clear();
        self.remove_garbage_collected_items();
        self.delegate.clear();
    }

    fn size(&mut self) -> usize {
        self.remove_garbage_collected_items();
        self.delegate.size()
    }

    fn locking_policy(&self) -> LockingPolicy {
        LockingPolicy::None
    }
}

impl<K, V, D> std::fmt::Debug for WeakCache<K, V, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakCache")
            .field("retained", &self.hard_links.len())
            .field("hard_links", &self.number_of_hard_links)
            .finish()
    }
}
