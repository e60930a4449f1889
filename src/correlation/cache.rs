//! Correlation Cache
//!
//! Thread-safe keyed store with a per-entry expiry timer and an eviction
//! callback. Each `put` spawns one timer task on the tokio runtime; the task
//! holds only a weak reference to the cache, so dropping the cache drops every
//! pending entry without firing callbacks.
//!
//! Every entry carries a generation number. Expiry removes the entry only if
//! the generation still matches, and explicit removal or replacement takes the
//! entry out of the map under the same shard lock, so each stored value leaves
//! the cache exactly once and the callback fires exactly once for it.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::CorrelationId;
use crate::error::{RumorError, Result};

/// Why an entry left the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Its time-to-live elapsed
    Expired,
    /// A caller removed it
    Removed,
    /// A later `put` for the same key overwrote it
    Replaced,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::Removed => write!(f, "removed"),
            EvictionReason::Replaced => write!(f, "replaced"),
        }
    }
}

/// An entry that has left the cache, handed to the eviction callback
#[derive(Clone, Debug)]
pub struct Evicted<T> {
    pub id: CorrelationId,
    pub value: T,
    pub reason: EvictionReason,
}

pub type EvictionCallback<T> = Arc<dyn Fn(Evicted<T>) + Send + Sync>;

struct CacheEntry<T> {
    value: T,
    generation: u64,
    timer: AbortHandle,
}

struct CacheInner<T> {
    entries: DashMap<CorrelationId, CacheEntry<T>>,
    next_generation: AtomicU64,
    on_evict: Option<EvictionCallback<T>>,
    runtime: Handle,
}

impl<T> CacheInner<T> {
    fn expire(&self, id: CorrelationId, generation: u64) {
        if let Some((id, entry)) = self
            .entries
            .remove_if(&id, |_, entry| entry.generation == generation)
        {
            self.notify(id, entry.value, EvictionReason::Expired);
        }
    }

    fn notify(&self, id: CorrelationId, value: T, reason: EvictionReason) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(Evicted { id, value, reason });
        }
    }
}

impl<T> Drop for CacheInner<T> {
    fn drop(&mut self) {
        for entry in self.entries.iter() {
            entry.timer.abort();
        }
    }
}

/// Generic time-bounded store keyed by [`CorrelationId`]
pub struct CorrelationCache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for CorrelationCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for CorrelationCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationCache")
            .field("entries", &self.inner.entries.len())
            .field("has_eviction_callback", &self.inner.on_evict.is_some())
            .finish()
    }
}

impl<T> CorrelationCache<T> {
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.inner.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl<T: Send + Sync + 'static> CorrelationCache<T> {
    /// Create a cache without an eviction callback.
    ///
    /// Must be called from within a tokio runtime; expiry timers run on it.
    pub fn new() -> Result<Self> {
        Self::build(None)
    }

    /// Create a cache that reports every entry leaving it to `on_evict`.
    ///
    /// The callback runs on the timer task for expiries and on the caller's
    /// thread for removals and replacements. It must not block.
    pub fn with_eviction_callback<F>(on_evict: F) -> Result<Self>
    where
        F: Fn(Evicted<T>) + Send + Sync + 'static,
    {
        Self::build(Some(Arc::new(on_evict)))
    }

    fn build(on_evict: Option<EvictionCallback<T>>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            RumorError::Concurrency(format!("Correlation cache needs a tokio runtime: {}", e))
        })?;
        Ok(Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                next_generation: AtomicU64::new(0),
                on_evict,
                runtime,
            }),
        })
    }

    /// Store or overwrite `value` under `id` and (re)start its expiry countdown
    pub fn put(&self, id: CorrelationId, value: T, ttl: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        // The timer is scheduled while the shard is locked so it can never
        // observe the map before this entry lands in it.
        let replaced = match self.inner.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let timer = self.schedule_expiry(id, generation, ttl);
                Some(occupied.insert(CacheEntry {
                    value,
                    generation,
                    timer,
                }))
            }
            Entry::Vacant(vacant) => {
                let timer = self.schedule_expiry(id, generation, ttl);
                vacant.insert(CacheEntry {
                    value,
                    generation,
                    timer,
                });
                None
            }
        };

        if let Some(previous) = replaced {
            previous.timer.abort();
            self.inner
                .notify(id, previous.value, EvictionReason::Replaced);
        }
    }

    /// Remove the entry for `id`, reporting whether one existed
    pub fn remove(&self, id: &CorrelationId) -> bool {
        match self.inner.entries.remove(id) {
            Some((id, entry)) => {
                entry.timer.abort();
                self.inner.notify(id, entry.value, EvictionReason::Removed);
                true
            }
            None => false,
        }
    }

    /// Atomically update the entry for `id`, creating it with `make` first if absent.
    ///
    /// Updating an existing entry does not restart its countdown; `ttl` only
    /// applies when the entry is created. `update` runs under the key's shard
    /// lock and must not block.
    pub fn modify_or_insert_with<R>(
        &self,
        id: CorrelationId,
        ttl: Duration,
        make: impl FnOnce() -> T,
        update: impl FnOnce(&mut T) -> R,
    ) -> R {
        match self.inner.entries.entry(id) {
            Entry::Occupied(mut occupied) => update(&mut occupied.get_mut().value),
            Entry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let timer = self.schedule_expiry(id, generation, ttl);
                let mut value = make();
                let result = update(&mut value);
                vacant.insert(CacheEntry {
                    value,
                    generation,
                    timer,
                });
                result
            }
        }
    }

    fn schedule_expiry(&self, id: CorrelationId, generation: u64, ttl: Duration) -> AbortHandle {
        let cache: Weak<CacheInner<T>> = Arc::downgrade(&self.inner);
        self.inner
            .runtime
            .spawn(async move {
                tokio::time::sleep(ttl).await;
                if let Some(inner) = cache.upgrade() {
                    inner.expire(id, generation);
                }
            })
            .abort_handle()
    }
}

impl<T: Clone + Send + Sync + 'static> CorrelationCache<T> {
    /// Copy of the entry for `id`, leaving it in place
    pub fn try_get(&self, id: &CorrelationId) -> Option<T> {
        self.inner
            .entries
            .get(id)
            .map(|entry| entry.value().value.clone())
    }
}
