//! File-backed memoization of expensive calls

use super::keys::{default_hasher, CacheKey, CallArgs, KeyHasher};
use super::store::CacheStore;
use super::{CacheError, CacheValue};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// When freshly computed values reach disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteSchedule {
    /// Written before `call` returns
    #[default]
    Immediate,
    /// Held in memory until [`Memoizer::flush`] or until the memoizer is dropped.
    /// A process killed before either happens loses these entries.
    Deferred,
}

impl FromStr for WriteSchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "deferred" | "atexit" => Ok(Self::Deferred),
            other => Err(format!("unknown cache schedule '{}'", other)),
        }
    }
}

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Wraps a computation with a [`CacheStore`].
///
/// The wrapped computation is assumed to be referentially transparent: once a
/// key is stored, the stored value is returned and the computation is never
/// run again for it. Concurrent misses on one key run the computation once.
pub struct Memoizer<V: CacheValue> {
    name: String,
    store: CacheStore<V>,
    hasher: KeyHasher,
    schedule: WriteSchedule,
    pending: Mutex<VecDeque<(CacheKey, V)>>,
    inflight: Mutex<HashMap<CacheKey, Slot>>,
}

/// Holds a per-key slot for the duration of one `call`, including a cancelled one
struct SlotGuard<'a, V: CacheValue> {
    memo: &'a Memoizer<V>,
    key: CacheKey,
    slot: Slot,
}

impl<V: CacheValue> Drop for SlotGuard<'_, V> {
    fn drop(&mut self) {
        let mut inflight = self.memo.lock_inflight();
        // One reference is held by the map and one by us; anything more is a waiter.
        if Arc::strong_count(&self.slot) <= 2 {
            inflight.remove(&self.key);
        }
    }
}

impl<V: CacheValue> Memoizer<V> {
    pub fn new(name: impl Into<String>, store: CacheStore<V>, schedule: WriteSchedule) -> Self {
        Self {
            name: name.into(),
            store,
            hasher: default_hasher(),
            schedule,
            pending: Mutex::new(VecDeque::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the key derivation function
    pub fn with_hasher(mut self, hasher: KeyHasher) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &CacheStore<V> {
        &self.store
    }

    pub fn schedule(&self) -> WriteSchedule {
        self.schedule
    }

    pub fn key_for(&self, args: &CallArgs) -> CacheKey {
        (self.hasher)(args)
    }

    pub async fn contains(&self, args: &CallArgs) -> bool {
        self.store.contains(&self.key_for(args)).await
    }

    /// Number of computed values not yet written to disk
    pub fn pending_writes(&self) -> usize {
        self.lock_pending().len()
    }

    /// Return the cached value for `args`, or run `compute`, store its result and return it.
    ///
    /// Errors from `compute` are returned as-is and nothing is stored.
    pub async fn call<F, Fut, E>(&self, args: &CallArgs, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        let key = self.key_for(args);
        if let Some(value) = self.store.get(&key).await? {
            debug!("[{}] cache hit for {}", self.name, key);
            return Ok(value);
        }

        let guard = self.acquire_slot(key);
        let result = self.fill(&guard.key, &guard.slot, compute).await;
        result
    }

    async fn fill<F, Fut, E>(&self, key: &CacheKey, slot: &Slot, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        let _guard = slot.lock().await;
        // Another caller may have filled the key while we waited on the slot
        if let Some(value) = self.store.get(key).await? {
            debug!("[{}] cache filled concurrently for {}", self.name, key);
            return Ok(value);
        }
        debug!("[{}] cache miss for {}", self.name, key);
        let value = compute().await?;
        self.record(key.clone(), value.clone()).await?;
        Ok(value)
    }

    /// Drop the cached value for `args` from memory, the pending queue and disk.
    pub async fn invalidate(&self, args: &CallArgs) -> Result<(), CacheError> {
        let key = self.key_for(args);
        self.lock_pending().retain(|(pending, _)| pending != &key);
        self.store.delete(&key).await?;
        debug!("[{}] invalidated {}", self.name, key);
        Ok(())
    }

    /// Write every pending value to disk in the order it was computed.
    ///
    /// Draining an empty queue does nothing. On a write failure the failed
    /// entry and everything after it stay queued.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let mut queue = std::mem::take(&mut *self.lock_pending());
        if queue.is_empty() {
            return Ok(());
        }
        let count = queue.len();
        while let Some((key, value)) = queue.pop_front() {
            if let Err(e) = self.store.set(key.clone(), value.clone()).await {
                queue.push_front((key, value));
                let mut pending = self.lock_pending();
                while let Some(entry) = queue.pop_back() {
                    pending.push_front(entry);
                }
                return Err(e);
            }
        }
        info!("[{}] flushed {} cache writes", self.name, count);
        Ok(())
    }

    /// Flush and release the memoizer
    pub async fn shutdown(self) -> Result<(), CacheError> {
        self.flush().await
    }

    async fn record(&self, key: CacheKey, value: V) -> Result<(), CacheError> {
        self.store.set_in_memory(key.clone(), value.clone()).await;
        self.lock_pending().push_back((key, value));
        match self.schedule {
            WriteSchedule::Immediate => self.flush().await,
            WriteSchedule::Deferred => Ok(()),
        }
    }

    fn acquire_slot(&self, key: CacheKey) -> SlotGuard<'_, V> {
        let slot = self.lock_inflight().entry(key.clone()).or_default().clone();
        SlotGuard {
            memo: self,
            key,
            slot,
        }
    }

    /// Number of keys with a computation running or waiting
    pub(crate) fn inflight_calls(&self) -> usize {
        self.lock_inflight().len()
    }

    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<(CacheKey, V)>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: CacheValue> Drop for Memoizer<V> {
    fn drop(&mut self) {
        let pending = std::mem::take(
            self.pending
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        if pending.is_empty() {
            return;
        }
        info!(
            "[{}] writing {} deferred cache entries on drop",
            self.name,
            pending.len()
        );
        for (key, value) in pending {
            if let Err(e) = self.store.write_file_blocking(&key, &value) {
                error!("[{}] failed to persist {}: {}", self.name, key, e);
            }
        }
    }
}
