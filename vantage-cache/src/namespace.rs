//! Per-namespace entity and request caches.
//!
//! A [`NamespaceCache`] pairs two associative containers:
//!
//! - the **entity cache**, from key to resolved value, and
//! - the **request cache**, from key to the fetch currently in flight.
//!
//! [`NamespaceCache::get_or_fetch`] combines them into a single-flight read:
//! the first caller for a missing key registers a shared fetch before it
//! releases the request lock, and every later caller for that key awaits the
//! same handle until it settles. A failed fetch never reaches the entity
//! cache and is deregistered, so the next caller issues a fresh one.
//!
//! Entries never expire on a timer; they leave the cache only through
//! explicit invalidation or [`NamespaceCache::clear`].

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use tracing::debug;
use vantage_core::{ResourceError, ResourceResult};

use crate::stats::{CacheStats, Counters};

/// Handle to an in-flight fetch. Cloning it joins the same fetch.
pub type PendingFetch<V> = Shared<BoxFuture<'static, ResourceResult<V>>>;

/// Bounds every namespace key satisfies.
pub trait NamespaceKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> NamespaceKey for T where T: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Bounds every cached value satisfies.
pub trait NamespaceValue: Clone + Send + Sync + 'static {}

impl<T> NamespaceValue for T where T: Clone + Send + Sync + 'static {}

/// Identifies one registration of a fetch started by
/// [`NamespaceCache::get_or_fetch_tracked`].
pub struct FetchTicket<K, V> {
    cache: Weak<NamespaceCache<K, V>>,
    key: K,
    generation: u64,
}

impl<K: NamespaceKey, V: NamespaceValue> FetchTicket<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Whether the key still maps to this registration, i.e. it was neither
    /// invalidated nor replaced by a newer fetch.
    pub fn is_current(&self) -> bool {
        self.if_current(|| ()).is_some()
    }

    /// Run `f` only if this registration is still current. The request map
    /// stays locked while `f` runs, so no invalidation of the namespace can
    /// interleave with it.
    pub fn if_current<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let cache = self.cache.upgrade()?;
        let requests = lock(&cache.requests);
        if !is_current(&requests, &self.key, self.generation) {
            return None;
        }
        let out = f();
        drop(requests);
        Some(out)
    }
}

struct PendingSlot<V> {
    generation: u64,
    fetch: PendingFetch<V>,
}

/// Entity and request cache of one namespace.
pub struct NamespaceCache<K, V> {
    name: String,
    entities: RwLock<HashMap<K, V>>,
    requests: Mutex<HashMap<K, PendingSlot<V>>>,
    next_generation: AtomicU64,
    counters: Counters,
}

impl<K: NamespaceKey, V: NamespaceValue> NamespaceCache<K, V> {
    /// Create an empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: RwLock::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // ENTITY CACHE
    // ========================================================================

    /// Pure lookup.
    pub fn get_entity(&self, key: &K) -> Option<V> {
        read(&self.entities).get(key).cloned()
    }

    /// Upsert, overwriting any existing value.
    pub fn set_entity(&self, key: K, value: V) {
        write(&self.entities).insert(key, value);
    }

    /// Remove the entry. No-op if absent.
    pub fn invalidate_entity(&self, key: &K) {
        write(&self.entities).remove(key);
    }

    pub fn contains_entity(&self, key: &K) -> bool {
        read(&self.entities).contains_key(key)
    }

    pub fn entity_count(&self) -> usize {
        read(&self.entities).len()
    }

    pub fn keys(&self) -> Vec<K> {
        read(&self.entities).keys().cloned().collect()
    }

    /// Snapshot of all cached entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        read(&self.entities)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ========================================================================
    // REQUEST CACHE
    // ========================================================================

    /// The fetch in flight for `key`, if any.
    pub fn get_request(&self, key: &K) -> Option<PendingFetch<V>> {
        lock(&self.requests).get(key).map(|slot| slot.fetch.clone())
    }

    /// Register an externally driven fetch for `key`.
    ///
    /// The caller owns settlement and must call
    /// [`NamespaceCache::invalidate_request`] once it completes.
    pub fn set_request(&self, key: K, fetch: PendingFetch<V>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        lock(&self.requests).insert(key, PendingSlot { generation, fetch });
    }

    /// Deregister the fetch for `key`. Callers already awaiting it still
    /// receive its result.
    pub fn invalidate_request(&self, key: &K) {
        lock(&self.requests).remove(key);
    }

    /// Drop every entity and in-flight request whose key matches.
    pub fn invalidate_matching<P>(&self, predicate: P)
    where
        P: Fn(&K) -> bool,
    {
        let mut requests = lock(&self.requests);
        requests.retain(|key, _| !predicate(key));
        write(&self.entities).retain(|key, _| !predicate(key));
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Drop every entity and in-flight request of this namespace.
    ///
    /// Fetches still in flight settle for their waiters but no longer write
    /// back.
    pub fn clear(&self) {
        let mut requests = lock(&self.requests);
        requests.clear();
        write(&self.entities).clear();
        debug!(namespace = %self.name, "namespace cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.counters
            .snapshot(self.entity_count(), self.pending_count())
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    // ========================================================================
    // GET-OR-FETCH
    // ========================================================================

    /// Return the cached value for `key`, join the fetch in flight, or issue
    /// `fetch` and register it.
    ///
    /// On success the value is written to the entity cache; on failure the
    /// request is evicted so a later caller may retry. Every caller that
    /// joined the fetch receives the same result.
    ///
    /// The fetch runs to completion even if every caller drops its handle,
    /// provided a tokio runtime is available to drive it.
    pub fn get_or_fetch<F, Fut>(self: &Arc<Self>, key: K, fetch: F) -> PendingFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResourceResult<V>> + Send + 'static,
    {
        self.get_or_fetch_tracked(key, |_| fetch())
    }

    /// [`NamespaceCache::get_or_fetch`] handing the fetch a [`FetchTicket`],
    /// so it can tell whether its registration is still current before
    /// touching state outside this namespace.
    pub fn get_or_fetch_tracked<F, Fut>(self: &Arc<Self>, key: K, fetch: F) -> PendingFetch<V>
    where
        F: FnOnce(FetchTicket<K, V>) -> Fut,
        Fut: Future<Output = ResourceResult<V>> + Send + 'static,
    {
        let mut requests = lock(&self.requests);

        if let Some(value) = self.get_entity(&key) {
            Counters::bump(&self.counters.hits, 1);
            debug!(namespace = %self.name, key = %key, "cache hit");
            return resolved(value);
        }

        if let Some(slot) = requests.get(&key) {
            Counters::bump(&self.counters.coalesced, 1);
            debug!(namespace = %self.name, key = %key, "joined in-flight fetch");
            return slot.fetch.clone();
        }

        Counters::bump(&self.counters.misses, 1);
        debug!(namespace = %self.name, key = %key, "cache miss, fetching");
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let ticket = FetchTicket {
            cache: Arc::downgrade(self),
            key: key.clone(),
            generation,
        };
        let pending =
            self.register(&mut requests, key, generation, fetch(ticket).boxed(), true);
        drop(requests);

        drive(pending.clone());
        pending
    }

    /// Request coalescing without the entity cache: join the fetch in flight
    /// for `key` or issue `fetch`. The settled value is not written back,
    /// which lets callers store it under a different key.
    pub fn coalesce<F, Fut>(self: &Arc<Self>, key: K, fetch: F) -> PendingFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResourceResult<V>> + Send + 'static,
    {
        let mut requests = lock(&self.requests);

        if let Some(slot) = requests.get(&key) {
            Counters::bump(&self.counters.coalesced, 1);
            debug!(namespace = %self.name, key = %key, "joined in-flight fetch");
            return slot.fetch.clone();
        }

        Counters::bump(&self.counters.misses, 1);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending =
            self.register(&mut requests, key, generation, fetch().boxed(), false);
        drop(requests);

        drive(pending.clone());
        pending
    }

    /// Batched get-or-fetch.
    ///
    /// Cached keys resolve immediately, keys already in flight join their
    /// fetch, and all remaining keys are fetched with one `batch_fetch` call.
    /// Each of those keys gets its own registered request backed by the
    /// shared batch, so single-key callers coalesce onto it. Keys the batch
    /// omits settle with [`ResourceError::NotFound`].
    ///
    /// Duplicate keys are collapsed; output follows first-occurrence order.
    pub fn get_or_fetch_many<F, Fut>(
        self: &Arc<Self>,
        keys: Vec<K>,
        batch_fetch: F,
    ) -> Vec<(K, PendingFetch<V>)>
    where
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = ResourceResult<Vec<(K, V)>>> + Send + 'static,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        let mut requests = lock(&self.requests);
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(value) = self.get_entity(&key) {
                Counters::bump(&self.counters.hits, 1);
                out.push((key, resolved(value)));
            } else if let Some(slot) = requests.get(&key) {
                Counters::bump(&self.counters.coalesced, 1);
                out.push((key, slot.fetch.clone()));
            } else {
                missing.push(key);
            }
        }

        if missing.is_empty() {
            return out;
        }

        Counters::bump(&self.counters.misses, missing.len() as u64);
        Counters::bump(&self.counters.fetches, 1);
        debug!(namespace = %self.name, count = missing.len(), "batch fetching");

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(self);
        let batch_keys = missing.clone();
        let fut = batch_fetch(missing.clone());
        let batch: Shared<BoxFuture<'static, ResourceResult<Arc<HashMap<K, V>>>>> = async move {
            let result = fut
                .await
                .map(|pairs| Arc::new(pairs.into_iter().collect::<HashMap<K, V>>()));
            cache.settle_batch(&batch_keys, generation, &result);
            result
        }
        .boxed()
        .shared();

        for key in missing {
            let lookup = key.clone();
            let fetch: PendingFetch<V> = batch
                .clone()
                .map(move |result| {
                    result.and_then(|found| {
                        found
                            .get(&lookup)
                            .cloned()
                            .ok_or_else(|| ResourceError::not_found(lookup.to_string()))
                    })
                })
                .boxed()
                .shared();
            requests.insert(
                key.clone(),
                PendingSlot {
                    generation,
                    fetch: fetch.clone(),
                },
            );
            out.push((key, fetch));
        }
        drop(requests);

        drive(batch);
        out
    }

    fn register(
        self: &Arc<Self>,
        requests: &mut HashMap<K, PendingSlot<V>>,
        key: K,
        generation: u64,
        fut: BoxFuture<'static, ResourceResult<V>>,
        write_back: bool,
    ) -> PendingFetch<V> {
        Counters::bump(&self.counters.fetches, 1);
        let cache = Arc::clone(self);
        let settle_key = key.clone();
        let fetch = async move {
            let result = fut.await;
            cache.settle(&settle_key, generation, &result, write_back);
            result
        }
        .boxed()
        .shared();

        requests.insert(
            key,
            PendingSlot {
                generation,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    /// Deregister a settled fetch and write back its value.
    ///
    /// Only the registration that is still current may write back: if the
    /// key was invalidated or re-registered meanwhile, the result goes to
    /// this fetch's waiters alone.
    fn settle(&self, key: &K, generation: u64, result: &ResourceResult<V>, write_back: bool) {
        if result.is_err() {
            Counters::bump(&self.counters.failures, 1);
        }

        let mut requests = lock(&self.requests);
        if !is_current(&requests, key, generation) {
            debug!(namespace = %self.name, key = %key, "superseded fetch settled");
            return;
        }
        requests.remove(key);

        match result {
            Ok(value) if write_back => {
                write(&self.entities).insert(key.clone(), value.clone());
            }
            Ok(_) => {}
            Err(err) => {
                debug!(namespace = %self.name, key = %key, error = %err, "fetch failed, request evicted");
            }
        }
    }

    fn settle_batch(
        &self,
        keys: &[K],
        generation: u64,
        result: &ResourceResult<Arc<HashMap<K, V>>>,
    ) {
        let mut requests = lock(&self.requests);
        let mut entities = write(&self.entities);
        let mut failed = 0u64;

        for key in keys {
            let found = match result {
                Ok(found) => found.get(key),
                Err(_) => None,
            };
            if found.is_none() {
                failed += 1;
            }
            if !is_current(&requests, key, generation) {
                continue;
            }
            requests.remove(key);
            if let Some(value) = found {
                entities.insert(key.clone(), value.clone());
            }
        }

        Counters::bump(&self.counters.failures, failed);
        if let Err(err) = result {
            debug!(namespace = %self.name, count = keys.len(), error = %err, "batch fetch failed, requests evicted");
        }
    }
}

impl<K, V> Debug for NamespaceCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceCache")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn is_current<K: Eq + Hash, V>(
    requests: &HashMap<K, PendingSlot<V>>,
    key: &K,
    generation: u64,
) -> bool {
    requests
        .get(key)
        .is_some_and(|slot| slot.generation == generation)
}

fn resolved<V: NamespaceValue>(value: V) -> PendingFetch<V> {
    future::ready(Ok(value)).boxed().shared()
}

/// Poll a shared fetch to completion on the ambient runtime so settlement
/// does not depend on any caller still awaiting it.
fn drive<T>(fetch: Shared<BoxFuture<'static, T>>)
where
    T: Clone + Send + Sync + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(fetch.map(|_| ()));
    }
}

// Cache maps only hold plain values, so a panic while a guard was held
// cannot leave them half-updated.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
