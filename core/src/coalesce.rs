use crate::transport::TransportError;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;

/// Normalized cache key: endpoint plus sorted query parameters, so two
/// callers spelling the same read differently still coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoalesceKey(String);

impl CoalesceKey {
    pub fn new(endpoint: &str, params: &[(&str, &str)]) -> Self {
        if params.is_empty() {
            return Self(endpoint.to_string());
        }
        let mut sorted: Vec<(&str, &str)> = params.to_vec();
        sorted.sort_unstable();
        let query: Vec<String> = sorted
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Self(format!("{endpoint}?{}", query.join("&")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CoalesceKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalesceStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub items: usize,
}

type SharedFetch = Shared<BoxFuture<'static, Result<serde_json::Value, TransportError>>>;

struct CacheEntry {
    payload: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Short-TTL cache with in-flight sharing for idempotent reads.
///
/// A duplicate call either reads the live cache entry or attaches to the
/// already-running fetch for the same key; the fetcher runs at most once per
/// key per TTL window. Mutations never pass through here, so there is no
/// invalidation hook. Entry count is bounded; expired entries go first, then
/// the oldest insertion.
pub struct RequestCoalescer {
    capacity: usize,
    entries: Mutex<HashMap<CoalesceKey, CacheEntry>>,
    in_flight: Mutex<HashMap<CoalesceKey, SharedFetch>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl RequestCoalescer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Returns the payload for `key`, invoking `fetcher` only when neither a
    /// live cache entry nor an in-flight fetch exists. Whichever caller first
    /// observes the fetch completing clears the in-flight slot, on success
    /// and failure alike; the caller that registered it may have been dropped
    /// mid-await, so completion cleanup cannot be its job alone. Only
    /// successful payloads are cached.
    pub async fn get<F, Fut>(
        &self,
        key: CoalesceKey,
        ttl: Duration,
        fetcher: F,
    ) -> Result<serde_json::Value, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, TransportError>> + Send + 'static,
    {
        if let Some(payload) = self.cached(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(payload);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let fetch = {
            let mut guard = lock(&self.in_flight);
            match guard.entry(key.clone()) {
                Entry::Occupied(slot) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key = key.as_str(), "attached to in-flight read");
                    slot.get().clone()
                }
                Entry::Vacant(slot) => {
                    let shared = fetcher().boxed().shared();
                    slot.insert(shared.clone());
                    shared
                }
            }
        };

        let result = fetch.clone().await;
        self.complete(&key, &fetch, &result, ttl);
        result
    }

    pub fn stats(&self) -> CoalesceStats {
        CoalesceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            items: lock(&self.entries).len(),
        }
    }

    /// Clears the in-flight slot once its fetch has resolved. Guarded by
    /// pointer identity: only the first caller to observe this particular
    /// fetch completing removes the slot and caches the payload; a newer
    /// fetch already occupying the slot is left alone.
    fn complete(
        &self,
        key: &CoalesceKey,
        fetch: &SharedFetch,
        result: &Result<serde_json::Value, TransportError>,
        ttl: Duration,
    ) {
        let mut guard = lock(&self.in_flight);
        if !guard.get(key).is_some_and(|slot| slot.ptr_eq(fetch)) {
            return;
        }
        guard.remove(key);
        drop(guard);
        if let Ok(payload) = result {
            self.store(key.clone(), payload.clone(), ttl);
        }
    }

    fn cached(&self, key: &CoalesceKey) -> Option<serde_json::Value> {
        let mut guard = lock(&self.entries);
        match guard.get(key) {
            Some(entry) if entry.is_expired() => {
                guard.remove(key);
                None
            }
            Some(entry) => Some(entry.payload.clone()),
            None => None,
        }
    }

    fn store(&self, key: CoalesceKey, payload: serde_json::Value, ttl: Duration) {
        let mut guard = lock(&self.entries);
        guard.retain(|_, entry| !entry.is_expired());
        while guard.len() >= self.capacity {
            let oldest = guard
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => guard.remove(&key),
                None => break,
            };
        }
        guard.insert(
            key,
            CacheEntry {
                payload,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
