//! Two-tier result cache: a small process-local LRU in front of a shared,
//! injected key-value store.
//!
//! The manager treats values as opaque bytes; callers are responsible for
//! serialization. Only the read path promotes L2 hits back into L1 so a
//! warm process slowly converges on its own working set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use breaker::{CircuitBreaker, CircuitBreakerError};
use bytes::Bytes;
use lru::LruCache;

/// Errors raised by a [`KvStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("kv store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("kv store operation failed: {0}")]
    Operation(String),
}

/// Shared key-value store backing the L2 tier. Implementations are expected
/// to honor `ttl` approximately; exact expiry semantics are up to the store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Returns every stored key whose name starts with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process [`KvStore`] test double; also usable as a standalone L2 when
/// no external store is wired up.
#[derive(Default)]
pub struct InMemoryKvStore {
    inner: Mutex<std::collections::HashMap<String, StoredValue>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(entry) = guard.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.bytes.clone()));
            }
            guard.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.inner.lock().unwrap().insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

struct L1Entry {
    value: Bytes,
    expires_at: Instant,
}

/// Hit/miss counters for each tier, useful for dashboards.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_errors: u64,
}

struct Counters {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    l2_errors: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            l1_hits: AtomicU64::new(0),
            l1_misses: AtomicU64::new(0),
            l2_hits: AtomicU64::new(0),
            l2_misses: AtomicU64::new(0),
            l2_errors: AtomicU64::new(0),
        }
    }
}

/// Configuration for the L1/L2 tiers.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub l1_capacity: usize,
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 1000,
            l1_ttl: Duration::from_secs(300),
            l2_ttl: Duration::from_secs(3600),
        }
    }
}

/// Two-tier cache manager. `namespace:key` pairs map to the storage key
/// `cache:{namespace}:{key}`. L2 calls run through a circuit breaker so a
/// struggling shared store degrades to L1-only caching instead of stalling
/// every request.
pub struct CacheManager<S: KvStore> {
    l1: Mutex<LruCache<String, L1Entry>>,
    l2: S,
    config: CacheConfig,
    counters: Counters,
    breaker: Arc<CircuitBreaker>,
}

fn storage_key(namespace: &str, key: &str) -> String {
    format!("cache:{namespace}:{key}")
}

impl<S: KvStore> CacheManager<S> {
    pub fn new(l2: S, config: CacheConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.l1_capacity.max(1)).unwrap();
        Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l2,
            config,
            counters: Counters::default(),
            breaker,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l1_misses: self.counters.l1_misses.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            l2_misses: self.counters.l2_misses.load(Ordering::Relaxed),
            l2_errors: self.counters.l2_errors.load(Ordering::Relaxed),
        }
    }

    /// Reads `namespace:key`, promoting an L2 hit back into L1.
    pub async fn get(&self, namespace: &str, key: &str) -> Option<Bytes> {
        let full_key = storage_key(namespace, key);

        {
            let mut l1 = self.l1.lock().unwrap();
            if let Some(entry) = l1.get(&full_key) {
                if entry.expires_at > Instant::now() {
                    self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                l1.pop(&full_key);
            }
        }
        self.counters.l1_misses.fetch_add(1, Ordering::Relaxed);

        match self.breaker.call_if(|| self.l2.get(&full_key), |_| true).await {
            Ok(Some(bytes)) => {
                self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                let value = Bytes::from(bytes);
                self.promote(&full_key, value.clone());
                Some(value)
            }
            Ok(None) => {
                self.counters.l2_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(CircuitBreakerError::Open(name)) => {
                tracing::warn!(breaker = %name, namespace, key, "l2 cache breaker open, treating as miss");
                self.counters.l2_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(CircuitBreakerError::Inner(err)) => {
                tracing::warn!(%err, namespace, key, "l2 cache read failed");
                self.counters.l2_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn promote(&self, full_key: &str, value: Bytes) {
        let mut l1 = self.l1.lock().unwrap();
        l1.put(
            full_key.to_string(),
            L1Entry {
                value,
                expires_at: Instant::now() + self.config.l1_ttl,
            },
        );
    }

    /// Writes both tiers. L2 failure is logged and counted but never fails
    /// the call: L1 still serves the value for its own TTL.
    pub async fn set(&self, namespace: &str, key: &str, value: Bytes, ttl: Option<Duration>) {
        let full_key = storage_key(namespace, key);
        self.promote(&full_key, value.clone());

        let l2_ttl = ttl.unwrap_or(self.config.l2_ttl);
        let result = self
            .breaker
            .call_if(|| self.l2.set(&full_key, value.to_vec(), l2_ttl), |_| true)
            .await;
        if let Err(err) = result {
            match err {
                CircuitBreakerError::Open(name) => {
                    tracing::warn!(breaker = %name, namespace, key, "l2 cache breaker open, skipping write")
                }
                CircuitBreakerError::Inner(err) => tracing::warn!(%err, namespace, key, "l2 cache write failed"),
            }
            self.counters.l2_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn delete(&self, namespace: &str, key: &str) {
        let full_key = storage_key(namespace, key);
        self.l1.lock().unwrap().pop(&full_key);
        if let Err(err) = self.breaker.call_if(|| self.l2.delete(&full_key), |_| true).await {
            match err {
                CircuitBreakerError::Open(name) => {
                    tracing::warn!(breaker = %name, namespace, key, "l2 cache breaker open, skipping delete")
                }
                CircuitBreakerError::Inner(err) => tracing::warn!(%err, namespace, key, "l2 cache delete failed"),
            }
        }
    }

    /// Drops every L1 entry and L2 key under `namespace`, returning the
    /// number of L2 keys removed.
    pub async fn invalidate_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("cache:{namespace}:");
        {
            let mut l1 = self.l1.lock().unwrap();
            let stale: Vec<String> = l1
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                l1.pop(&key);
            }
        }

        let keys = match self.breaker.call_if(|| self.l2.scan(&prefix), |_| true).await {
            Ok(keys) => keys,
            Err(CircuitBreakerError::Open(name)) => {
                tracing::warn!(breaker = %name, namespace, "l2 cache breaker open, skipping invalidation scan");
                return 0;
            }
            Err(CircuitBreakerError::Inner(err)) => {
                tracing::warn!(%err, namespace, "l2 cache scan failed during invalidation");
                return 0;
            }
        };
        let mut removed = 0;
        for key in &keys {
            if self.breaker.call_if(|| self.l2.delete(key), |_| true).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }
}
