//! TTL cache and in-flight coalescing keyed by fingerprint.
//!
//! `process_with_caching` guarantees at most one running computation per fingerprint:
//! - A live cache entry is returned without computing
//! - A computation already in flight is joined, and every caller sees its result
//! - Otherwise the computation is spawned as its own task and registered in flight
//!
//! The spawned task stores a successful result and clears the in-flight entry itself,
//! so settling does not depend on any caller still waiting.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{OrchestratorError, SharedError};

type SharedComputation<V> = Shared<BoxFuture<'static, Result<V, SharedError>>>;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    in_flight: HashMap<String, SharedComputation<V>>,
}

impl<V> Default for CacheState<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined a computation already in flight
    pub coalesced: u64,
    /// Entries removed because they expired
    pub evictions: u64,
    pub entries: usize,
    pub in_flight: usize,
}

pub struct ResponseCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
    counters: Arc<Counters>,
    enabled: bool,
    ttl: Duration,
    sweep_interval: Duration,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            counters: Arc::new(Counters::default()),
            enabled: config.enabled,
            ttl: Duration::from_millis(config.ttl_ms),
            sweep_interval: Duration::from_millis(config.sweep_interval_ms.max(1)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve `fingerprint` from cache, from a computation in flight, or by running
    /// `compute`. Failures are shared by every coalesced caller and never cached.
    pub async fn process_with_caching<F, Fut>(&self, fingerprint: &str, compute: F) -> Result<V, SharedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, OrchestratorError>> + Send + 'static,
    {
        let shared = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            if self.enabled
                && let Some(entry) = state.entries.get(fingerprint)
            {
                if entry.is_live(now) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(fingerprint, "Cache hit");
                    return Ok(entry.value.clone());
                }
                state.entries.remove(fingerprint);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }

            if let Some(pending) = state.in_flight.get(fingerprint) {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint, "Joining computation in flight");
                pending.clone()
            } else {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint, "Cache miss, starting computation");
                let pending = self.start(fingerprint.to_string(), compute());
                state.in_flight.insert(fingerprint.to_string(), pending.clone());
                pending
            }
        };

        shared.await
    }

    /// Spawn the computation. The caller holds the state lock, so the in-flight entry
    /// is registered before the task can settle.
    fn start<Fut>(&self, fingerprint: String, computation: Fut) -> SharedComputation<V>
    where
        Fut: Future<Output = Result<V, OrchestratorError>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let enabled = self.enabled;
        let ttl = self.ttl;
        let key = fingerprint.clone();

        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(computation).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(_) => Err(Arc::new(OrchestratorError::Computation {
                    fingerprint: key.clone(),
                    reason: "computation panicked".to_string(),
                })),
            };

            let mut state = state.lock().await;
            state.in_flight.remove(&key);
            match &result {
                Ok(value) if enabled => {
                    state.entries.insert(
                        key,
                        CacheEntry {
                            value: value.clone(),
                            expires_at: Instant::now() + ttl,
                        },
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(fingerprint = %key, error = %e, "Computation failed"),
            }
            result
        });

        let state = Arc::clone(&self.state);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    // Task cancelled before it could clean up after itself
                    state.lock().await.in_flight.remove(&fingerprint);
                    Err(Arc::new(OrchestratorError::Computation {
                        fingerprint,
                        reason: join_error.to_string(),
                    }))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - state.entries.len();

        if removed > 0 {
            self.counters.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, remaining = state.entries.len(), "Swept expired cache entries");
        }
        removed
    }

    /// Run `sweep_expired` every sweep interval until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("Cache dropped, sweeper exiting");
                    break;
                };
                cache.sweep_expired().await;
            }
        })
    }

    /// Forget one cached response. Returns true if there was one.
    pub async fn invalidate(&self, fingerprint: &str) -> bool {
        self.state.lock().await.entries.remove(fingerprint).is_some()
    }

    /// Forget every cached response. Computations in flight are unaffected.
    pub async fn clear(&self) {
        self.state.lock().await.entries.clear();
    }

    /// Number of stored entries, expired ones included until swept
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
        }
    }
}
