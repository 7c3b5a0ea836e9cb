//! Tiered Cache
//!
//! In-memory key/value store partitioned into HIGH/MEDIUM/LOW tiers. All
//! operations are synchronous and mutate state under one short-lived lock,
//! so tier counters can never drift from the entry map. Validators run on a
//! copy of the entry with the lock released.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::entry::{CacheEntry, GetOptions, Liveness, PendingValidation, SetOptions, Verdict};
use super::metrics::{CacheMetrics, CacheStats, TierStats};
use super::tier::{Priority, TierCounts};
use crate::clock::{SharedClock, TokioClock};
use crate::config::CacheConfig;
use crate::error::{BoxError, Error, Result};

/// Estimates the heap footprint of a value for `CacheStats::memory_estimate_bytes`
pub type Weigher<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

struct State<V> {
    entries: HashMap<String, CacheEntry<V>>,
    counts: TierCounts,
    /// Monotonic access sequence, breaks LRU ties between equal instants
    seq: u64,
}

impl<V> State<V> {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.counts.decrement(entry.priority);
        Some(entry)
    }

    /// Remove the least-recently-accessed entry of a tier
    fn evict_lru(&mut self, priority: Priority) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .filter(|(_, e)| e.priority == priority)
            .min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq))
            .map(|(k, _)| k.clone())?;
        self.remove(&victim);
        Some(victim)
    }
}

struct Inner<V> {
    state: Mutex<State<V>>,
    config: CacheConfig,
    clock: SharedClock,
    metrics: CacheMetrics,
    weigher: Option<Weigher<V>>,
}

/// Priority-tiered TTL cache
///
/// Cloning is cheap and yields another handle to the same store.
pub struct TieredCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for TieredCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for TieredCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("entries", &self.inner.state.lock().entries.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache with the given tier configuration and clock
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self::build(config, clock, None)
    }

    /// Create a cache with default tiers on the tokio clock
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default(), TokioClock::shared())
    }

    /// Create a cache that sizes values with `weigher` in its statistics
    pub fn with_weigher<W>(config: CacheConfig, clock: SharedClock, weigher: W) -> Self
    where
        W: Fn(&V) -> usize + Send + Sync + 'static,
    {
        Self::build(config, clock, Some(Arc::new(weigher)))
    }

    fn build(config: CacheConfig, clock: SharedClock, weigher: Option<Weigher<V>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    counts: TierCounts::default(),
                    seq: 0,
                }),
                config,
                clock,
                metrics: CacheMetrics::new(),
                weigher,
            }),
        }
    }

    /// Insert or overwrite an entry
    ///
    /// When the target tier is full its least-recently-accessed entry is
    /// evicted first.
    pub fn set(&self, key: impl Into<String>, value: V, options: SetOptions<V>) {
        let key = key.into();
        let priority = options.priority;
        let tier = *self.inner.config.tier(priority);
        let ttl = options.ttl.unwrap_or(tier.ttl);
        let now = self.inner.clock.now();

        let mut state = self.inner.state.lock();
        state.remove(&key);

        while state.counts.get(priority) >= tier.max_entries {
            match state.evict_lru(priority) {
                Some(victim) => {
                    self.inner.metrics.record_eviction();
                    debug!(key = %victim, tier = %priority, "Evicted least recently used entry");
                }
                None => break,
            }
        }

        let seq = state.next_seq();
        state
            .entries
            .insert(key, CacheEntry::new(value, options, ttl, now, seq));
        state.counts.increment(priority);
        self.inner.metrics.record_set();
    }

    /// Look up a live value with default options
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with(key, GetOptions::default())
    }

    /// Look up a live value
    ///
    /// Expired or invalidated entries are removed and reported as a miss. A
    /// value written concurrently with the read is returned unvalidated.
    pub fn get_with(&self, key: &str, options: GetOptions) -> Option<V> {
        let verdict = if options.skip_validation {
            None
        } else {
            self.validate(key)
        };
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let liveness = match state.entries.get(key) {
            Some(entry) => entry.liveness(now, verdict),
            None => {
                self.inner.metrics.record_miss();
                return None;
            }
        };

        match liveness {
            Liveness::Live => {
                let seq = state.next_seq();
                let entry = state.entries.get_mut(key)?;
                if options.update_access {
                    entry.touch(now, seq);
                }
                self.inner.metrics.record_hit();
                Some(entry.value.clone())
            }
            dead => {
                state.remove(key);
                self.record_dead(key, dead);
                self.inner.metrics.record_miss();
                None
            }
        }
    }

    /// Whether a live entry exists (dead entries are removed, no hit/miss accounting)
    pub fn has(&self, key: &str) -> bool {
        let verdict = self.validate(key);
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let liveness = match state.entries.get(key) {
            Some(entry) => entry.liveness(now, verdict),
            None => return false,
        };

        if liveness == Liveness::Live {
            return true;
        }
        state.remove(key);
        self.record_dead(key, liveness);
        false
    }

    /// Remove an entry; returns whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.inner.state.lock().remove(key).is_some()
    }

    /// Remove every entry and reset the tier counters
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.counts.reset();
    }

    /// Extend an entry's lifetime from now
    ///
    /// Uses `ttl` or the tier default. Returns false when the key is absent
    /// or already expired.
    pub fn refresh(&self, key: &str, ttl: Option<Duration>) -> bool {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let seq = state.next_seq();

        let expired = match state.entries.get_mut(key) {
            None => return false,
            Some(entry) if now >= entry.expires_at => true,
            Some(entry) => {
                let ttl = ttl.unwrap_or(self.inner.config.tier(entry.priority).ttl);
                entry.expires_at = now + ttl;
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                false
            }
        };

        if expired {
            state.remove(key);
            self.record_dead(key, Liveness::Expired);
            return false;
        }
        true
    }

    /// Replace a value in place; returns false when the key is absent or expired
    ///
    /// `f` runs under the cache lock and must not call back into the cache.
    pub fn update<F>(&self, key: &str, f: F) -> bool
    where
        F: FnOnce(&V) -> V,
    {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let expired = match state.entries.get_mut(key) {
            None => return false,
            Some(entry) if now >= entry.expires_at => true,
            Some(entry) => {
                entry.value = f(&entry.value);
                false
            }
        };

        if expired {
            state.remove(key);
            self.record_dead(key, Liveness::Expired);
            return false;
        }
        true
    }

    /// Return the cached value or compute, store and return a fresh one
    ///
    /// A failing `compute` is surfaced to the caller and nothing is stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
        options: SetOptions<V>,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, BoxError>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await.map_err(|e| Error::compute(key, e))?;
        self.set(key, value.clone(), options);
        Ok(value)
    }

    /// Warm the cache with several values concurrently
    ///
    /// Keys that are already live are skipped. Each item reports its own
    /// outcome; one failing value function never affects the others.
    pub async fn preload<I, F, Fut>(&self, items: I) -> Vec<(String, Result<()>)>
    where
        I: IntoIterator<Item = (String, F, SetOptions<V>)>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, BoxError>>,
    {
        let tasks = items.into_iter().map(|(key, value_fn, options)| async move {
            if self.has(&key) {
                return (key, Ok(()));
            }
            let outcome = match value_fn().await {
                Ok(value) => {
                    self.set(key.clone(), value, options);
                    Ok(())
                }
                Err(e) => {
                    debug!(key = %key, error = %e, "Preload value function failed");
                    Err(Error::compute(key.clone(), e))
                }
            };
            (key, outcome)
        });

        join_all(tasks).await
    }

    /// Remove every expired or invalid entry; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let pending: Vec<(String, PendingValidation<V>)> = self
            .inner
            .state
            .lock()
            .entries
            .iter()
            .filter_map(|(key, entry)| entry.validation().map(|p| (key.clone(), p)))
            .collect();
        let verdicts: HashMap<String, Verdict> = pending
            .into_iter()
            .map(|(key, p)| (key, p.run()))
            .collect();

        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let dead: Vec<(String, Liveness)> = state
            .entries
            .iter()
            .filter_map(|(key, entry)| match entry.liveness(now, verdicts.get(key).copied()) {
                Liveness::Live => None,
                dead => Some((key.clone(), dead)),
            })
            .collect();

        for (key, liveness) in &dead {
            state.remove(key);
            self.record_dead(key, *liveness);
        }
        self.inner.metrics.record_sweep();

        if !dead.is_empty() {
            debug!(removed = dead.len(), remaining = state.entries.len(), "Cache sweep");
        }
        dead.len()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let metrics = &self.inner.metrics;

        let tiers = Priority::ALL
            .iter()
            .map(|&p| TierStats::new(p, state.counts.get(p), self.inner.config.tier(p).max_entries))
            .collect();

        let memory_estimate_bytes = state
            .entries
            .iter()
            .map(|(key, entry)| {
                let value_size = match &self.inner.weigher {
                    Some(weigher) => weigher(&entry.value),
                    None => std::mem::size_of::<V>(),
                };
                let metadata_size = if entry.metadata.is_empty() {
                    0
                } else {
                    serde_json::to_string(&entry.metadata)
                        .map(|s| s.len())
                        .unwrap_or(0)
                };
                key.len() + value_size + metadata_size + std::mem::size_of::<CacheEntry<V>>()
            })
            .sum();

        CacheStats {
            hits: metrics.hits(),
            misses: metrics.misses(),
            evictions: metrics.evictions(),
            expirations: metrics.expirations(),
            invalidations: metrics.invalidations(),
            sets: metrics.sets(),
            hit_ratio: metrics.hit_ratio(),
            total_entries: state.entries.len(),
            tiers,
            memory_estimate_bytes,
        }
    }

    /// Reset hit/miss/eviction counters (entries are kept)
    pub fn reset_stats(&self) {
        self.inner.metrics.reset();
    }

    /// Keys currently stored, live or not
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.lock().entries.keys().cloned().collect()
    }

    /// Number of stored entries, live or not
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tier of a stored entry
    pub fn priority_of(&self, key: &str) -> Option<Priority> {
        self.inner.state.lock().entries.get(key).map(|e| e.priority())
    }

    /// Tier configuration
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    /// Run the validator of `key` on a copy of the entry, outside the lock
    fn validate(&self, key: &str) -> Option<Verdict> {
        let pending = self.inner.state.lock().entries.get(key)?.validation()?;
        Some(pending.run())
    }

    fn record_dead(&self, key: &str, liveness: Liveness) {
        match liveness {
            Liveness::Expired => {
                self.inner.metrics.record_expiration();
                trace!(key = %key, "Removed expired entry");
            }
            Liveness::Invalid => {
                self.inner.metrics.record_invalidation();
                trace!(key = %key, "Removed invalidated entry");
            }
            Liveness::Live => {}
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
