//! Cache Metrics Collection
//!
//! Hit/miss/eviction counters and the statistics snapshot returned by
//! `TieredCache::stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::tier::Priority;

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    sets: AtomicU64,
    sweeps: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Hits over lookups (0.0 when nothing was looked up)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.sweeps.store(0, Ordering::Relaxed);
    }
}

/// Occupancy of one tier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    pub priority: Priority,
    pub current: usize,
    pub max: usize,
    /// `current / max`
    pub utilization: f64,
}

impl TierStats {
    pub(crate) fn new(priority: Priority, current: usize, max: usize) -> Self {
        let utilization = if max == 0 {
            0.0
        } else {
            current as f64 / max as f64
        };
        Self {
            priority,
            current,
            max,
            utilization,
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub sets: u64,
    pub hit_ratio: f64,
    pub total_entries: usize,
    /// Per-tier occupancy, highest priority first
    pub tiers: Vec<TierStats>,
    /// Rough size of keys, values and bookkeeping in bytes
    pub memory_estimate_bytes: usize,
}

impl CacheStats {
    /// Occupancy of one tier
    pub fn tier(&self, priority: Priority) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.priority == priority)
    }
}

// =============================================================================
// Tests
// =============================================================================
