//! Loader Statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Load counters
#[derive(Debug, Default)]
pub struct LoaderStats {
    total_loads: AtomicU64,
    cached_loads: AtomicU64,
    deduplicated_loads: AtomicU64,
    batched_loads: AtomicU64,
    direct_loads: AtomicU64,
    failed_loads: AtomicU64,
    retries: AtomicU64,
    batches_executed: AtomicU64,
    completed_loads: AtomicU64,
    total_load_time_us: AtomicU64,
}

impl LoaderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cached(&self) {
        self.cached_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batched(&self) {
        self.batched_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct(&self) {
        self.direct_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_executed(&self) {
        self.batches_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the duration of a settled load
    pub fn record_load_time(&self, elapsed: Duration) {
        self.completed_loads.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Mean settled-load duration in milliseconds
    pub fn average_load_time_ms(&self) -> f64 {
        let completed = self.completed_loads.load(Ordering::Relaxed);
        if completed == 0 {
            return 0.0;
        }
        self.total_load_time_us.load(Ordering::Relaxed) as f64 / completed as f64 / 1000.0
    }

    /// Snapshot with the live in-flight and pending-batch gauges filled in
    pub fn snapshot(&self, in_flight: usize, pending_batches: usize) -> LoaderStatsSnapshot {
        LoaderStatsSnapshot {
            total_loads: self.total_loads.load(Ordering::Relaxed),
            cached_loads: self.cached_loads.load(Ordering::Relaxed),
            deduplicated_loads: self.deduplicated_loads.load(Ordering::Relaxed),
            batched_loads: self.batched_loads.load(Ordering::Relaxed),
            direct_loads: self.direct_loads.load(Ordering::Relaxed),
            failed_loads: self.failed_loads.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches_executed: self.batches_executed.load(Ordering::Relaxed),
            in_flight,
            pending_batches,
            average_load_time_ms: self.average_load_time_ms(),
        }
    }

    pub fn reset(&self) {
        self.total_loads.store(0, Ordering::Relaxed);
        self.cached_loads.store(0, Ordering::Relaxed);
        self.deduplicated_loads.store(0, Ordering::Relaxed);
        self.batched_loads.store(0, Ordering::Relaxed);
        self.direct_loads.store(0, Ordering::Relaxed);
        self.failed_loads.store(0, Ordering::Relaxed);
        self.retries.store(0, Ordering::Relaxed);
        self.batches_executed.store(0, Ordering::Relaxed);
        self.completed_loads.store(0, Ordering::Relaxed);
        self.total_load_time_us.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time loader statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderStatsSnapshot {
    pub total_loads: u64,
    /// Served from the cache
    pub cached_loads: u64,
    /// Joined an already pending request
    pub deduplicated_loads: u64,
    pub batched_loads: u64,
    pub direct_loads: u64,
    pub failed_loads: u64,
    pub retries: u64,
    pub batches_executed: u64,
    pub in_flight: usize,
    pub pending_batches: usize,
    pub average_load_time_ms: f64,
}

// =============================================================================
// Tests
// =============================================================================
