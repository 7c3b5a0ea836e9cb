//! Time Sources
//!
//! TTL and access-time bookkeeping read the current instant through the
//! [`Clock`] trait so expiry can be driven deterministically in tests.
//!
//! - [`TokioClock`] follows `tokio::time`, which means a paused test runtime
//!   (`#[tokio::test(start_paused = true)]`) advances it together with sleeps
//!   and batch timers.
//! - [`ManualClock`] only moves when told to, for synchronous cache tests.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by `tokio::time::Instant`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl TokioClock {
    /// Create a shared tokio clock
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manually advanced clock
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Shared handle to this clock (advancing either handle moves both)
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

// =============================================================================
// Tests
// =============================================================================
