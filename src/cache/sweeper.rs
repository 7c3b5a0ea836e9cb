//! Background Expiry Sweep
//!
//! Periodically runs `TieredCache::cleanup` on a tokio task. Sweeping only
//! removes entries that are already dead, so it commutes with concurrent
//! reads and writes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::TieredCache;
use crate::config::CacheConfig;

/// Handle to a running sweeper task
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to exit
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Spawn a task running `cleanup` every `period`
    ///
    /// Uses the configured `cleanup_interval` when `period` is `None`.
    pub fn spawn_sweeper(&self, period: Option<Duration>) -> SweeperHandle {
        let configured = self.config().cleanup_interval;
        let period = match period {
            Some(p) if !p.is_zero() => p,
            Some(_) => {
                warn!("Ignoring zero sweep period, using {:?}", configured);
                configured
            }
            None => configured,
        };
        let period = if period.is_zero() {
            CacheConfig::default().cleanup_interval
        } else {
            period
        };
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let cache = self.clone();

        let task = tokio::spawn(async move {
            info!("Starting cache sweeper (every {:?})", period);

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.cleanup();
                        debug!("Sweep removed {} entries", removed);
                    }
                }
            }
        });

        SweeperHandle {
            shutdown,
            task: Some(task),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::clock::TokioClock;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let cache: TieredCache<u32> = TieredCache::new(CacheConfig::default(), TokioClock::shared());
        cache.set("short", 1, SetOptions::new().with_ttl(Duration::from_secs(1)));
        cache.set("long", 2, SetOptions::new());

        let sweeper = cache.spawn_sweeper(Some(Duration::from_secs(10)));
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_secs(11)).await;

        // Swept without any read touching the key
        assert_eq!(cache.len(), 1);
        assert!(cache.metrics().sweeps() >= 1);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_drop() {
        let cache: TieredCache<u32> = TieredCache::new(CacheConfig::default(), TokioClock::shared());
        let sweeper = cache.spawn_sweeper(Some(Duration::from_secs(1)));
        drop(sweeper);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cache.metrics().sweeps(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_falls_back_to_configured_interval() {
        let config = CacheConfig {
            cleanup_interval: Duration::from_secs(2),
            ..CacheConfig::default()
        };
        let cache: TieredCache<u32> = TieredCache::new(config, TokioClock::shared());
        let sweeper = cache.spawn_sweeper(Some(Duration::ZERO));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(sweeper.is_running());
        assert_eq!(cache.metrics().sweeps(), 1);

        sweeper.stop().await;
    }
}
