//! Request Batching
//!
//! Requests sharing a batch key accumulate in a group until either the batch
//! window elapses or the group reaches `max_batch_size`, whichever comes
//! first. One batch-function call then serves the whole group:
//!
//! ```text
//!  load(a) ─┐
//!  load(b) ─┼─► group "accounts" ──(delay | max size)──► batch_fn([a, b, c])
//!  load(c) ─┘                                               │
//!                              per-key pipeline ◄───────────┘
//!                              a ─► waiter a, b ─► waiter b, c missing ─► error
//! ```
//!
//! Every waiter is settled exactly once: with its processed value, with a
//! missing-result error, with the shared batch error, or with a cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::options::BatchFn;
use super::pipeline::Pipeline;
use super::stats::LoaderStats;
use crate::error::{Error, Result};

struct Waiter<V> {
    pipeline: Pipeline<V>,
    tx: oneshot::Sender<Result<V>>,
}

struct BatchGroup<V> {
    id: u64,
    batch_fn: BatchFn<V>,
    waiters: Vec<Waiter<V>>,
    timer: Option<JoinHandle<()>>,
}

/// Open batch groups keyed by batch key
pub(crate) struct BatchQueue<V> {
    groups: Mutex<HashMap<String, BatchGroup<V>>>,
    next_id: AtomicU64,
    stats: Arc<LoaderStats>,
}

impl<V> BatchQueue<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(stats: Arc<LoaderStats>) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            stats,
        }
    }

    /// Add a request to the group for `batch_key`
    ///
    /// The group's batch function is the one supplied by its first request.
    pub fn enqueue(
        self: &Arc<Self>,
        batch_key: &str,
        batch_fn: BatchFn<V>,
        pipeline: Pipeline<V>,
        delay: Duration,
        max_size: usize,
    ) -> oneshot::Receiver<Result<V>> {
        let (tx, rx) = oneshot::channel();
        let mut groups = self.groups.lock();

        let group = groups.entry(batch_key.to_string()).or_insert_with(|| BatchGroup {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            batch_fn,
            waiters: Vec::new(),
            timer: None,
        });
        group.waiters.push(Waiter { pipeline, tx });
        self.stats.record_batched();

        if group.waiters.len() >= max_size {
            if let Some(mut full) = groups.remove(batch_key) {
                if let Some(timer) = full.timer.take() {
                    timer.abort();
                }
                debug!("Batch {} reached {} requests", batch_key, full.waiters.len());
                let stats = Arc::clone(&self.stats);
                let key = batch_key.to_string();
                tokio::spawn(async move { Self::flush(stats, key, full).await });
            }
        } else if group.timer.is_none() {
            let queue = Arc::clone(self);
            let id = group.id;
            let key = batch_key.to_string();
            group.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.flush_if_current(&key, id).await;
            }));
        }

        rx
    }

    /// Flush the group if the timer still belongs to it
    async fn flush_if_current(&self, batch_key: &str, id: u64) {
        let group = {
            let mut groups = self.groups.lock();
            match groups.get(batch_key) {
                Some(g) if g.id == id => groups.remove(batch_key),
                _ => None,
            }
        };

        if let Some(group) = group {
            Self::flush(Arc::clone(&self.stats), batch_key.to_string(), group).await;
        }
    }

    async fn flush(stats: Arc<LoaderStats>, batch_key: String, group: BatchGroup<V>) {
        let keys: Vec<String> = group
            .waiters
            .iter()
            .map(|w| w.pipeline.key().to_string())
            .collect();

        debug!("Executing batch {} with {} keys", batch_key, keys.len());
        stats.record_batch_executed();

        let results = match (group.batch_fn)(keys).await {
            Ok(results) => results,
            Err(e) => {
                let err = Error::batch(batch_key.as_str(), e);
                warn!("{}", err);
                for waiter in group.waiters {
                    let _ = waiter.tx.send(Err(err.clone()));
                }
                return;
            }
        };

        let settle = group.waiters.into_iter().map(|waiter| {
            let raw = results.get(waiter.pipeline.key()).cloned();
            let batch_key = batch_key.as_str();
            async move {
                let result = match raw {
                    Some(raw) => waiter.pipeline.run(raw).await,
                    None => Err(Error::MissingBatchResult {
                        key: waiter.pipeline.key().to_string(),
                        batch_key: batch_key.to_string(),
                    }),
                };
                // Receiver gone means the caller stopped waiting
                let _ = waiter.tx.send(result);
            }
        });
        join_all(settle).await;
    }

    /// Reject every queued waiter with `Error::Cancelled` and stop all timers
    pub fn cancel_all(&self) -> usize {
        let groups: Vec<BatchGroup<V>> = self.groups.lock().drain().map(|(_, g)| g).collect();

        let mut cancelled = 0;
        for group in groups {
            if let Some(timer) = group.timer {
                timer.abort();
            }
            for waiter in group.waiters {
                let key = waiter.pipeline.key().to_string();
                let _ = waiter.tx.send(Err(Error::Cancelled { key }));
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Number of open groups
    pub fn pending_groups(&self) -> usize {
        self.groups.lock().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
