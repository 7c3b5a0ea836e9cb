//! Load Orchestrator
//!
//! `DataLoader` sits above the tiered cache. Per key it moves through
//!
//! ```text
//! IDLE ──(cache hit)──────────────────────────────► SERVED
//!   │
//!   └──(miss)──► PENDING ──► SUCCEEDED (value cached) | FAILED
//!                  ▲
//!                  └── duplicate loads join the pending request
//! ```
//!
//! Pending requests run as spawned tasks and live in an in-flight registry
//! as shared handles to the task output, so a request settles and caches
//! its result even when every caller has stopped waiting. Each
//! registration carries a generation number; a request superseded by a
//! forced reload (or dropped by `cancel_all`) neither removes the newer
//! registration nor writes its result into the cache.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::batch::BatchQueue;
use super::options::{fetch_fn, FetchFn, LoadItem, LoadOptions, LoadOutcome, ResolvedOptions};
use super::pipeline::Pipeline;
use super::processor::{DataProcessor, ProcessorOptions, ProcessorRegistry};
use super::stats::{LoaderStats, LoaderStatsSnapshot};
use crate::cache::{Priority, SetOptions, TieredCache};
use crate::config::{ConfigUpdate, LoaderConfig};
use crate::error::{BoxError, Error, Result};
use crate::telemetry::PerformanceMonitor;

/// Batch group used when neither a batch key nor a data type is given
pub const DEFAULT_BATCH_KEY: &str = "default";

/// Status reported to the monitor for a successful fetch
const STATUS_OK: u16 = 200;

/// Status reported to the monitor for a failed fetch
const STATUS_FAILED: u16 = 500;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;

struct InFlight<V> {
    generation: u64,
    future: SharedLoad<V>,
}

struct Registry<V> {
    in_flight: HashMap<String, InFlight<V>>,
    /// Generations replaced by a forced reload or dropped by `cancel_all`
    superseded: HashSet<u64>,
    next_generation: u64,
}

struct Inner<V> {
    cache: TieredCache<V>,
    config: RwLock<LoaderConfig>,
    processors: ProcessorRegistry<V>,
    registry: Mutex<Registry<V>>,
    batches: Arc<BatchQueue<V>>,
    stats: Arc<LoaderStats>,
    monitor: Option<PerformanceMonitor>,
}

/// Deduplicating, batching, retrying loader in front of a `TieredCache`
///
/// Cloning yields another handle to the same loader.
pub struct DataLoader<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for DataLoader<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for DataLoader<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("config", &*self.inner.config.read())
            .field("in_flight", &self.inner.registry.lock().in_flight.len())
            .finish()
    }
}

impl<V> DataLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a loader writing into `cache`
    pub fn new(cache: TieredCache<V>, config: LoaderConfig) -> Self {
        Self::build(cache, config, None)
    }

    /// Create a loader that reports every direct fetch to `monitor` as an API call
    pub fn with_monitor(cache: TieredCache<V>, config: LoaderConfig, monitor: PerformanceMonitor) -> Self {
        Self::build(cache, config, Some(monitor))
    }

    fn build(cache: TieredCache<V>, config: LoaderConfig, monitor: Option<PerformanceMonitor>) -> Self {
        let stats = Arc::new(LoaderStats::new());
        Self {
            inner: Arc::new(Inner {
                cache,
                config: RwLock::new(config),
                processors: ProcessorRegistry::new(),
                registry: Mutex::new(Registry {
                    in_flight: HashMap::new(),
                    superseded: HashSet::new(),
                    next_generation: 0,
                }),
                batches: Arc::new(BatchQueue::new(Arc::clone(&stats))),
                stats,
                monitor,
            }),
        }
    }

    /// Load `key`, fetching through `fetch` on a cache miss
    pub async fn load<F, Fut>(&self, key: impl Into<String>, fetch: F, options: LoadOptions<V>) -> Result<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        self.load_with(key.into(), fetch_fn(fetch), options).await
    }

    /// Load `key` with an already boxed fetch function
    #[instrument(skip(self, fetch, options), fields(data_type = ?options.data_type))]
    pub async fn load_with(&self, key: String, fetch: FetchFn<V>, options: LoadOptions<V>) -> Result<V> {
        let started = Instant::now();
        self.inner.stats.record_request();
        let resolved = self.resolve(&options);
        let log_timings = resolved.log_timings;

        if !resolved.skip_cache && !resolved.force_reload {
            if let Some(value) = self.inner.cache.get(&key) {
                self.inner.stats.record_cached();
                self.finish(&key, started, log_timings, "cache");
                return Ok(value);
            }
        }

        let (future, joined) = self.join_or_start(&key, fetch, resolved);
        if joined {
            self.inner.stats.record_deduplicated();
            debug!("Joined pending load of {}", key);
        }

        let result = future.await;
        self.finish(&key, started, log_timings, if joined { "dedup" } else { "fetch" });
        result
    }

    fn finish(&self, key: &str, started: Instant, log_timings: bool, source: &str) {
        let elapsed = started.elapsed();
        self.inner.stats.record_load_time(elapsed);
        if log_timings {
            info!("Loaded {} from {} in {:?}", key, source, elapsed);
        }
    }

    /// Return the pending request for `key` or register a new one
    fn join_or_start(&self, key: &str, fetch: FetchFn<V>, resolved: ResolvedOptions<V>) -> (SharedLoad<V>, bool) {
        let mut registry = self.inner.registry.lock();

        if !resolved.force_reload {
            if let Some(pending) = registry.in_flight.get(key) {
                return (pending.future.clone(), true);
            }
        }

        registry.next_generation += 1;
        let generation = registry.next_generation;

        // Settles without any caller awaiting. The registry lock is held
        // until the entry is inserted, so `settle` always finds it.
        let loader = self.clone();
        let owned_key = key.to_string();
        let task = tokio::spawn(async move { loader.execute(owned_key, fetch, resolved, generation).await });
        let task_key = key.to_string();
        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Internal(format!("load task for {} failed: {}", task_key, e))))
        }
        .boxed()
        .shared();

        let previous = registry.in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                future: future.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(
                "Forced reload of {} supersedes generation {}",
                key, previous.generation
            );
            registry.superseded.insert(previous.generation);
        }

        (future, false)
    }

    async fn execute(self, key: String, fetch: FetchFn<V>, resolved: ResolvedOptions<V>, generation: u64) -> Result<V> {
        let pipeline = Pipeline::new(
            key.as_str(),
            resolved.data_type.clone(),
            resolved.processor.clone(),
            resolved.processing_timeout,
        );

        let result = match &resolved.batch_fn {
            Some(batch_fn) => {
                let rx = self.inner.batches.enqueue(
                    &resolved.batch_key,
                    Arc::clone(batch_fn),
                    pipeline,
                    resolved.batch_delay,
                    resolved.max_batch_size,
                );
                rx.await.unwrap_or_else(|_| Err(Error::Cancelled { key: key.clone() }))
            }
            None => {
                self.inner.stats.record_direct();
                self.run_direct(&key, &fetch, &pipeline, &resolved).await
            }
        };

        self.settle(&key, generation, &result, &resolved);
        result
    }

    /// Fetch with retries: `retry_attempts + 1` attempts, `retry_delay` apart
    async fn run_direct(
        &self,
        key: &str,
        fetch: &FetchFn<V>,
        pipeline: &Pipeline<V>,
        resolved: &ResolvedOptions<V>,
    ) -> Result<V> {
        let attempts = resolved.retry_attempts.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.inner.stats.record_retry();
                tokio::time::sleep(resolved.retry_delay).await;
            }

            match self.attempt(key, fetch, pipeline).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("Load of {} succeeded on attempt {}", key, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Load of {} failed (attempt {}/{}): {}", key, attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Internal(format!("no attempt made for {}", key))))
    }

    async fn attempt(&self, key: &str, fetch: &FetchFn<V>, pipeline: &Pipeline<V>) -> Result<V> {
        let fetch_started = Instant::now();
        let fetched = fetch().await;

        if let Some(monitor) = &self.inner.monitor {
            let status = if fetched.is_ok() { STATUS_OK } else { STATUS_FAILED };
            monitor.record_api_call(key, fetch_started.elapsed(), status);
        }

        let raw = fetched.map_err(|e| Error::fetch(key, e))?;
        pipeline.run(raw).await
    }

    /// Write the result back and release the registration
    fn settle(&self, key: &str, generation: u64, result: &Result<V>, resolved: &ResolvedOptions<V>) {
        let mut registry = self.inner.registry.lock();
        let superseded = registry.superseded.remove(&generation);

        match result {
            Ok(_) if superseded => debug!("Discarding superseded result for {}", key),
            Ok(value) if !resolved.skip_cache => {
                let mut options = SetOptions::new().with_priority(resolved.priority);
                options.ttl = resolved.ttl;
                self.inner.cache.set(key, value.clone(), options);
            }
            Ok(_) => {}
            Err(e) => {
                self.inner.stats.record_failure();
                if !e.is_cancelled() {
                    warn!("Load of {} failed: {}", key, e);
                }
            }
        }

        if !superseded {
            let current = registry.in_flight.get(key).map(|f| f.generation);
            if current == Some(generation) {
                registry.in_flight.remove(key);
            }
        }
    }

    /// Merge config ⊕ processor options ⊕ call site (call site wins)
    fn resolve(&self, options: &LoadOptions<V>) -> ResolvedOptions<V> {
        let config = self.inner.config.read().clone();
        let (processor, defaults) = match options
            .data_type
            .as_deref()
            .and_then(|dt| self.inner.processors.get(dt))
        {
            Some(registered) => (Some(registered.processor), registered.options),
            None => (None, ProcessorOptions::default()),
        };

        let batchable = options.batchable.or(defaults.batchable).unwrap_or(false);
        let batch_key = options
            .batch_key
            .clone()
            .or_else(|| options.data_type.clone())
            .unwrap_or_else(|| DEFAULT_BATCH_KEY.to_string());

        ResolvedOptions {
            data_type: options.data_type.clone(),
            priority: options
                .priority
                .or(defaults.cache_priority)
                .unwrap_or(config.default_cache_priority),
            ttl: options.ttl.or(defaults.cache_ttl).or(config.default_cache_ttl),
            batch_key,
            batch_fn: if batchable { options.batch_fn.clone() } else { None },
            skip_cache: options.skip_cache,
            force_reload: options.force_reload,
            retry_attempts: options.retry_attempts.unwrap_or(config.retry_attempts),
            retry_delay: config.retry_delay,
            processing_timeout: config.processing_timeout,
            batch_delay: config.batch_delay,
            max_batch_size: config.max_batch_size,
            log_timings: config.log_timings,
            processor,
        }
    }

    /// Load several keys concurrently; failures are captured per key
    pub async fn load_many<I>(&self, items: I) -> HashMap<String, LoadOutcome<V>>
    where
        I: IntoIterator<Item = LoadItem<V>>,
    {
        let loads = items.into_iter().map(|item| {
            let key = item.key.clone();
            async move {
                let result = self.load_with(item.key, item.fetch, item.options).await;
                (key, LoadOutcome::from(result))
            }
        });

        join_all(loads).await.into_iter().collect()
    }

    /// Warm the cache in the background at LOW priority
    ///
    /// Keys already cached are skipped. The loads run as detached tasks:
    /// dropping the handle does not stop them, failures are logged, and
    /// `PrefetchHandle::join` collects the outcomes if wanted.
    pub fn prefetch<I>(&self, items: I) -> PrefetchHandle
    where
        I: IntoIterator<Item = LoadItem<V>>,
    {
        if !self.inner.config.read().enable_prefetching {
            debug!("Prefetching disabled, ignoring request");
            return PrefetchHandle::default();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime, prefetch skipped");
                return PrefetchHandle::default();
            }
        };

        let mut handle = PrefetchHandle::default();
        for item in items {
            if self.inner.cache.has(&item.key) {
                handle.skipped += 1;
                continue;
            }

            let LoadItem { key, fetch, options } = item;
            let loader = self.clone();
            let options = options.priority(Priority::Low);
            let task_key = key.clone();
            let task = runtime.spawn(async move {
                let result = loader.load_with(task_key, fetch, options).await;
                if let Err(e) = &result {
                    warn!("Prefetch failed: {}", e);
                }
                result.map(|_| ())
            });
            handle.tasks.push((key, task));
        }

        debug!(
            "Prefetch scheduled {} loads, skipped {} cached keys",
            handle.tasks.len(),
            handle.skipped
        );
        handle
    }

    /// Register or replace the processor for a data type
    pub fn register_processor<P>(&self, data_type: impl Into<String>, processor: P, options: ProcessorOptions)
    where
        P: DataProcessor<V> + 'static,
    {
        let data_type = data_type.into();
        if self
            .inner
            .processors
            .register(data_type.clone(), Arc::new(processor), options)
        {
            debug!("Replaced processor for {}", data_type);
        } else {
            info!("Registered processor for {}", data_type);
        }
    }

    pub fn unregister_processor(&self, data_type: &str) -> bool {
        self.inner.processors.unregister(data_type)
    }

    pub fn has_processor(&self, data_type: &str) -> bool {
        self.inner.processors.contains(data_type)
    }

    /// Apply a partial configuration update
    ///
    /// The update is rejected as a whole if the merged configuration is invalid.
    pub fn configure(&self, update: ConfigUpdate) -> Result<()> {
        let mut config = self.inner.config.write();
        let mut merged = config.clone();
        merged.apply(&update);
        merged.validate()?;
        *config = merged;
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> LoaderConfig {
        self.inner.config.read().clone()
    }

    pub fn stats(&self) -> LoaderStatsSnapshot {
        let in_flight = self.inner.registry.lock().in_flight.len();
        self.inner
            .stats
            .snapshot(in_flight, self.inner.batches.pending_groups())
    }

    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// Reject queued batch waiters, stop batch timers and clear the in-flight registry
    ///
    /// Direct fetches already running still settle for their callers, but
    /// their results are no longer written into the cache.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.inner.batches.cancel_all();

        let mut registry = self.inner.registry.lock();
        let dropped: Vec<u64> = registry.in_flight.drain().map(|(_, f)| f.generation).collect();
        registry.superseded.extend(dropped.iter().copied());

        info!(
            "Cancelled {} batch waiters, released {} in-flight loads",
            cancelled,
            dropped.len()
        );
        cancelled
    }

    /// Number of keys with a pending request
    pub fn in_flight(&self) -> usize {
        self.inner.registry.lock().in_flight.len()
    }

    pub fn cache(&self) -> &TieredCache<V> {
        &self.inner.cache
    }

    pub fn monitor(&self) -> Option<&PerformanceMonitor> {
        self.inner.monitor.as_ref()
    }
}

/// Detached prefetch loads
#[derive(Debug, Default)]
pub struct PrefetchHandle {
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
    skipped: usize,
}

impl PrefetchHandle {
    /// Loads started
    pub fn scheduled(&self) -> usize {
        self.tasks.len()
    }

    /// Keys skipped because they were already cached
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Wait for every prefetch and collect the per-key outcome
    pub async fn join(self) -> Vec<(String, Result<()>)> {
        let (keys, tasks): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        keys.into_iter()
            .zip(join_all(tasks).await)
            .map(|(key, joined)| {
                let outcome = joined.unwrap_or_else(|e| Err(Error::Internal(format!("prefetch task failed: {}", e))));
                (key, outcome)
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GetOptions;
    use crate::clock::TokioClock;
    use crate::config::CacheConfig;
    use crate::loader::{batch_fn, FnProcessor};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn loader<V: Clone + Send + Sync + 'static>() -> DataLoader<V> {
        let cache = TieredCache::new(CacheConfig::default(), TokioClock::shared());
        DataLoader::new(
            cache,
            LoaderConfig {
                retry_delay: Duration::from_millis(100),
                ..LoaderConfig::default()
            },
        )
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_after_load() {
        let loader = loader::<u32>();
        let calls = counter();

        for _ in 0..2 {
            let calls = calls.clone();
            let value = loader
                .load(
                    "k",
                    move || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, BoxError>(7)
                        }
                    },
                    LoadOptions::new(),
                )
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = loader.stats();
        assert_eq!(stats.total_loads, 2);
        assert_eq!(stats.cached_loads, 1);
        assert_eq!(stats.direct_loads, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_deduplicated() {
        let loader = loader::<u32>();
        let calls = counter();

        let fetch = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>(42)
                }
            }
        };

        let (a, b) = tokio::join!(
            loader.load("k", fetch.clone(), LoadOptions::new()),
            loader.load("k", fetch, LoadOptions::new()),
        );

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.stats().deduplicated_loads, 1);
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let loader = loader::<u32>();
        let calls = counter();
        let c = calls.clone();

        let result = loader
            .load(
                "k",
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, BoxError>("unavailable".into())
                    }
                },
                LoadOptions::new().retry_attempts(3),
            )
            .await;

        assert_matches!(result, Err(Error::Fetch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let stats = loader.stats();
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.failed_loads, 1);
        assert!(!loader.cache().has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let loader = loader::<u32>();
        let calls = counter();
        let c = calls.clone();

        let value = loader
            .load(
                "k",
                move || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err::<u32, BoxError>("flaky".into())
                        } else {
                            Ok(9)
                        }
                    }
                },
                LoadOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(value, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.stats().retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_is_retried() {
        let loader = loader::<u32>();
        loader.register_processor(
            "even",
            FnProcessor::new(|v: u32| v).with_validator(|v| v % 2 == 0),
            ProcessorOptions::new(),
        );
        let calls = counter();
        let c = calls.clone();

        let result = loader
            .load(
                "k",
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(3)
                    }
                },
                LoadOptions::new().data_type("even").retry_attempts(1),
            )
            .await;

        assert_matches!(result, Err(Error::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_through_stores_processed_value() {
        let loader = loader::<u32>();
        loader.register_processor(
            "double",
            FnProcessor::new(|v: u32| v * 2),
            ProcessorOptions::new().cache_priority(Priority::High),
        );

        let value = loader
            .load("k", || async { Ok::<_, BoxError>(21) }, LoadOptions::new().data_type("double"))
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            loader.cache().get_with("k", GetOptions::skip_validation()),
            Some(42)
        );
        assert_eq!(loader.cache().priority_of("k"), Some(Priority::High));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_site_priority_wins() {
        let loader = loader::<u32>();
        loader.register_processor(
            "t",
            FnProcessor::new(|v: u32| v),
            ProcessorOptions::new().cache_priority(Priority::High),
        );

        loader
            .load(
                "k",
                || async { Ok::<_, BoxError>(1) },
                LoadOptions::new().data_type("t").priority(Priority::Low),
            )
            .await
            .unwrap();
        assert_eq!(loader.cache().priority_of("k"), Some(Priority::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_cache() {
        let loader = loader::<u32>();
        loader.cache().set("k", 1, SetOptions::new());

        let value = loader
            .load("k", || async { Ok::<_, BoxError>(2) }, LoadOptions::new().skip_cache())
            .await
            .unwrap();

        assert_eq!(value, 2);
        // Neither read nor written
        assert_eq!(loader.cache().get("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_load_still_settles() {
        let loader = loader::<u32>();
        let calls = counter();
        let c = calls.clone();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            loader.load(
                "k",
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, BoxError>(7)
                    }
                },
                LoadOptions::new(),
            ),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(loader.in_flight(), 0);
        assert_eq!(loader.cache().get("k"), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Served from the cache without another fetch
        let value = loader
            .load("k", || async { Ok::<_, BoxError>(8) }, LoadOptions::new())
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_reload_after_abandoned_load() {
        let loader = loader::<u32>();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            loader.load(
                "k",
                || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, BoxError>(1)
                },
                LoadOptions::new(),
            ),
        )
        .await;
        assert!(abandoned.is_err());

        let forced = loader
            .load("k", || async { Ok::<_, BoxError>(2) }, LoadOptions::new().force_reload())
            .await
            .unwrap();
        assert_eq!(forced, 2);

        tokio::time::sleep(Duration::from_millis(200)).await;

        // The older request settled without overwriting or leaking a registration
        assert_eq!(loader.cache().get("k"), Some(2));
        assert_eq!(loader.in_flight(), 0);
        assert!(loader.inner.registry.lock().superseded.is_empty());
    }

    struct SlowProcessor(Duration);

    #[async_trait]
    impl DataProcessor<u32> for SlowProcessor {
        async fn process(&self, data: u32) -> std::result::Result<u32, BoxError> {
            tokio::time::sleep(self.0).await;
            Ok(data)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_processing_timeout_uses_retry_budget() {
        let loader = loader::<u32>();
        loader
            .configure(ConfigUpdate {
                processing_timeout: Some(Duration::from_millis(100)),
                ..Default::default()
            })
            .unwrap();
        loader.register_processor(
            "slow",
            SlowProcessor(Duration::from_secs(1)),
            ProcessorOptions::new(),
        );
        let calls = counter();
        let c = calls.clone();

        let result = loader
            .load(
                "k",
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(3)
                    }
                },
                LoadOptions::new().data_type("slow").retry_attempts(1),
            )
            .await;

        assert_matches!(
            result,
            Err(Error::ProcessingTimeout { timeout, .. }) if timeout == Duration::from_millis(100)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = loader.stats();
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.failed_loads, 1);
        assert!(!loader.cache().has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reload_supersedes_pending_request() {
        let loader = loader::<u32>();

        let slow = loader.load(
            "k",
            || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, BoxError>(1)
            },
            LoadOptions::new(),
        );
        let forced = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            loader
                .load(
                    "k",
                    || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, BoxError>(2)
                    },
                    LoadOptions::new().force_reload(),
                )
                .await
        };

        let (slow, forced) = tokio::join!(slow, forced);
        assert_eq!(slow.unwrap(), 1);
        assert_eq!(forced.unwrap(), 2);

        // The superseded result does not overwrite the newer one
        assert_eq!(loader.cache().get("k"), Some(2));
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_loads_share_one_call() {
        let loader = loader::<u32>();
        let calls = counter();
        let c = calls.clone();
        let f = batch_fn(move |keys: Vec<String>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(
                    keys.into_iter()
                        .map(|k| {
                            let n = k.len() as u32;
                            (k, n)
                        })
                        .collect::<HashMap<_, _>>(),
                )
            }
        });
        let never = || async { Err::<u32, BoxError>("direct fetch not expected".into()) };

        let (a, b, c) = tokio::join!(
            loader.load("a", never, LoadOptions::new().batch("g", f.clone())),
            loader.load("bb", never, LoadOptions::new().batch("g", f.clone())),
            loader.load("ccc", never, LoadOptions::new().batch("g", f)),
        );

        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 2, 3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = loader.stats();
        assert_eq!(stats.batched_loads, 3);
        assert_eq!(stats.batches_executed, 1);
        assert_eq!(loader.cache().get("bb"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_fn_ignored_when_not_batchable() {
        let loader = loader::<u32>();
        let f = batch_fn(|_keys: Vec<String>| async {
            Err::<HashMap<String, u32>, BoxError>("batch not expected".into())
        });

        let value = loader
            .load(
                "k",
                || async { Ok::<_, BoxError>(5) },
                LoadOptions::new().batch("g", f).batchable(false),
            )
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(loader.stats().batched_loads, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_rejects_batch_waiters() {
        let loader = loader::<u32>();
        let f = batch_fn(|keys: Vec<String>| async move {
            Ok::<_, BoxError>(keys.into_iter().map(|k| (k, 1u32)).collect::<HashMap<_, _>>())
        });
        let never = || async { Err::<u32, BoxError>("unused".into()) };

        let pending = loader.load("a", never, LoadOptions::new().batch("g", f));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            loader.cancel_all()
        };

        let (result, cancelled) = tokio::join!(pending, cancel);
        assert_eq!(cancelled, 1);
        assert_matches!(result, Err(Error::Cancelled { .. }));
        assert!(!loader.cache().has("a"));
        assert_eq!(loader.stats().pending_batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_many_captures_failures() {
        let loader = loader::<u32>();
        let items = vec![
            LoadItem::new("ok", || async { Ok::<_, BoxError>(1) }, LoadOptions::new()),
            LoadItem::new(
                "bad",
                || async { Err::<u32, BoxError>("nope".into()) },
                LoadOptions::new().retry_attempts(0),
            ),
        ];

        let results = loader.load_many(items).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results["ok"].data, Some(1));
        assert!(results["bad"].data.is_none());
        assert_matches!(results["bad"].error, Some(Error::Fetch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_loads_at_low_priority() {
        let loader = loader::<u32>();
        loader.cache().set("cached", 0, SetOptions::new());

        let handle = loader.prefetch(vec![
            LoadItem::new("cached", || async { Ok::<_, BoxError>(1) }, LoadOptions::new()),
            LoadItem::new(
                "fresh",
                || async { Ok::<_, BoxError>(2) },
                LoadOptions::new().priority(Priority::High),
            ),
        ]);
        assert_eq!(handle.scheduled(), 1);
        assert_eq!(handle.skipped(), 1);

        let outcomes = handle.join().await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].1.is_ok());
        assert_eq!(loader.cache().priority_of("fresh"), Some(Priority::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_disabled() {
        let loader = loader::<u32>();
        loader
            .configure(ConfigUpdate {
                enable_prefetching: Some(false),
                ..Default::default()
            })
            .unwrap();

        let handle = loader.prefetch(vec![LoadItem::new(
            "k",
            || async { Ok::<_, BoxError>(1) },
            LoadOptions::new(),
        )]);
        assert_eq!(handle.scheduled(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_failure_is_reported_not_raised() {
        let loader = loader::<u32>();
        let handle = loader.prefetch(vec![LoadItem::new(
            "k",
            || async { Err::<u32, BoxError>("down".into()) },
            LoadOptions::new().retry_attempts(0),
        )]);

        let outcomes = handle.join().await;
        assert_matches!(outcomes[0].1, Err(Error::Fetch { .. }));
    }

    #[test]
    fn test_prefetch_without_runtime_is_skipped() {
        let loader = loader::<u32>();
        let handle = loader.prefetch(vec![LoadItem::new(
            "k",
            || async { Ok::<_, BoxError>(1) },
            LoadOptions::new(),
        )]);

        assert_eq!(handle.scheduled(), 0);
        assert_eq!(loader.in_flight(), 0);
    }

    #[test]
    fn test_configure_rejects_invalid_update() {
        let loader = loader::<u32>();
        let result = loader.configure(ConfigUpdate {
            max_batch_size: Some(0),
            retry_attempts: Some(7),
            ..Default::default()
        });

        assert_matches!(result, Err(Error::Config(_)));
        // Nothing from the rejected update was applied
        assert_eq!(loader.config().retry_attempts, 2);
    }

    #[test]
    fn test_unregister_processor() {
        let loader = loader::<u32>();
        loader.register_processor("t", FnProcessor::new(|v: u32| v), ProcessorOptions::new());
        assert!(loader.has_processor("t"));
        assert!(loader.unregister_processor("t"));
        assert!(!loader.has_processor("t"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stats() {
        let loader = loader::<u32>();
        loader
            .load("k", || async { Ok::<_, BoxError>(1) }, LoadOptions::new())
            .await
            .unwrap();
        loader.reset_stats();

        let stats = loader.stats();
        assert_eq!(stats.total_loads, 0);
        assert_eq!(stats.average_load_time_ms, 0.0);
    }
}
