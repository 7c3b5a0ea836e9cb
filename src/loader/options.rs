//! Load Options
//!
//! Call-site options for `DataLoader::load` and their resolution against the
//! registered processor and the global configuration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use super::processor::DataProcessor;
use crate::cache::Priority;
use crate::error::{BoxError, Error, Result};

/// Boxed future returned by a fetch function
pub type FetchFuture<V> = BoxFuture<'static, std::result::Result<V, BoxError>>;

/// Caller-supplied fetch function, invoked once per attempt
pub type FetchFn<V> = Arc<dyn Fn() -> FetchFuture<V> + Send + Sync>;

/// Boxed future returned by a batch function
pub type BatchFuture<V> = BoxFuture<'static, std::result::Result<HashMap<String, V>, BoxError>>;

/// Caller-supplied batch function: all keys of one flush in, `key → value` out
pub type BatchFn<V> = Arc<dyn Fn(Vec<String>) -> BatchFuture<V> + Send + Sync>;

/// Wrap an async closure as a [`FetchFn`]
pub fn fetch_fn<V, F, Fut>(f: F) -> FetchFn<V>
where
    V: 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Wrap an async closure as a [`BatchFn`]
pub fn batch_fn<V, F, Fut>(f: F) -> BatchFn<V>
where
    V: 'static,
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<HashMap<String, V>, BoxError>> + Send + 'static,
{
    Arc::new(move |keys| f(keys).boxed())
}

/// Call-site options; unset fields fall back to the processor, then the config
pub struct LoadOptions<V> {
    /// Data type selecting the registered processor
    pub data_type: Option<String>,
    pub priority: Option<Priority>,
    pub ttl: Option<Duration>,
    pub batchable: Option<bool>,
    /// Batch group (defaults to the data type)
    pub batch_key: Option<String>,
    pub batch_fn: Option<BatchFn<V>>,
    /// Neither read nor write the cache
    pub skip_cache: bool,
    /// Bypass both the cache read and in-flight dedup
    pub force_reload: bool,
    pub retry_attempts: Option<u32>,
}

impl<V> LoadOptions<V> {
    pub fn new() -> Self {
        Self {
            data_type: None,
            priority: None,
            ttl: None,
            batchable: None,
            batch_key: None,
            batch_fn: None,
            skip_cache: false,
            force_reload: false,
            retry_attempts: None,
        }
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn batchable(mut self, batchable: bool) -> Self {
        self.batchable = Some(batchable);
        self
    }

    /// Join batch group `batch_key`, flushed through `batch_fn`
    pub fn batch(mut self, batch_key: impl Into<String>, batch_fn: BatchFn<V>) -> Self {
        self.batch_key = Some(batch_key.into());
        self.batch_fn = Some(batch_fn);
        self.batchable = Some(true);
        self
    }

    /// Batch through `batch_fn` in the data type's group
    pub fn batch_fn(mut self, batch_fn: BatchFn<V>) -> Self {
        self.batch_fn = Some(batch_fn);
        self.batchable = Some(true);
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn force_reload(mut self) -> Self {
        self.force_reload = true;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}

impl<V> Default for LoadOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for LoadOptions<V> {
    fn clone(&self) -> Self {
        Self {
            data_type: self.data_type.clone(),
            priority: self.priority,
            ttl: self.ttl,
            batchable: self.batchable,
            batch_key: self.batch_key.clone(),
            batch_fn: self.batch_fn.clone(),
            skip_cache: self.skip_cache,
            force_reload: self.force_reload,
            retry_attempts: self.retry_attempts,
        }
    }
}

impl<V> std::fmt::Debug for LoadOptions<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOptions")
            .field("data_type", &self.data_type)
            .field("priority", &self.priority)
            .field("ttl", &self.ttl)
            .field("batchable", &self.batchable)
            .field("batch_key", &self.batch_key)
            .field("has_batch_fn", &self.batch_fn.is_some())
            .field("skip_cache", &self.skip_cache)
            .field("force_reload", &self.force_reload)
            .field("retry_attempts", &self.retry_attempts)
            .finish()
    }
}

/// Effective options after merging config, processor and call site
pub(crate) struct ResolvedOptions<V> {
    pub data_type: Option<String>,
    pub priority: Priority,
    pub ttl: Option<Duration>,
    pub batch_key: String,
    /// Present only when the request is batchable and a batch function was supplied
    pub batch_fn: Option<BatchFn<V>>,
    pub skip_cache: bool,
    pub force_reload: bool,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub processing_timeout: Duration,
    pub batch_delay: Duration,
    pub max_batch_size: usize,
    pub log_timings: bool,
    pub processor: Option<Arc<dyn DataProcessor<V>>>,
}

impl<V> ResolvedOptions<V> {
    pub fn is_batched(&self) -> bool {
        self.batch_fn.is_some()
    }
}

/// One entry of `DataLoader::load_many` / `DataLoader::prefetch`
pub struct LoadItem<V> {
    pub key: String,
    pub fetch: FetchFn<V>,
    pub options: LoadOptions<V>,
}

impl<V> LoadItem<V> {
    pub fn new<F, Fut>(key: impl Into<String>, fetch: F, options: LoadOptions<V>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
        V: 'static,
    {
        Self {
            key: key.into(),
            fetch: fetch_fn(fetch),
            options,
        }
    }
}

/// Per-key result of `DataLoader::load_many`
#[derive(Debug, Clone)]
pub struct LoadOutcome<V> {
    pub data: Option<V>,
    pub error: Option<Error>,
}

impl<V> LoadOutcome<V> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<V> {
        match (self.data, self.error) {
            (_, Some(e)) => Err(e),
            (Some(v), None) => Ok(v),
            (None, None) => Err(Error::Internal("load outcome without data".into())),
        }
    }
}

impl<V> From<Result<V>> for LoadOutcome<V> {
    fn from(result: Result<V>) -> Self {
        match result {
            Ok(v) => Self {
                data: Some(v),
                error: None,
            },
            Err(e) => Self {
                data: None,
                error: Some(e),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
