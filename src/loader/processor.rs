//! Data-Type Processors
//!
//! A processor is the process/validate/transform bundle registered for a
//! data type, together with the cache defaults that data type loads with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cache::Priority;
use crate::error::BoxError;

/// Per-data-type processing stage run after every fetch
///
/// # Example
///
/// ```ignore
/// struct Doubler;
///
/// #[async_trait]
/// impl DataProcessor<Vec<u64>> for Doubler {
///     async fn process(&self, data: Vec<u64>) -> Result<Vec<u64>, BoxError> {
///         Ok(data.into_iter().map(|n| n * 2).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait DataProcessor<V>: Send + Sync {
    /// Turn fetched data into its cached form (runs under the processing timeout)
    async fn process(&self, data: V) -> Result<V, BoxError>;

    /// Reject processed data; a rejection fails the attempt and is retried
    fn validate(&self, _data: &V) -> bool {
        true
    }

    /// Final reshaping before the value is cached and returned
    fn transform(&self, data: V) -> V {
        data
    }
}

type ProcessFn<V> = Arc<dyn Fn(V) -> Result<V, BoxError> + Send + Sync>;
type ValidateFn<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;
type TransformFn<V> = Arc<dyn Fn(V) -> V + Send + Sync>;

/// Processor built from plain closures
pub struct FnProcessor<V> {
    process: ProcessFn<V>,
    validate: Option<ValidateFn<V>>,
    transform: Option<TransformFn<V>>,
}

impl<V> FnProcessor<V> {
    /// Processor that maps data through `f`
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(V) -> V + Send + Sync + 'static,
    {
        Self::fallible(move |data| Ok(f(data)))
    }

    /// Processor whose mapping may fail
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(V) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self {
            process: Arc::new(f),
            validate: None,
            transform: None,
        }
    }

    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(V) -> V + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }
}

#[async_trait]
impl<V> DataProcessor<V> for FnProcessor<V>
where
    V: Send + 'static,
{
    async fn process(&self, data: V) -> Result<V, BoxError> {
        (self.process)(data)
    }

    fn validate(&self, data: &V) -> bool {
        self.validate.as_ref().map(|f| f(data)).unwrap_or(true)
    }

    fn transform(&self, data: V) -> V {
        match &self.transform {
            Some(f) => f(data),
            None => data,
        }
    }
}

/// Cache defaults applied to every load of a data type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub cache_priority: Option<Priority>,
    pub cache_ttl: Option<Duration>,
    pub batchable: Option<bool>,
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_priority(mut self, priority: Priority) -> Self {
        self.cache_priority = Some(priority);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn batchable(mut self, batchable: bool) -> Self {
        self.batchable = Some(batchable);
        self
    }
}

/// A processor with its options
pub struct RegisteredProcessor<V> {
    pub processor: Arc<dyn DataProcessor<V>>,
    pub options: ProcessorOptions,
}

impl<V> Clone for RegisteredProcessor<V> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            options: self.options.clone(),
        }
    }
}

/// Data type → processor map, owned by one loader
pub struct ProcessorRegistry<V> {
    entries: DashMap<String, RegisteredProcessor<V>>,
}

impl<V> ProcessorRegistry<V>
where
    V: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register or replace the processor for `data_type`
    pub fn register(
        &self,
        data_type: impl Into<String>,
        processor: Arc<dyn DataProcessor<V>>,
        options: ProcessorOptions,
    ) -> bool {
        self.entries
            .insert(data_type.into(), RegisteredProcessor { processor, options })
            .is_some()
    }

    pub fn unregister(&self, data_type: &str) -> bool {
        self.entries.remove(data_type).is_some()
    }

    pub fn get(&self, data_type: &str) -> Option<RegisteredProcessor<V>> {
        self.entries.get(data_type).map(|e| e.value().clone())
    }

    pub fn contains(&self, data_type: &str) -> bool {
        self.entries.contains_key(data_type)
    }

    pub fn data_types(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for ProcessorRegistry<V>
where
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_processor_stages() {
        let p = FnProcessor::new(|v: Vec<u64>| v.into_iter().map(|n| n * 2).collect())
            .with_validator(|v: &Vec<u64>| !v.is_empty())
            .with_transform(|mut v: Vec<u64>| {
                v.sort_unstable_by(|a, b| b.cmp(a));
                v
            });

        let processed = p.process(vec![1, 3, 2]).await.unwrap();
        assert_eq!(processed, vec![2, 6, 4]);
        assert!(p.validate(&processed));
        assert!(!p.validate(&vec![]));
        assert_eq!(p.transform(processed), vec![6, 4, 2]);
    }

    #[tokio::test]
    async fn test_fallible_processor() {
        let p = FnProcessor::fallible(|v: u32| {
            if v == 0 {
                Err("zero".into())
            } else {
                Ok(v)
            }
        });
        assert!(p.process(0).await.is_err());
        assert_eq!(p.process(7).await.unwrap(), 7);
    }

    #[test]
    fn test_registry_overwrite() {
        let registry: ProcessorRegistry<u32> = ProcessorRegistry::new();
        assert!(!registry.register(
            "accounts",
            Arc::new(FnProcessor::new(|v| v + 1)),
            ProcessorOptions::new(),
        ));
        assert!(registry.register(
            "accounts",
            Arc::new(FnProcessor::new(|v| v + 2)),
            ProcessorOptions::new().cache_priority(Priority::High),
        ));

        assert_eq!(registry.len(), 1);
        let entry = registry.get("accounts").unwrap();
        assert_eq!(entry.options.cache_priority, Some(Priority::High));

        assert!(registry.unregister("accounts"));
        assert!(!registry.contains("accounts"));
        assert!(registry.is_empty());
    }
}
