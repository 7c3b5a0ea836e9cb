//! Configuration
//!
//! Defaults for the cache tiers, the load orchestrator and the performance
//! monitor, plus loading from YAML/JSON files. Durations are written in
//! milliseconds in files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::Priority;
use crate::error::{Error, Result};

// =============================================================================
// Cache
// =============================================================================

/// Capacity and lifetime of a single priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    /// Default time-to-live for entries stored in this tier
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
    /// Maximum number of entries held by this tier
    pub max_entries: usize,
}

/// Tiered cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// HIGH tier
    pub high: TierConfig,
    /// MEDIUM tier
    pub medium: TierConfig,
    /// LOW tier
    pub low: TierConfig,
    /// Interval of the background expiry sweep
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            high: TierConfig {
                ttl: Duration::from_secs(30 * 60),
                max_entries: 50,
            },
            medium: TierConfig {
                ttl: Duration::from_secs(10 * 60),
                max_entries: 100,
            },
            low: TierConfig {
                ttl: Duration::from_secs(2 * 60),
                max_entries: 200,
            },
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheConfig {
    /// Configuration of one tier
    pub fn tier(&self, priority: Priority) -> &TierConfig {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    /// Reject tiers that could never hold an entry
    pub fn validate(&self) -> Result<()> {
        for priority in Priority::ALL {
            let tier = self.tier(priority);
            if tier.max_entries == 0 {
                return Err(Error::Config(format!(
                    "tier {} must allow at least one entry",
                    priority
                )));
            }
            if tier.ttl.is_zero() {
                return Err(Error::Config(format!(
                    "tier {} must have a non-zero ttl",
                    priority
                )));
            }
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup_interval must be non-zero".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Global options of the load orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// Time to wait before flushing a batch
    #[serde(with = "duration_ms")]
    pub batch_delay: Duration,
    /// Flush a batch as soon as it holds this many requests
    pub max_batch_size: usize,
    /// TTL applied when neither the call site nor the processor sets one
    /// (`None` falls back to the tier default)
    #[serde(with = "option_duration_ms", alias = "defaultCacheTTL")]
    pub default_cache_ttl: Option<Duration>,
    /// Priority applied when neither the call site nor the processor sets one
    pub default_cache_priority: Priority,
    /// Whether `prefetch` schedules anything at all
    pub enable_prefetching: bool,
    /// Retries after the first failed attempt
    pub retry_attempts: u32,
    /// Pause between attempts
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Budget for one run of a data-type processor
    #[serde(with = "duration_ms")]
    pub processing_timeout: Duration,
    /// Log every load with its duration at info level
    pub log_timings: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(50),
            max_batch_size: 10,
            default_cache_ttl: None,
            default_cache_priority: Priority::Medium,
            enable_prefetching: true,
            retry_attempts: 2,
            retry_delay: Duration::from_millis(1000),
            processing_timeout: Duration::from_secs(30),
            log_timings: false,
        }
    }
}

/// Partial update accepted by `DataLoader::configure`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    #[serde(with = "option_duration_ms")]
    pub batch_delay: Option<Duration>,
    pub max_batch_size: Option<usize>,
    #[serde(with = "option_duration_ms", alias = "defaultCacheTTL")]
    pub default_cache_ttl: Option<Duration>,
    pub default_cache_priority: Option<Priority>,
    pub enable_prefetching: Option<bool>,
    pub retry_attempts: Option<u32>,
    #[serde(with = "option_duration_ms")]
    pub retry_delay: Option<Duration>,
    #[serde(with = "option_duration_ms")]
    pub processing_timeout: Option<Duration>,
    pub log_timings: Option<bool>,
}

impl LoaderConfig {
    /// Merge a partial update; unset fields keep their current value
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(v) = update.batch_delay {
            self.batch_delay = v;
        }
        if let Some(v) = update.max_batch_size {
            self.max_batch_size = v;
        }
        if let Some(v) = update.default_cache_ttl {
            self.default_cache_ttl = Some(v);
        }
        if let Some(v) = update.default_cache_priority {
            self.default_cache_priority = v;
        }
        if let Some(v) = update.enable_prefetching {
            self.enable_prefetching = v;
        }
        if let Some(v) = update.retry_attempts {
            self.retry_attempts = v;
        }
        if let Some(v) = update.retry_delay {
            self.retry_delay = v;
        }
        if let Some(v) = update.processing_timeout {
            self.processing_timeout = v;
        }
        if let Some(v) = update.log_timings {
            self.log_timings = v;
        }
    }

    /// Reject values the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config("maxBatchSize must be at least 1".into()));
        }
        if self.processing_timeout.is_zero() {
            return Err(Error::Config("processingTimeout must be non-zero".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Duration thresholds above which a sample raises a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    #[serde(with = "duration_ms")]
    pub page_load: Duration,
    #[serde(with = "duration_ms")]
    pub component_render: Duration,
    #[serde(with = "duration_ms")]
    pub api_call: Duration,
    #[serde(with = "duration_ms")]
    pub resource_load: Duration,
    #[serde(with = "duration_ms")]
    pub long_task: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            page_load: Duration::from_millis(3000),
            component_render: Duration::from_millis(16),
            api_call: Duration::from_millis(1000),
            resource_load: Duration::from_millis(2000),
            long_task: Duration::from_millis(50),
        }
    }
}

/// Performance monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub thresholds: Thresholds,
    /// Interval of the periodic flush and analysis
    #[serde(with = "duration_ms")]
    pub flush_interval: Duration,
    /// Samples kept per series
    pub max_samples: usize,
    /// Warning list capacity
    pub max_warnings: usize,
    /// Suggestion list capacity
    pub max_suggestions: usize,
    /// Slow renders of one component before suggesting memoization
    pub slow_render_count: u64,
    /// Calls to one endpoint (with a slow average) before suggesting caching
    pub slow_api_count: u64,
    /// Long tasks before suggesting offloading work
    pub long_task_count: u64,
    /// Span in which repeated calls to one endpoint count as duplicates
    #[serde(with = "duration_ms")]
    pub duplicate_call_window: Duration,
    /// Calls within the span above which a duplicate-call suggestion fires
    pub duplicate_call_count: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            flush_interval: Duration::from_secs(30),
            max_samples: 100,
            max_warnings: 100,
            max_suggestions: 20,
            slow_render_count: 5,
            slow_api_count: 3,
            long_task_count: 10,
            duplicate_call_window: Duration::from_secs(5),
            duplicate_call_count: 3,
        }
    }
}

impl MonitorConfig {
    /// Reject settings the flush loop or the series cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval.is_zero() {
            return Err(Error::Config("flush_interval must be non-zero".into()));
        }
        if self.max_samples == 0 {
            return Err(Error::Config("max_samples must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Combined file configuration
// =============================================================================

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub loader: LoaderConfig,
    pub monitor: MonitorConfig,
}

impl AppConfig {
    /// Parse YAML
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            other => Err(Error::Config(format!(
                "unsupported config extension: {:?}",
                other
            ))),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.loader.validate()?;
        self.monitor.validate()
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

// =============================================================================
// Tests
// =============================================================================
