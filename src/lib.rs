//! Dashload - Tiered caching and data loading for dashboard backends
//!
//! Serves keyed data from an in-memory, priority-tiered cache and loads
//! misses through caller-supplied fetch functions with request
//! de-duplication, time-windowed batching, bounded retries and a
//! per-data-type processing pipeline. A performance monitor records timing
//! samples and derives warnings and optimization suggestions.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          caller / façade                       │
//! └───────────────┬────────────────────────────────────────────────┘
//!                 │ load / load_many / prefetch
//!                 ▼
//! ┌──────────────────────────┐   api call samples  ┌──────────────────────┐
//! │   DataLoader (loader)    │────────────────────▶│ PerformanceMonitor   │
//! │ dedup · batch · retry ·  │                     │     (telemetry)      │
//! │ process · validate       │                     └──────────────────────┘
//! └───────────────┬──────────┘
//!                 │ get / set
//!                 ▼
//! ┌──────────────────────────┐
//! │  TieredCache (cache)     │
//! │  HIGH · MEDIUM · LOW     │
//! └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Priority-tiered cache with TTL, validators and LRU eviction
//! - [`loader`] - Load orchestration over the cache
//! - [`telemetry`] - Performance samples, warnings and reports
//! - [`config`] - Configuration for all three components
//! - [`clock`] - Injectable time sources
//! - [`exporter`] - Prometheus text export of statistics
//! - [`error`] - Error types

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod exporter;
pub mod loader;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheStats, GetOptions, Priority, SetOptions, TieredCache};
pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use config::{AppConfig, CacheConfig, ConfigUpdate, LoaderConfig, MonitorConfig};
pub use error::{BoxError, Error, Result};
pub use exporter::MetricsExporter;
pub use loader::{DataLoader, DataProcessor, FnProcessor, LoadItem, LoadOptions, ProcessorOptions};
pub use telemetry::{MonitorOptions, PerformanceMonitor, PerformanceReport};
