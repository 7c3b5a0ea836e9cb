//! Load Orchestrator
//!
//! Serves keys from the tiered cache when possible and otherwise fetches
//! them through caller-supplied functions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           DataLoader                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  load(key) ──► cache hit? ──yes──► value                        │
//! │                   │ no                                          │
//! │                   ▼                                             │
//! │         in-flight registry ──pending──► join shared future      │
//! │                   │ new                                         │
//! │          ┌────────┴─────────┐                                   │
//! │          ▼                  ▼                                   │
//! │    BatchQueue          direct fetch                             │
//! │  (delay | max size)    (retry_attempts + 1 tries)               │
//! │          └────────┬─────────┘                                   │
//! │                   ▼                                             │
//! │   Pipeline: process (timeout) ► validate ► transform            │
//! │                   ▼                                             │
//! │           TieredCache::set (priority, ttl)                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Effective options are resolved per call: the loader configuration is
//! overridden by the data type's registered processor options, which are in
//! turn overridden by the call-site `LoadOptions`.

mod batch;
mod options;
mod orchestrator;
mod pipeline;
mod processor;
mod stats;

pub use options::{
    batch_fn, fetch_fn, BatchFn, BatchFuture, FetchFn, FetchFuture, LoadItem, LoadOptions,
    LoadOutcome,
};
pub use orchestrator::{DataLoader, PrefetchHandle, DEFAULT_BATCH_KEY};
pub use processor::{DataProcessor, FnProcessor, ProcessorOptions, ProcessorRegistry, RegisteredProcessor};
pub use stats::{LoaderStats, LoaderStatsSnapshot};
