//! Tiered Cache
//!
//! In-memory key/value store partitioned by priority.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         TieredCache<V>                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  HIGH tier           │ MEDIUM tier         │ LOW tier            │
//! │  TTL 30min, 50 max   │ TTL 10min, 100 max  │ TTL 2min, 200 max   │
//! │         │            │         │           │         │           │
//! │         └────────────┴─────────┴───────────┴─────────┘           │
//! │                              │                                   │
//! │               LRU eviction within a tier only                    │
//! │           Sweeper: cleanup() every cleanup_interval              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An entry is live while `now < expires_at` and its validator (if any)
//! accepts it. Dead entries are removed lazily on access or by the sweep;
//! misses and expiry are reported as `None`, never as errors.

mod entry;
mod metrics;
mod proptest;
mod store;
mod sweeper;
mod tier;

pub use entry::{CacheEntry, GetOptions, Metadata, SetOptions, Validator};
pub use metrics::{CacheMetrics, CacheStats, TierStats};
pub use store::{TieredCache, Weigher};
pub use sweeper::SweeperHandle;
pub use tier::Priority;
