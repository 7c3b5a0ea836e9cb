//! Priority Tiers
//!
//! Every entry is tagged with one of three priorities. Each priority owns a
//! tier with its own default TTL and entry budget; eviction never crosses
//! tier boundaries.

use serde::{Deserialize, Serialize};

/// Cache priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Long-lived, small tier
    #[serde(alias = "high", alias = "High")]
    High,
    /// Default tier
    #[serde(alias = "medium", alias = "Medium")]
    Medium,
    /// Short-lived, large tier (prefetched data lands here)
    #[serde(alias = "low", alias = "Low")]
    Low,
}

impl Priority {
    /// All tiers, highest first
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Dense index for per-tier arrays
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            other => Err(crate::error::Error::Config(format!(
                "unknown cache priority: {}",
                other
            ))),
        }
    }
}

/// Per-tier entry counters
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TierCounts([usize; 3]);

impl TierCounts {
    #[inline]
    pub(crate) fn get(&self, priority: Priority) -> usize {
        self.0[priority.index()]
    }

    #[inline]
    pub(crate) fn increment(&mut self, priority: Priority) {
        self.0[priority.index()] += 1;
    }

    #[inline]
    pub(crate) fn decrement(&mut self, priority: Priority) {
        let slot = &mut self.0[priority.index()];
        *slot = slot.saturating_sub(1);
    }

    pub(crate) fn reset(&mut self) {
        self.0 = [0; 3];
    }
}

// =============================================================================
// Tests
// =============================================================================
