//! Named Timestamps

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// `mark`/`measure` ledger
#[derive(Debug, Default, Clone)]
pub struct MarkLedger {
    marks: HashMap<String, Instant>,
}

impl MarkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` at `now`, replacing an earlier mark of the same name
    pub fn mark(&mut self, name: impl Into<String>, now: Instant) {
        self.marks.insert(name.into(), now);
    }

    /// Time from `start` to `end` (or to `now` when `end` is absent or unknown)
    ///
    /// An unknown `start` measures as zero.
    pub fn measure(&self, start: &str, end: Option<&str>, now: Instant) -> Duration {
        let start = match self.marks.get(start) {
            Some(at) => *at,
            None => return Duration::ZERO,
        };
        let end = end.and_then(|name| self.marks.get(name)).copied().unwrap_or(now);
        end.saturating_duration_since(start)
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
