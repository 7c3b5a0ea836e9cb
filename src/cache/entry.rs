//! Cache Entry Types

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::tier::Priority;

/// Free-form annotations stored next to a value and handed to its validator
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Liveness predicate attached to an entry
///
/// Runs on a copy of the entry without the cache lock held, so it may read
/// the cache (for example to check that a dependency is still present).
pub type Validator<V> = Arc<dyn Fn(&V, &Metadata) -> bool + Send + Sync>;

/// Options for `TieredCache::set`
pub struct SetOptions<V> {
    /// Target tier
    pub priority: Priority,
    /// TTL override (tier default when `None`)
    pub ttl: Option<Duration>,
    /// Optional liveness predicate
    pub validator: Option<Validator<V>>,
    /// Optional annotations
    pub metadata: Option<Metadata>,
}

impl<V> SetOptions<V> {
    /// Medium priority, tier TTL, no validator
    pub fn new() -> Self {
        Self {
            priority: Priority::Medium,
            ttl: None,
            validator: None,
            metadata: None,
        }
    }

    /// Set the tier
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Override the tier TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Attach a liveness predicate
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&V, &Metadata) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Attach annotations
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl<V> Default for SetOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for SetOptions<V> {
    fn clone(&self) -> Self {
        Self {
            priority: self.priority,
            ttl: self.ttl,
            validator: self.validator.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<V> std::fmt::Debug for SetOptions<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetOptions")
            .field("priority", &self.priority)
            .field("ttl", &self.ttl)
            .field("has_validator", &self.validator.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Options for `TieredCache::get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    /// Bump last-access time and access count on a hit
    pub update_access: bool,
    /// Ignore the entry's validator
    pub skip_validation: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            update_access: true,
            skip_validation: false,
        }
    }
}

impl GetOptions {
    /// Read without touching access statistics
    pub fn peek() -> Self {
        Self {
            update_access: false,
            skip_validation: false,
        }
    }

    /// Read ignoring the validator
    pub fn skip_validation() -> Self {
        Self {
            update_access: true,
            skip_validation: true,
        }
    }
}

/// Why an entry is no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Live,
    Expired,
    Invalid,
}

/// A stored value with its bookkeeping
pub struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) priority: Priority,
    pub(crate) created_at: Instant,
    pub(crate) expires_at: Instant,
    pub(crate) last_accessed_at: Instant,
    /// Identity of this write; a later `set` of the same key gets a new id
    pub(crate) id: u64,
    /// Tiebreaker for entries touched at the same instant
    pub(crate) access_seq: u64,
    pub(crate) access_count: u64,
    pub(crate) validator: Option<Validator<V>>,
    pub(crate) metadata: Metadata,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        value: V,
        options: SetOptions<V>,
        ttl: Duration,
        now: Instant,
        seq: u64,
    ) -> Self {
        Self {
            value,
            priority: options.priority,
            created_at: now,
            expires_at: now + ttl,
            last_accessed_at: now,
            id: seq,
            access_seq: seq,
            access_count: 0,
            validator: options.validator,
            metadata: options.metadata.unwrap_or_default(),
        }
    }

    /// Check liveness at `now`
    ///
    /// `verdict` is the outcome of this entry's validator, evaluated
    /// beforehand with [`CacheEntry::validation`]. A verdict for an older
    /// write of the same key is ignored.
    pub(crate) fn liveness(&self, now: Instant, verdict: Option<Verdict>) -> Liveness {
        if now >= self.expires_at {
            return Liveness::Expired;
        }
        match verdict {
            Some(v) if v.entry_id == self.id && !v.valid => Liveness::Invalid,
            _ => Liveness::Live,
        }
    }

    /// Copy out what the validator needs, if there is one
    pub(crate) fn validation(&self) -> Option<PendingValidation<V>>
    where
        V: Clone,
    {
        let validator = self.validator.clone()?;
        Some(PendingValidation {
            entry_id: self.id,
            validator,
            value: self.value.clone(),
            metadata: self.metadata.clone(),
        })
    }

    /// Record a read
    #[inline]
    pub(crate) fn touch(&mut self, now: Instant, seq: u64) {
        self.last_accessed_at = now;
        self.access_seq = seq;
        self.access_count += 1;
    }

    /// Stored value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Tier of this entry
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Number of recorded reads
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Remaining lifetime at `now` (zero once expired)
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Age at `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Annotations
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Validator input detached from the cache
pub(crate) struct PendingValidation<V> {
    entry_id: u64,
    validator: Validator<V>,
    value: V,
    metadata: Metadata,
}

impl<V> PendingValidation<V> {
    pub(crate) fn run(self) -> Verdict {
        Verdict {
            entry_id: self.entry_id,
            valid: (self.validator)(&self.value, &self.metadata),
        }
    }
}

/// Validator outcome for one write of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Verdict {
    entry_id: u64,
    valid: bool,
}

impl<V> std::fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("priority", &self.priority)
            .field("access_count", &self.access_count)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
