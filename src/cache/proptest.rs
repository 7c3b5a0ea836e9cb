//! Property-Based Tests for the Tiered Cache
//!
//! # Test Properties
//!
//! 1. **Tier Capacity**: no tier ever holds more than its `max_entries`
//! 2. **Eviction Accounting**: entries held + evictions = distinct inserts
//! 3. **Tier Isolation**: filling one tier never evicts from another
//! 4. **Latest Write Wins**: a live key always returns its last value

#![cfg(test)]

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;

use super::{Priority, SetOptions, TieredCache};
use crate::clock::ManualClock;
use crate::config::{CacheConfig, TierConfig};

// =============================================================================
// Property Strategies
// =============================================================================

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::High), Just(Priority::Medium), Just(Priority::Low)]
}

/// Small capacities so eviction is exercised on every run
fn capacity_strategy() -> impl Strategy<Value = (usize, usize, usize)> {
    (1usize..=4, 1usize..=6, 1usize..=8)
}

/// Sequence of `(key index, priority, value)` writes
fn writes_strategy() -> impl Strategy<Value = Vec<(u8, Priority, u32)>> {
    prop::collection::vec((0u8..24, priority_strategy(), any::<u32>()), 1..120)
}

fn small_cache(high: usize, medium: usize, low: usize) -> TieredCache<u32> {
    let tier = |max_entries| TierConfig {
        ttl: Duration::from_secs(60),
        max_entries,
    };
    let config = CacheConfig {
        high: tier(high),
        medium: tier(medium),
        low: tier(low),
        cleanup_interval: Duration::from_secs(300),
    };
    TieredCache::new(config, ManualClock::new().shared())
}

// =============================================================================
// Capacity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: tier occupancy never exceeds its capacity.
    #[test]
    fn prop_tier_capacity_respected(
        (high, medium, low) in capacity_strategy(),
        writes in writes_strategy(),
    ) {
        let cache = small_cache(high, medium, low);

        for (key, priority, value) in writes {
            cache.set(format!("k{}", key), value, SetOptions::new().with_priority(priority));

            let stats = cache.stats();
            for tier in &stats.tiers {
                prop_assert!(
                    tier.current <= tier.max,
                    "tier {} holds {} > {}",
                    tier.priority,
                    tier.current,
                    tier.max
                );
            }
            prop_assert_eq!(
                stats.total_entries,
                stats.tiers.iter().map(|t| t.current).sum::<usize>()
            );
        }
    }

    /// Property: with unique keys every insert is either held or was evicted.
    #[test]
    fn prop_evictions_account_for_inserts(
        (high, medium, low) in capacity_strategy(),
        priorities in prop::collection::vec(priority_strategy(), 1..80),
    ) {
        let cache = small_cache(high, medium, low);

        for (i, priority) in priorities.iter().enumerate() {
            cache.set(format!("unique-{}", i), i as u32, SetOptions::new().with_priority(*priority));
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.total_entries as u64 + stats.evictions, priorities.len() as u64);
    }

    /// Property: writes to one tier never displace entries of another tier.
    #[test]
    fn prop_tiers_isolated(
        (high, medium, low) in capacity_strategy(),
        low_writes in 1usize..40,
    ) {
        let cache = small_cache(high, medium, low);
        for i in 0..high {
            cache.set(format!("high-{}", i), i as u32, SetOptions::new().with_priority(Priority::High));
        }

        for i in 0..low_writes {
            cache.set(format!("low-{}", i), i as u32, SetOptions::new().with_priority(Priority::Low));
        }

        for i in 0..high {
            let key = format!("high-{}", i);
            prop_assert!(cache.has(&key), "{} was evicted by LOW writes", key);
        }
    }

    /// Property: a key still present returns the value of its latest write.
    #[test]
    fn prop_latest_write_wins(writes in writes_strategy()) {
        let cache = small_cache(50, 100, 200);
        let mut expected = HashMap::new();

        for (key, priority, value) in writes {
            let key = format!("k{}", key);
            cache.set(key.clone(), value, SetOptions::new().with_priority(priority));
            expected.insert(key, value);
        }

        for (key, value) in expected {
            prop_assert_eq!(cache.get(&key), Some(value));
        }
    }
}
