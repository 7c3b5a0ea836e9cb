//! Dashload Integration Tests
//!
//! Exercises the public API across components:
//! - Tiered cache lifetimes, validators and eviction
//! - Load orchestration over the cache (dedup, batching, retries, processors)
//! - Performance telemetry fed by the loader
//! - Configuration files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::{json, Value};

use dashload::error::BoxError;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// =============================================================================
// Tiered Cache
// =============================================================================

mod cache_tests {
    use super::*;
    use dashload::cache::{GetOptions, Priority, SetOptions, TieredCache};
    use dashload::clock::ManualClock;
    use dashload::config::CacheConfig;
    use dashload::Error;

    fn cache() -> (TieredCache<String>, ManualClock) {
        let clock = ManualClock::new();
        (TieredCache::new(CacheConfig::default(), clock.shared()), clock)
    }

    #[test]
    fn test_tier_default_ttls() {
        let (cache, clock) = cache();
        cache.set("high", "h".into(), SetOptions::new().with_priority(Priority::High));
        cache.set("medium", "m".into(), SetOptions::new());
        cache.set("low", "l".into(), SetOptions::new().with_priority(Priority::Low));

        clock.advance(Duration::from_secs(2 * 60) + Duration::from_millis(1));
        assert_eq!(cache.get("low"), None);
        assert_eq!(cache.get("medium"), Some("m".into()));

        clock.advance(Duration::from_secs(8 * 60));
        assert_eq!(cache.get("medium"), None);
        assert_eq!(cache.get("high"), Some("h".into()));

        clock.advance(Duration::from_secs(20 * 60));
        assert_eq!(cache.get("high"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_explicit_ttl_overrides_tier() {
        let (cache, clock) = cache();
        cache.set(
            "session",
            "token".into(),
            SetOptions::new()
                .with_priority(Priority::High)
                .with_ttl(Duration::from_secs(5)),
        );

        clock.advance(Duration::from_secs(5));
        assert!(!cache.has("session"));
    }

    #[test]
    fn test_lru_eviction_stays_within_tier() {
        let (cache, clock) = cache();
        for i in 0..50 {
            cache.set(format!("h{}", i), "v".into(), SetOptions::new().with_priority(Priority::High));
            clock.advance(Duration::from_millis(1));
        }
        cache.set("m0", "v".into(), SetOptions::new());

        // Touch the oldest HIGH entry so h1 becomes the LRU one
        assert!(cache.get("h0").is_some());
        clock.advance(Duration::from_millis(1));
        cache.set("h50", "v".into(), SetOptions::new().with_priority(Priority::High));

        assert!(cache.has("h0"));
        assert!(!cache.has("h1"));
        assert!(cache.has("m0"));

        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.tier(Priority::High).unwrap().current, 50);
        assert_eq!(stats.tier(Priority::Medium).unwrap().current, 1);
    }

    #[test]
    fn test_validator_invalidates_entry() {
        let (cache, _) = cache();
        cache.set(
            "report",
            "stale".into(),
            SetOptions::new().with_validator(|v: &String, _| v != "stale"),
        );

        assert_eq!(
            cache.get_with("report", GetOptions::skip_validation()),
            Some("stale".into())
        );
        assert_eq!(cache.get("report"), None);
        assert!(!cache.has("report"));
    }

    #[test]
    fn test_refresh_and_update() {
        let (cache, clock) = cache();
        cache.set("k", "a".into(), SetOptions::new().with_priority(Priority::Low));

        clock.advance(Duration::from_secs(100));
        assert!(cache.refresh("k", None));
        clock.advance(Duration::from_secs(100));
        assert!(cache.update("k", |v| format!("{}b", v)));
        assert_eq!(cache.get("k"), Some("ab".into()));

        assert!(!cache.refresh("missing", None));
        assert!(!cache.update("missing", |v| v.clone()));
    }

    #[test]
    fn test_get_or_compute_error_not_cached() {
        let (cache, _) = cache();

        let result = tokio_test::block_on(cache.get_or_compute(
            "k",
            || async { Err::<String, BoxError>("down".into()) },
            SetOptions::new(),
        ));
        assert_matches!(result, Err(Error::Compute { .. }));
        assert!(!cache.has("k"));

        let value = tokio_test::block_on(cache.get_or_compute(
            "k",
            || async { Ok::<_, BoxError>("computed".to_string()) },
            SetOptions::new(),
        ))
        .unwrap();
        assert_eq!(value, "computed");
        assert_eq!(cache.get("k"), Some("computed".into()));
    }

    #[test]
    fn test_cleanup_counts_expired() {
        let (cache, clock) = cache();
        for i in 0..3 {
            cache.set(format!("low{}", i), "v".into(), SetOptions::new().with_priority(Priority::Low));
        }
        cache.set("high", "v".into(), SetOptions::new().with_priority(Priority::High));

        clock.advance(Duration::from_secs(3 * 60));
        assert_eq!(cache.cleanup(), 3);
        assert_eq!(cache.keys(), vec!["high".to_string()]);
    }

    #[test]
    fn test_hit_ratio() {
        let (cache, _) = cache();
        cache.set("a", "1".into(), SetOptions::new());
        cache.get("a");
        cache.get("a");
        cache.get("a");
        cache.get("b");

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio - 0.75).abs() < f64::EPSILON);
    }
}

// =============================================================================
// Load Orchestration
// =============================================================================

mod loader_tests {
    use super::*;
    use dashload::cache::{Priority, TieredCache};
    use dashload::clock::TokioClock;
    use dashload::config::{CacheConfig, ConfigUpdate, LoaderConfig};
    use dashload::loader::{batch_fn, DataLoader, FnProcessor, LoadItem, LoadOptions, ProcessorOptions};
    use dashload::telemetry::{MonitorOptions, PerformanceMonitor};
    use dashload::Error;

    fn loader() -> DataLoader<Value> {
        let cache = TieredCache::new(CacheConfig::default(), TokioClock::shared());
        DataLoader::new(cache, LoaderConfig::default())
    }

    fn accounts_processor() -> FnProcessor<Value> {
        FnProcessor::new(|mut v: Value| {
            let display_name = format!("Account {}", v["id"]);
            v["displayName"] = json!(display_name);
            v
        })
        .with_validator(|v: &Value| v.get("id").is_some())
    }

    #[tokio::test(start_paused = true)]
    async fn test_accounts_round_trip() {
        let loader = loader();
        loader.register_processor(
            "accounts",
            accounts_processor(),
            ProcessorOptions::new().cache_priority(Priority::High),
        );

        let value = loader
            .load(
                "account:7",
                || async { Ok::<_, BoxError>(json!({ "id": 7 })) },
                LoadOptions::new().data_type("accounts"),
            )
            .await
            .unwrap();

        assert_eq!(value["displayName"], "Account 7");
        assert_eq!(loader.cache().get("account:7"), Some(value));
        assert_eq!(loader.cache().priority_of("account:7"), Some(Priority::High));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_not_cached() {
        let loader = loader();
        loader.configure(ConfigUpdate {
            retry_attempts: Some(0),
            ..Default::default()
        })
        .unwrap();
        loader.register_processor("accounts", accounts_processor(), ProcessorOptions::new());

        let result = loader
            .load(
                "account:bad",
                || async { Ok::<_, BoxError>(json!({ "name": "no id" })) },
                LoadOptions::new().data_type("accounts"),
            )
            .await;

        assert_matches!(result, Err(Error::Validation { ref data_type, .. }) if data_type == "accounts");
        assert!(!loader.cache().has("account:bad"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_loads_single_call() {
        let loader = loader();
        let calls = counter();
        let c = calls.clone();
        let fetch_many = batch_fn(move |keys: Vec<String>| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(keys.into_iter().map(|k| (k.clone(), json!({ "id": k }))).collect())
            }
        });

        let items = ["a", "b", "c"].iter().map(|k| {
            LoadItem::new(
                *k,
                || async { Err::<Value, BoxError>("direct fetch unused".into()) },
                LoadOptions::new().batch("ids", fetch_many.clone()),
            )
        });

        let outcomes = loader.load_many(items).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.len(), 3);
        for (key, outcome) in outcomes {
            assert_eq!(outcome.into_result().unwrap()["id"], key.as_str());
        }

        let stats = loader.stats();
        assert_eq!(stats.batched_loads, 3);
        assert_eq!(stats.batches_executed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_then_cache() {
        let loader = loader();
        let calls = counter();
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, BoxError>(json!(1))
            }
        };

        let results = futures::future::join_all(
            (0..5).map(|_| loader.load("k", fetch.clone(), LoadOptions::new())),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        loader.load("k", fetch, LoadOptions::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.stats().cached_loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_reload_refetches() {
        let loader = loader();
        let calls = counter();
        let c = calls.clone();
        let fetch = move || {
            let c = c.clone();
            async move { Ok::<_, BoxError>(json!(c.fetch_add(1, Ordering::SeqCst))) }
        };

        assert_eq!(loader.load("k", fetch.clone(), LoadOptions::new()).await.unwrap(), json!(0));
        assert_eq!(
            loader
                .load("k", fetch, LoadOptions::new().force_reload())
                .await
                .unwrap(),
            json!(1)
        );
        assert_eq!(loader.cache().get("k"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delays_between_attempts() {
        let loader = loader();
        let calls = counter();
        let c = calls.clone();
        let started = tokio::time::Instant::now();

        let value = loader
            .load(
                "flaky",
                move || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err::<Value, BoxError>("try again".into())
                        } else {
                            Ok(json!("ok"))
                        }
                    }
                },
                LoadOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(value, json!("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two pauses of the default one-second retry delay
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(loader.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_reports_to_monitor() {
        let cache = TieredCache::new(CacheConfig::default(), TokioClock::shared());
        let monitor = PerformanceMonitor::new(TokioClock::shared());
        monitor.start(MonitorOptions::default());
        let loader = DataLoader::with_monitor(cache, LoaderConfig::default(), monitor.clone());

        loader
            .load(
                "slow:endpoint",
                || async {
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    Ok::<_, BoxError>(json!({}))
                },
                LoadOptions::new(),
            )
            .await
            .unwrap();

        let report = monitor.report();
        assert_eq!(report.summary.api_calls, 1);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.details.slowest_api_calls[0].name, "slow:endpoint");
        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_lands_in_low_tier() {
        let loader = loader();
        let items = (0..3).map(|i| {
            LoadItem::new(
                format!("next:{}", i),
                move || async move { Ok::<_, BoxError>(json!(i)) },
                LoadOptions::new().priority(Priority::High),
            )
        });

        let outcomes = loader.prefetch(items).join().await;
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));
        for i in 0..3 {
            assert_eq!(
                loader.cache().priority_of(&format!("next:{}", i)),
                Some(Priority::Low)
            );
        }
    }
}

// =============================================================================
// Performance Telemetry
// =============================================================================

mod telemetry_tests {
    use dashload::clock::ManualClock;
    use dashload::telemetry::{MonitorOptions, PerformanceMonitor, SuggestionCode, WarningCode};
    use std::time::Duration;

    #[test]
    fn test_slow_api_call_warns_once() {
        let monitor = PerformanceMonitor::new(ManualClock::new().shared());
        monitor.start(MonitorOptions::default());

        let over = monitor.thresholds().api_call + Duration::from_millis(1);
        monitor.record_api_call("/accounts", over, 200);
        monitor.record_api_call("/accounts", over, 200);

        let report = monitor.report();
        assert_eq!(report.summary.api_calls, 2);
        assert_eq!(report.details.warnings.len(), 1);
        assert_eq!(report.details.warnings[0].code, WarningCode::ApiCallSlow);
    }

    #[test]
    fn test_report_json_shape() {
        let clock = ManualClock::new();
        let monitor = PerformanceMonitor::new(clock.shared());
        monitor.start(MonitorOptions::default());

        monitor.record_page_load("/dashboard", Duration::from_millis(800));
        monitor.record_component_render("AccountsTable", Duration::from_millis(40));
        monitor.record_long_task("parse", Duration::from_millis(120));
        clock.advance(Duration::from_secs(1));

        let json = serde_json::to_value(monitor.report()).unwrap();
        assert!(json["session"]["id"].is_string());
        assert!(json["session"]["duration"].as_f64().unwrap() >= 1000.0);
        assert_eq!(json["summary"]["pageLoads"], 1);
        assert_eq!(json["summary"]["longTasks"], 1);
        assert_eq!(json["details"]["slowestComponents"][0]["name"], "AccountsTable");
        assert_eq!(json["details"]["warnings"][0]["code"], "component_render_slow");
        assert_eq!(json["details"]["longTasks"][0]["name"], "parse");
    }

    #[test]
    fn test_duplicate_calls_suggestion() {
        let clock = ManualClock::new();
        let monitor = PerformanceMonitor::new(clock.shared());
        monitor.start(MonitorOptions::default());

        for _ in 0..5 {
            monitor.record_api_call("/notifications", Duration::from_millis(20), 200);
            clock.advance(Duration::from_millis(200));
        }
        monitor.flush();

        let codes: Vec<_> = monitor.suggestions().iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![SuggestionCode::PossibleDuplicateCalls]);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config_tests {
    use dashload::cache::Priority;
    use dashload::config::AppConfig;
    use std::time::Duration;

    #[test]
    fn test_load_yaml_file() {
        let dir = std::env::temp_dir().join(format!("dashload-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dashload.yaml");
        std::fs::write(
            &path,
            r#"
cache:
  low:
    ttl: 30000
    maxEntries: 10
loader:
  batchDelay: 25
  defaultCachePriority: LOW
  enablePrefetching: false
"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.low.max_entries, 10);
        assert_eq!(config.cache.low.ttl, Duration::from_secs(30));
        assert_eq!(config.loader.batch_delay, Duration::from_millis(25));
        assert_eq!(config.loader.default_cache_priority, Priority::Low);
        assert!(!config.loader.enable_prefetching);
        assert_eq!(config.monitor.max_warnings, 100);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_json_file() {
        let dir = std::env::temp_dir().join(format!("dashload-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dashload.json");
        std::fs::write(&path, r#"{"monitor": {"flushInterval": 10000}}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.monitor.flush_interval, Duration::from_secs(10));
        assert_eq!(config.loader.retry_attempts, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
