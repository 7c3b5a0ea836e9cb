//! Dashload Workload Simulator
//!
//! Drives a simulated dashboard through the cache, loader and performance
//! monitor, then prints the resulting statistics.
//!
//! ```text
//! ┌──────────────┐   load_many / load / prefetch   ┌──────────────┐
//! │  Simulated   │────────────────────────────────▶│  DataLoader  │
//! │  dashboard   │                                 └──────┬───────┘
//! └──────┬───────┘                                        │
//!        │ page loads / renders               ┌───────────┴──────────┐
//!        ▼                                    ▼                      ▼
//! ┌──────────────────┐                ┌──────────────┐      mock backend
//! │ PerformanceMonitor│◀── api calls ──│ TieredCache  │      (latency, faults)
//! └──────────────────┘                └──────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::{json, Value};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dashload::cache::TieredCache;
use dashload::clock::TokioClock;
use dashload::config::AppConfig;
use dashload::error::BoxError;
use dashload::exporter::MetricsExporter;
use dashload::loader::{batch_fn, DataLoader, FnProcessor, LoadItem, LoadOptions, ProcessorOptions};
use dashload::telemetry::{MonitorOptions, PerformanceMonitor};
use dashload::Priority;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Report,
    Stats,
    Prometheus,
    All,
}

/// Dashload - simulate a dashboard workload over the tiered cache and loader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(long, env = "DASHLOAD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Dashboard refreshes to simulate
    #[arg(long, env = "DASHLOAD_ITERATIONS", default_value = "3")]
    iterations: u32,

    /// Accounts shown on the dashboard
    #[arg(long, env = "DASHLOAD_ACCOUNTS", default_value = "12")]
    accounts: u32,

    /// Simulated backend latency in milliseconds
    #[arg(long, env = "DASHLOAD_LATENCY_MS", default_value = "40")]
    latency_ms: u64,

    /// Every Nth backend call fails once (0 disables faults)
    #[arg(long, env = "DASHLOAD_FAULT_EVERY", default_value = "5")]
    fault_every: u64,

    /// What to print when the run finishes
    #[arg(long, value_enum, default_value = "all")]
    output: Output,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };

    info!("Starting dashload simulator");
    info!("  Iterations: {}", args.iterations);
    info!("  Accounts: {}", args.accounts);
    info!("  Backend latency: {}ms", args.latency_ms);
    info!("  Fault every: {}", args.fault_every);

    let clock = TokioClock::shared();
    let cache: TieredCache<Value> = TieredCache::with_weigher(
        config.cache.clone(),
        clock.clone(),
        |v: &Value| v.to_string().len(),
    );
    let sweeper = cache.spawn_sweeper(None);

    let monitor = PerformanceMonitor::with_config(clock, config.monitor.clone());
    monitor.start(MonitorOptions::default());

    let loader = DataLoader::with_monitor(cache.clone(), config.loader.clone(), monitor.clone());
    register_processors(&loader);

    let backend = Backend::new(Duration::from_millis(args.latency_ms), args.fault_every);

    for iteration in 1..=args.iterations {
        monitor.mark("refresh-start");
        refresh_dashboard(&loader, &monitor, &backend, args.accounts).await;
        let elapsed = monitor.measure("refresh", "refresh-start", None);
        monitor.record_page_load("/dashboard", elapsed);
        info!(
            "Refresh {} finished in {:?} ({} cached entries)",
            iteration,
            elapsed,
            cache.len()
        );
    }

    monitor.stop();
    sweeper.stop().await;

    print_output(args.output, &cache, &loader, &monitor)?;

    info!("Simulator finished ({} backend calls)", backend.calls());
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Mock Backend
// =============================================================================

/// Simulated remote API with fixed latency and periodic faults
#[derive(Clone)]
struct Backend {
    latency: Duration,
    fault_every: u64,
    calls: Arc<AtomicU64>,
}

impl Backend {
    fn new(latency: Duration, fault_every: u64) -> Self {
        Self {
            latency,
            fault_every,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn call(&self, endpoint: &str) -> Result<(), BoxError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(self.latency).await;
        if self.fault_every > 0 && n % self.fault_every == 0 {
            debug!("Backend fault injected on call {} ({})", n, endpoint);
            return Err(format!("backend unavailable ({})", endpoint).into());
        }
        Ok(())
    }

    async fn accounts(&self, ids: Vec<String>) -> Result<HashMap<String, Value>, BoxError> {
        self.call("/accounts/batch").await?;
        Ok(ids
            .into_iter()
            .map(|key| {
                let id = key.trim_start_matches("account:").to_string();
                let value = json!({ "id": id, "name": format!("Account {}", id), "balance": 1000 });
                (key, value)
            })
            .collect())
    }

    async fn summary(&self) -> Result<Value, BoxError> {
        self.call("/dashboard/summary").await?;
        Ok(json!({ "openTickets": 7, "revenue": 125_000 }))
    }

    async fn history(&self, account: u32) -> Result<Value, BoxError> {
        self.call("/accounts/history").await?;
        Ok(json!({ "account": account, "events": [] }))
    }
}

// =============================================================================
// Workload
// =============================================================================

fn register_processors(loader: &DataLoader<Value>) {
    loader.register_processor(
        "account",
        FnProcessor::new(|mut v: Value| {
            if let Some(obj) = v.as_object_mut() {
                obj.insert("processed".into(), Value::Bool(true));
            }
            v
        })
        .with_validator(|v: &Value| v.get("id").is_some()),
        ProcessorOptions::new()
            .cache_priority(Priority::High)
            .batchable(true),
    );
    loader.register_processor(
        "summary",
        FnProcessor::new(|v: Value| v),
        ProcessorOptions::new().cache_ttl(Duration::from_secs(60)),
    );
}

async fn refresh_dashboard(
    loader: &DataLoader<Value>,
    monitor: &PerformanceMonitor,
    backend: &Backend,
    accounts: u32,
) {
    let batch_backend = backend.clone();
    let accounts_batch = batch_fn(move |ids: Vec<String>| {
        let backend = batch_backend.clone();
        async move { backend.accounts(ids).await }
    });

    let items = (0..accounts).map(|n| {
        LoadItem::new(
            format!("account:{}", n),
            || async { Err::<Value, BoxError>("accounts are only served in batches".into()) },
            LoadOptions::new()
                .data_type("account")
                .batch("accounts", accounts_batch.clone()),
        )
    });
    let outcomes = loader.load_many(items).await;
    let failed = outcomes.values().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        warn!("{} of {} accounts failed to load", failed, outcomes.len());
    }

    monitor.mark("summary-start");
    let summary_backend = backend.clone();
    let summary = loader
        .load(
            "dashboard:summary",
            move || {
                let backend = summary_backend.clone();
                async move { backend.summary().await }
            },
            LoadOptions::new().data_type("summary"),
        )
        .await;
    if let Err(e) = summary {
        warn!("Summary unavailable: {}", e);
    }
    monitor.record_component_render("SummaryCard", monitor.measure("summary", "summary-start", None));

    let history = (0..accounts.min(3)).map(|n| {
        let backend = backend.clone();
        LoadItem::new(
            format!("account:{}:history", n),
            move || {
                let backend = backend.clone();
                async move { backend.history(n).await }
            },
            LoadOptions::new(),
        )
    });
    let prefetched = loader.prefetch(history).join().await;
    debug!("Prefetched {} history entries", prefetched.len());
}

fn print_output(
    output: Output,
    cache: &TieredCache<Value>,
    loader: &DataLoader<Value>,
    monitor: &PerformanceMonitor,
) -> anyhow::Result<()> {
    let cache_stats = cache.stats();
    let loader_stats = loader.stats();
    let report = monitor.report();

    if matches!(output, Output::Report | Output::All) {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if matches!(output, Output::Stats | Output::All) {
        let stats = json!({ "cache": cache_stats, "loader": loader_stats });
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    if matches!(output, Output::Prometheus | Output::All) {
        let exporter = MetricsExporter::new()?;
        exporter.observe_cache(&cache_stats);
        exporter.observe_loader(&loader_stats);
        exporter.observe_telemetry(&report.summary);
        print!("{}", exporter.render()?);
    }
    Ok(())
}
