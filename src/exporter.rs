//! Prometheus Metrics Export
//!
//! Mirrors cache, loader and telemetry statistics into a private Prometheus
//! registry and renders them in the text exposition format.

use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::{CacheStats, Priority};
use crate::error::{Error, Result};
use crate::loader::LoaderStatsSnapshot;
use crate::telemetry::ReportSummary;

const NAMESPACE: &str = "dashload";

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

/// Gauge set backed by its own registry
pub struct MetricsExporter {
    registry: Registry,
    cache_hits: IntGauge,
    cache_misses: IntGauge,
    cache_evictions: IntGauge,
    cache_hit_ratio: Gauge,
    cache_memory_bytes: IntGauge,
    tier_entries: IntGaugeVec,
    tier_utilization: GaugeVec,
    loads: IntGaugeVec,
    load_retries: IntGauge,
    batches_executed: IntGauge,
    in_flight: IntGauge,
    average_load_ms: Gauge,
    telemetry_samples: IntGaugeVec,
    telemetry_warnings: IntGauge,
    telemetry_suggestions: IntGauge,
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))
                .map_err(prom_err)?;
            registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
            Ok(gauge)
        };
        let float_gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge =
                Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(prom_err)?;
            registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
            Ok(gauge)
        };
        let int_gauge_vec = |name: &str, help: &str, label: &str| -> Result<IntGaugeVec> {
            let gauge = IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &[label])
                .map_err(prom_err)?;
            registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
            Ok(gauge)
        };

        let tier_utilization = GaugeVec::new(
            Opts::new("cache_tier_utilization", "Tier occupancy over capacity").namespace(NAMESPACE),
            &["tier"],
        )
        .map_err(prom_err)?;
        registry
            .register(Box::new(tier_utilization.clone()))
            .map_err(prom_err)?;

        Ok(Self {
            cache_hits: int_gauge("cache_hits", "Cache lookups that returned a value")?,
            cache_misses: int_gauge("cache_misses", "Cache lookups that returned nothing")?,
            cache_evictions: int_gauge("cache_evictions", "Entries evicted to make room")?,
            cache_hit_ratio: float_gauge("cache_hit_ratio", "Hits over lookups")?,
            cache_memory_bytes: int_gauge("cache_memory_bytes", "Approximate cache footprint")?,
            tier_entries: int_gauge_vec("cache_tier_entries", "Live entries per tier", "tier")?,
            tier_utilization,
            loads: int_gauge_vec("loader_loads", "Loads by outcome", "outcome")?,
            load_retries: int_gauge("loader_retries", "Fetch retries")?,
            batches_executed: int_gauge("loader_batches_executed", "Batch functions invoked")?,
            in_flight: int_gauge("loader_in_flight", "Requests currently pending")?,
            average_load_ms: float_gauge("loader_average_load_ms", "Mean settled load time")?,
            telemetry_samples: int_gauge_vec("telemetry_samples", "Samples by category", "category")?,
            telemetry_warnings: int_gauge("telemetry_warnings", "Recorded performance warnings")?,
            telemetry_suggestions: int_gauge(
                "telemetry_suggestions",
                "Recorded optimization suggestions",
            )?,
            registry,
        })
    }

    pub fn observe_cache(&self, stats: &CacheStats) {
        self.cache_hits.set(stats.hits as i64);
        self.cache_misses.set(stats.misses as i64);
        self.cache_evictions.set(stats.evictions as i64);
        self.cache_hit_ratio.set(stats.hit_ratio);
        self.cache_memory_bytes.set(stats.memory_estimate_bytes as i64);

        for priority in Priority::ALL {
            let label = priority.to_string();
            let (current, utilization) = stats
                .tier(priority)
                .map(|t| (t.current, t.utilization))
                .unwrap_or_default();
            self.tier_entries
                .with_label_values(&[label.as_str()])
                .set(current as i64);
            self.tier_utilization
                .with_label_values(&[label.as_str()])
                .set(utilization);
        }
    }

    pub fn observe_loader(&self, stats: &LoaderStatsSnapshot) {
        for (outcome, value) in [
            ("total", stats.total_loads),
            ("cached", stats.cached_loads),
            ("deduplicated", stats.deduplicated_loads),
            ("batched", stats.batched_loads),
            ("direct", stats.direct_loads),
            ("failed", stats.failed_loads),
        ] {
            self.loads.with_label_values(&[outcome]).set(value as i64);
        }
        self.load_retries.set(stats.retries as i64);
        self.batches_executed.set(stats.batches_executed as i64);
        self.in_flight.set(stats.in_flight as i64);
        self.average_load_ms.set(stats.average_load_time_ms);
    }

    pub fn observe_telemetry(&self, summary: &ReportSummary) {
        for (category, value) in [
            ("page_load", summary.page_loads),
            ("api_call", summary.api_calls),
            ("component_render", summary.component_renders),
            ("long_task", summary.long_tasks),
            ("resource_load", summary.resources_loaded),
        ] {
            self.telemetry_samples
                .with_label_values(&[category])
                .set(value as i64);
        }
        self.telemetry_warnings.set(summary.warnings as i64);
        self.telemetry_suggestions
            .set(summary.optimization_suggestions as i64);
    }

    /// Text exposition of every gauge
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom_err)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
