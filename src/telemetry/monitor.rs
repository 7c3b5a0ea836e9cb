//! Performance Monitor
//!
//! Records durations for page loads, component renders, API calls, resource
//! loads and long tasks. Samples above their threshold raise a warning;
//! repeated patterns raise optimization suggestions.
//!
//! Lifecycle: `IDLE ──start()──► MONITORING ──stop()──► IDLE`. While idle
//! every `record_*` call is a no-op. While monitoring a background task
//! flushes (and analyzes) the short-term API-call buffer every
//! `flush_interval`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::advisories::{AdvisoryLog, Suggestion, SuggestionCode, Warning, WarningCode};
use super::marks::MarkLedger;
use super::report::{
    slowest, LongTaskRecord, PerformanceReport, ReportDetails, ReportSummary, SessionInfo,
    LONG_TASK_LIMIT, SLOWEST_LIMIT,
};
use super::series::{as_ms, MetricSeries, SeriesSummary};
use crate::clock::SharedClock;
use crate::config::{MonitorConfig, Thresholds};

/// Upper bound of the short-term API-call buffer between flushes
const RECENT_CALL_LIMIT: usize = 1000;

/// Partial threshold update merged by `start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdOverrides {
    pub page_load: Option<Duration>,
    pub component_render: Option<Duration>,
    pub api_call: Option<Duration>,
    pub resource_load: Option<Duration>,
    pub long_task: Option<Duration>,
}

impl ThresholdOverrides {
    fn apply(&self, thresholds: &mut Thresholds) {
        if let Some(v) = self.page_load {
            thresholds.page_load = v;
        }
        if let Some(v) = self.component_render {
            thresholds.component_render = v;
        }
        if let Some(v) = self.api_call {
            thresholds.api_call = v;
        }
        if let Some(v) = self.resource_load {
            thresholds.resource_load = v;
        }
        if let Some(v) = self.long_task {
            thresholds.long_task = v;
        }
    }
}

/// Options for `PerformanceMonitor::start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorOptions {
    pub thresholds: ThresholdOverrides,
    /// Overrides the configured flush interval
    pub flush_interval: Option<Duration>,
}

/// All data of one telemetry run
struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    page_loads: HashMap<String, MetricSeries>,
    component_renders: HashMap<String, MetricSeries>,
    api_calls: HashMap<String, MetricSeries>,
    resources: HashMap<String, MetricSeries>,
    resource_bytes: u64,
    long_tasks: VecDeque<LongTaskRecord>,
    long_task_count: u64,
    slow_renders: HashMap<String, u64>,
    /// Short-term buffer analyzed and cleared by every flush
    recent_api_calls: VecDeque<(String, Instant)>,
    warnings: AdvisoryLog<Warning>,
    suggestions: AdvisoryLog<Suggestion>,
    marks: MarkLedger,
}

impl Session {
    fn new(now: Instant, config: &MonitorConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: now,
            page_loads: HashMap::new(),
            component_renders: HashMap::new(),
            api_calls: HashMap::new(),
            resources: HashMap::new(),
            resource_bytes: 0,
            long_tasks: VecDeque::new(),
            long_task_count: 0,
            slow_renders: HashMap::new(),
            recent_api_calls: VecDeque::new(),
            warnings: AdvisoryLog::new(config.max_warnings),
            suggestions: AdvisoryLog::new(config.max_suggestions),
            marks: MarkLedger::new(),
        }
    }

    fn warn(&mut self, warning: Warning) {
        let message = warning.message.clone();
        if self.warnings.push(warning) {
            debug!("Performance warning: {}", message);
        }
    }

    fn suggest(&mut self, suggestion: Suggestion) {
        let message = suggestion.message.clone();
        if self.suggestions.push(suggestion) {
            info!("Optimization suggestion: {}", message);
        }
    }
}

fn record_into(
    series: &mut HashMap<String, MetricSeries>,
    name: &str,
    duration: Duration,
    now: Instant,
    max_samples: usize,
) -> MetricSeries {
    let entry = series
        .entry(name.to_string())
        .or_insert_with(|| MetricSeries::new(max_samples));
    entry.record(duration, now);
    entry.clone()
}

fn total_count(series: &HashMap<String, MetricSeries>) -> u64 {
    series.values().map(|s| s.count()).sum()
}

struct FlushTask {
    shutdown: CancellationToken,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

struct Inner {
    clock: SharedClock,
    config: RwLock<MonitorConfig>,
    session: Mutex<Session>,
    monitoring: AtomicBool,
    flush_task: Mutex<Option<FlushTask>>,
    flushes: AtomicU64,
}

/// Performance telemetry engine
///
/// Cloning is cheap and yields another handle to the same monitor.
#[derive(Clone)]
pub struct PerformanceMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("session", &self.session_id())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}

impl PerformanceMonitor {
    /// Create an idle monitor with default thresholds
    pub fn new(clock: SharedClock) -> Self {
        Self::with_config(clock, MonitorConfig::default())
    }

    /// Create an idle monitor
    pub fn with_config(clock: SharedClock, config: MonitorConfig) -> Self {
        let session = Session::new(clock.now(), &config);
        Self {
            inner: Arc::new(Inner {
                clock,
                config: RwLock::new(config),
                session: Mutex::new(session),
                monitoring: AtomicBool::new(false),
                flush_task: Mutex::new(None),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begin monitoring and schedule the periodic flush
    ///
    /// Without a tokio runtime the monitor still records, but only flushes
    /// on `flush` and `stop`.
    pub fn start(&self, options: MonitorOptions) {
        if self.inner.monitoring.swap(true, Ordering::SeqCst) {
            warn!("Performance monitor already running");
            return;
        }

        let flush_interval = {
            let mut config = self.inner.config.write();
            options.thresholds.apply(&mut config.thresholds);
            match options.flush_interval {
                Some(flush_interval) if flush_interval.is_zero() => {
                    warn!("Ignoring zero flush interval, keeping {:?}", config.flush_interval);
                }
                Some(flush_interval) => config.flush_interval = flush_interval,
                None => {}
            }
            if config.flush_interval.is_zero() {
                config.flush_interval = MonitorConfig::default().flush_interval;
            }
            config.flush_interval
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shutdown = CancellationToken::new();
                let token = shutdown.clone();
                let monitor = self.clone();
                let task = handle.spawn(async move {
                    let mut ticker = interval(flush_interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker.tick().await;

                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = ticker.tick() => monitor.flush(),
                        }
                    }
                });
                *self.inner.flush_task.lock() = Some(FlushTask { shutdown, task });
            }
            Err(_) => warn!("No tokio runtime, periodic flush disabled"),
        }

        info!(
            "Performance monitoring started (session {}, flush every {:?})",
            self.session_id(),
            flush_interval
        );
    }

    /// Final flush, then stop the periodic task
    pub fn stop(&self) {
        if !self.inner.monitoring.swap(false, Ordering::SeqCst) {
            return;
        }

        self.flush();
        if let Some(flush_task) = self.inner.flush_task.lock().take() {
            flush_task.shutdown.cancel();
        }
        info!("Performance monitoring stopped (session {})", self.session_id());
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    /// Clear every metric and begin a new session
    pub fn reset(&self) {
        let config = self.inner.config.read().clone();
        let mut session = self.inner.session.lock();
        *session = Session::new(self.inner.clock.now(), &config);
        debug!("Performance session reset ({})", session.id);
    }

    // =========================================================================
    // Marks
    // =========================================================================

    /// Record a named timestamp
    pub fn mark(&self, name: impl Into<String>) {
        let now = self.inner.clock.now();
        self.inner.session.lock().marks.mark(name, now);
    }

    /// Elapsed time between two marks, or from `start_mark` to now
    ///
    /// Returns zero when `start_mark` is unknown.
    pub fn measure(&self, name: &str, start_mark: &str, end_mark: Option<&str>) -> Duration {
        let now = self.inner.clock.now();
        let elapsed = self.inner.session.lock().marks.measure(start_mark, end_mark, now);
        trace!("Measure {}: {:?}", name, elapsed);
        elapsed
    }

    // =========================================================================
    // Recording
    // =========================================================================

    pub fn record_page_load(&self, page: &str, duration: Duration) {
        if !self.is_monitoring() {
            return;
        }
        let now = self.inner.clock.now();
        let config = self.inner.config.read();
        let threshold = config.thresholds.page_load;
        let mut session = self.inner.session.lock();

        record_into(&mut session.page_loads, page, duration, now, config.max_samples);

        if duration > threshold {
            session.warn(Warning::new(
                WarningCode::PageLoadSlow,
                format!("Page {} took {}ms to load", page, duration.as_millis()),
                json!({
                    "page": page,
                    "durationMs": duration.as_millis() as u64,
                    "thresholdMs": threshold.as_millis() as u64,
                }),
            ));
        }
    }

    pub fn record_component_render(&self, component: &str, duration: Duration) {
        if !self.is_monitoring() {
            return;
        }
        let now = self.inner.clock.now();
        let config = self.inner.config.read();
        let threshold = config.thresholds.component_render;
        let mut session = self.inner.session.lock();

        record_into(&mut session.component_renders, component, duration, now, config.max_samples);

        if duration <= threshold {
            return;
        }

        session.warn(Warning::new(
            WarningCode::ComponentRenderSlow,
            format!("Component {} took {}ms to render", component, duration.as_millis()),
            json!({
                "component": component,
                "durationMs": duration.as_millis() as u64,
                "thresholdMs": threshold.as_millis() as u64,
            }),
        ));

        let slow_renders = {
            let count = session.slow_renders.entry(component.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if slow_renders >= config.slow_render_count {
            session.suggest(Suggestion::new(
                SuggestionCode::MemoizeComponent,
                format!("Component {} renders slowly and repeatedly; consider memoizing it", component),
                json!({ "component": component }),
            ));
        }
    }

    /// Record a remote call; `status` is the response status code
    pub fn record_api_call(&self, endpoint: &str, duration: Duration, status: u16) {
        if !self.is_monitoring() {
            return;
        }
        let now = self.inner.clock.now();
        let config = self.inner.config.read();
        let threshold = config.thresholds.api_call;
        let mut session = self.inner.session.lock();

        let series = record_into(&mut session.api_calls, endpoint, duration, now, config.max_samples);

        if session.recent_api_calls.len() == RECENT_CALL_LIMIT {
            session.recent_api_calls.pop_front();
        }
        session.recent_api_calls.push_back((endpoint.to_string(), now));

        if duration > threshold {
            session.warn(Warning::new(
                WarningCode::ApiCallSlow,
                format!("API call to {} took {}ms", endpoint, duration.as_millis()),
                json!({
                    "endpoint": endpoint,
                    "durationMs": duration.as_millis() as u64,
                    "thresholdMs": threshold.as_millis() as u64,
                    "status": status,
                }),
            ));
        }

        if series.count() >= config.slow_api_count && series.average() > threshold {
            session.suggest(Suggestion::new(
                SuggestionCode::CacheApiResults,
                format!("Endpoint {} is consistently slow; consider caching its results", endpoint),
                json!({ "endpoint": endpoint }),
            ));
        }
    }

    pub fn record_resource_load(&self, resource: &str, duration: Duration, size_bytes: u64) {
        if !self.is_monitoring() {
            return;
        }
        let now = self.inner.clock.now();
        let config = self.inner.config.read();
        let threshold = config.thresholds.resource_load;
        let mut session = self.inner.session.lock();

        record_into(&mut session.resources, resource, duration, now, config.max_samples);
        session.resource_bytes = session.resource_bytes.saturating_add(size_bytes);

        if duration > threshold {
            session.warn(Warning::new(
                WarningCode::ResourceLoadSlow,
                format!("Resource {} took {}ms to load", resource, duration.as_millis()),
                json!({
                    "resource": resource,
                    "durationMs": duration.as_millis() as u64,
                    "thresholdMs": threshold.as_millis() as u64,
                    "sizeBytes": size_bytes,
                }),
            ));
        }
    }

    pub fn record_long_task(&self, name: &str, duration: Duration) {
        if !self.is_monitoring() {
            return;
        }
        let config = self.inner.config.read();
        let threshold = config.thresholds.long_task;
        let mut session = self.inner.session.lock();

        session.long_task_count += 1;
        if session.long_tasks.len() >= config.max_samples.max(1) {
            session.long_tasks.pop_front();
        }
        session.long_tasks.push_back(LongTaskRecord {
            name: name.to_string(),
            duration_ms: as_ms(duration),
            timestamp: Utc::now(),
        });

        if duration > threshold {
            session.warn(Warning::new(
                WarningCode::LongTask,
                format!("Task {} blocked for {}ms", name, duration.as_millis()),
                json!({
                    "name": name,
                    "durationMs": duration.as_millis() as u64,
                    "thresholdMs": threshold.as_millis() as u64,
                }),
            ));
        }

        if session.long_task_count > config.long_task_count {
            session.suggest(Suggestion::new(
                SuggestionCode::OffloadLongTasks,
                "Many long tasks detected; consider splitting or offloading heavy work",
                json!({ "minCount": config.long_task_count }),
            ));
        }
    }

    // =========================================================================
    // Analysis
    // =========================================================================

    /// Analyze and clear the short-term API-call buffer
    ///
    /// More than `duplicate_call_count` calls to one endpoint within
    /// `duplicate_call_window` raise a duplicate-call suggestion.
    pub fn flush(&self) {
        let config = self.inner.config.read();
        let mut session = self.inner.session.lock();

        let mut by_endpoint: HashMap<String, Vec<Instant>> = HashMap::new();
        for (endpoint, at) in session.recent_api_calls.drain(..) {
            by_endpoint.entry(endpoint).or_default().push(at);
        }

        let mut flagged: Vec<String> = by_endpoint
            .into_iter()
            .filter_map(|(endpoint, mut times)| {
                times.sort_unstable();
                let busiest = busiest_window(&times, config.duplicate_call_window);
                (busiest > config.duplicate_call_count).then_some(endpoint)
            })
            .collect();
        flagged.sort();

        for endpoint in flagged {
            session.suggest(Suggestion::new(
                SuggestionCode::PossibleDuplicateCalls,
                format!(
                    "Endpoint {} was called repeatedly within {:?}; possible duplicate calls, consider caching",
                    endpoint, config.duplicate_call_window
                ),
                json!({ "endpoint": endpoint }),
            ));
        }

        self.inner.flushes.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Performance flush: {} api calls, {} warnings, {} suggestions",
            total_count(&session.api_calls),
            session.warnings.len(),
            session.suggestions.len()
        );
    }

    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub fn report(&self) -> PerformanceReport {
        let now = self.inner.clock.now();
        let session = self.inner.session.lock();

        let skip = session.long_tasks.len().saturating_sub(LONG_TASK_LIMIT);
        let long_tasks = session.long_tasks.iter().skip(skip).cloned().collect();

        PerformanceReport {
            session: SessionInfo {
                id: session.id.to_string(),
                duration: as_ms(now.saturating_duration_since(session.started)),
                start_time: session.started_at,
            },
            summary: ReportSummary {
                page_loads: total_count(&session.page_loads),
                api_calls: total_count(&session.api_calls),
                component_renders: total_count(&session.component_renders),
                long_tasks: session.long_task_count,
                resources_loaded: total_count(&session.resources),
                warnings: session.warnings.len(),
                optimization_suggestions: session.suggestions.len(),
            },
            details: ReportDetails {
                slowest_components: slowest(&session.component_renders, SLOWEST_LIMIT),
                slowest_api_calls: slowest(&session.api_calls, SLOWEST_LIMIT),
                long_tasks,
                warnings: session.warnings.to_vec(),
                optimization_suggestions: session.suggestions.to_vec(),
            },
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session.lock().id
    }

    pub fn thresholds(&self) -> Thresholds {
        self.inner.config.read().thresholds
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.inner.session.lock().warnings.to_vec()
    }

    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.inner.session.lock().suggestions.to_vec()
    }

    /// Aggregate for one endpoint
    pub fn api_call_summary(&self, endpoint: &str) -> Option<SeriesSummary> {
        self.inner
            .session
            .lock()
            .api_calls
            .get(endpoint)
            .map(|s| s.summary(endpoint))
    }

    /// Total bytes reported by `record_resource_load`
    pub fn resource_bytes(&self) -> u64 {
        self.inner.session.lock().resource_bytes
    }
}

/// Largest number of sorted instants falling within any span of `window`
fn busiest_window(times: &[Instant], window: Duration) -> usize {
    let mut best = 0;
    let mut start = 0;
    for end in 0..times.len() {
        while times[end].saturating_duration_since(times[start]) > window {
            start += 1;
        }
        best = best.max(end - start + 1);
    }
    best
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn started() -> (PerformanceMonitor, ManualClock) {
        let clock = ManualClock::new();
        let monitor = PerformanceMonitor::new(clock.shared());
        monitor.start(MonitorOptions::default());
        (monitor, clock)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_idle_records_nothing() {
        let monitor = PerformanceMonitor::new(ManualClock::new().shared());
        monitor.record_api_call("/a", ms(5000), 200);
        monitor.record_page_load("/", ms(9000));

        let report = monitor.report();
        assert_eq!(report.summary.api_calls, 0);
        assert_eq!(report.summary.page_loads, 0);
        assert!(monitor.warnings().is_empty());
    }

    #[test]
    fn test_api_call_warning_deduplicated() {
        let (monitor, _) = started();
        let threshold = monitor.thresholds().api_call;

        monitor.record_api_call("/accounts", threshold + ms(1), 200);
        monitor.record_api_call("/accounts", threshold + ms(1), 200);

        let warnings = monitor.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::ApiCallSlow);
        assert_eq!(monitor.report().summary.api_calls, 2);
    }

    #[test]
    fn test_at_threshold_is_not_slow() {
        let (monitor, _) = started();
        monitor.record_api_call("/a", monitor.thresholds().api_call, 200);
        monitor.record_component_render("Chart", ms(16));
        assert!(monitor.warnings().is_empty());
    }

    #[test]
    fn test_memoize_suggestion_after_repeated_slow_renders() {
        let (monitor, _) = started();
        for i in 0..4 {
            monitor.record_component_render("Table", ms(20 + i));
        }
        assert!(monitor.suggestions().is_empty());

        monitor.record_component_render("Table", ms(30));
        let suggestions = monitor.suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].code, SuggestionCode::MemoizeComponent);

        // Further slow renders do not repeat the suggestion
        monitor.record_component_render("Table", ms(31));
        assert_eq!(monitor.suggestions().len(), 1);
    }

    #[test]
    fn test_cache_api_results_suggestion() {
        let (monitor, _) = started();
        monitor.record_api_call("/slow", ms(1500), 200);
        monitor.record_api_call("/slow", ms(1200), 200);
        assert!(monitor.suggestions().is_empty());

        monitor.record_api_call("/slow", ms(1100), 200);
        let codes: Vec<_> = monitor.suggestions().iter().map(|s| s.code).collect();
        assert_eq!(codes, vec![SuggestionCode::CacheApiResults]);
    }

    #[test]
    fn test_offload_suggestion_after_many_long_tasks() {
        let (monitor, _) = started();
        for i in 0..10 {
            monitor.record_long_task(&format!("task-{}", i), ms(60));
        }
        assert!(monitor.suggestions().is_empty());

        monitor.record_long_task("task-10", ms(60));
        assert_eq!(monitor.suggestions()[0].code, SuggestionCode::OffloadLongTasks);

        let report = monitor.report();
        assert_eq!(report.summary.long_tasks, 11);
        assert_eq!(report.details.long_tasks.len(), 10);
        assert_eq!(report.details.long_tasks[9].name, "task-10");
    }

    #[test]
    fn test_duplicate_calls_detected_on_flush() {
        let (monitor, clock) = started();
        for _ in 0..4 {
            monitor.record_api_call("/dup", ms(10), 200);
            clock.advance(ms(500));
        }
        for _ in 0..4 {
            monitor.record_api_call("/spread", ms(10), 200);
            clock.advance(Duration::from_secs(3));
        }

        monitor.flush();
        let suggestions = monitor.suggestions();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].code, SuggestionCode::PossibleDuplicateCalls);
        assert_eq!(suggestions[0].data["endpoint"], "/dup");
        assert_eq!(monitor.flush_count(), 1);
    }

    #[test]
    fn test_flush_clears_short_term_buffer() {
        let (monitor, _) = started();
        for _ in 0..3 {
            monitor.record_api_call("/x", ms(1), 200);
        }
        monitor.flush();
        monitor.record_api_call("/x", ms(1), 200);
        monitor.flush();

        // Calls split across flushes never reach the duplicate count
        assert!(monitor.suggestions().is_empty());
    }

    #[test]
    fn test_start_merges_threshold_overrides() {
        let monitor = PerformanceMonitor::new(ManualClock::new().shared());
        monitor.start(MonitorOptions {
            thresholds: ThresholdOverrides {
                api_call: Some(ms(100)),
                ..Default::default()
            },
            flush_interval: None,
        });

        let thresholds = monitor.thresholds();
        assert_eq!(thresholds.api_call, ms(100));
        assert_eq!(thresholds.page_load, ms(3000));

        monitor.record_api_call("/a", ms(101), 200);
        assert_eq!(monitor.warnings().len(), 1);
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let (monitor, _) = started();
        monitor.stop();
        assert!(!monitor.is_monitoring());
        // Final flush ran
        assert_eq!(monitor.flush_count(), 1);

        monitor.record_page_load("/", ms(10_000));
        assert_eq!(monitor.report().summary.page_loads, 0);
    }

    #[test]
    fn test_reset_starts_new_session() {
        let (monitor, _) = started();
        let first = monitor.session_id();
        monitor.record_resource_load("logo.png", ms(2500), 2048);
        assert_eq!(monitor.warnings().len(), 1);
        assert_eq!(monitor.resource_bytes(), 2048);

        monitor.reset();
        assert_ne!(monitor.session_id(), first);
        assert!(monitor.warnings().is_empty());
        assert_eq!(monitor.report().summary.resources_loaded, 0);
        assert!(monitor.is_monitoring());
    }

    #[test]
    fn test_marks() {
        let (monitor, clock) = started();
        monitor.mark("fetch-start");
        clock.advance(ms(75));
        monitor.mark("fetch-end");
        clock.advance(ms(25));

        assert_eq!(monitor.measure("fetch", "fetch-start", Some("fetch-end")), ms(75));
        assert_eq!(monitor.measure("fetch", "fetch-start", None), ms(100));
        assert_eq!(monitor.measure("fetch", "unknown", None), Duration::ZERO);
    }

    #[test]
    fn test_report_shape() {
        let (monitor, clock) = started();
        monitor.record_component_render("Fast", ms(2));
        monitor.record_component_render("Slow", ms(40));
        monitor.record_api_call("/a", ms(100), 200);
        clock.advance(Duration::from_secs(2));

        let report = monitor.report();
        assert!(report.session.duration >= 2000.0);
        assert_eq!(report.details.slowest_components[0].name, "Slow");
        assert_eq!(report.summary.component_renders, 2);
        assert_eq!(report.summary.warnings, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["session"]["startTime"].is_string());
        assert!(json["details"]["slowestApiCalls"].is_array());
        assert!(json["details"]["optimizationSuggestions"].is_array());
    }

    #[test]
    fn test_busiest_window() {
        let t0 = Instant::now();
        let times: Vec<Instant> = [0, 1, 2, 7, 8]
            .iter()
            .map(|s| t0 + Duration::from_secs(*s))
            .collect();
        assert_eq!(busiest_window(&times, Duration::from_secs(5)), 3);
        assert_eq!(busiest_window(&[], Duration::from_secs(5)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush() {
        let monitor = PerformanceMonitor::new(crate::clock::TokioClock::shared());
        monitor.start(MonitorOptions {
            flush_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        });

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(monitor.flush_count(), 3);

        monitor.stop();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(monitor.flush_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_flush_interval_keeps_configured_interval() {
        let monitor = PerformanceMonitor::new(crate::clock::TokioClock::shared());
        monitor.start(MonitorOptions {
            flush_interval: Some(Duration::ZERO),
            ..Default::default()
        });

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(monitor.flush_count(), 2);

        monitor.stop();
    }
}
