//! Performance Telemetry
//!
//! Collects timing samples, flags threshold violations and derives
//! optimization suggestions.
//!
//! ```text
//! record_*(name, duration) ──► MetricSeries (count/min/max/avg + window)
//!            │
//!            ├── duration > threshold ──► Warning     (dedup, max 100)
//!            └── repeated pattern ──────► Suggestion  (dedup, max 20)
//!
//! flush (every flush_interval) ──► duplicate-call analysis ──► Suggestion
//! report() ──► PerformanceReport (JSON, camelCase)
//! ```

mod advisories;
mod marks;
mod monitor;
mod report;
mod series;

pub use advisories::{Advisory, AdvisoryLog, Suggestion, SuggestionCode, Warning, WarningCode};
pub use marks::MarkLedger;
pub use monitor::{MonitorOptions, PerformanceMonitor, ThresholdOverrides};
pub use report::{
    LongTaskRecord, PerformanceReport, ReportDetails, ReportSummary, SessionInfo,
    LONG_TASK_LIMIT, SLOWEST_LIMIT,
};
pub use series::{MetricSample, MetricSeries, SeriesSummary};
