//! Performance Report
//!
//! Serialized shape:
//!
//! ```text
//! { session: { id, duration, startTime },
//!   summary: { pageLoads, apiCalls, componentRenders, longTasks,
//!              resourcesLoaded, warnings, optimizationSuggestions },
//!   details: { slowestComponents[5], slowestApiCalls[5], longTasks[<=10],
//!              warnings[], optimizationSuggestions[] } }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::advisories::{Suggestion, Warning};
use super::series::{MetricSeries, SeriesSummary};

/// Entries in each "slowest" list
pub const SLOWEST_LIMIT: usize = 5;

/// Long tasks listed in the report details
pub const LONG_TASK_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub session: SessionInfo,
    pub summary: ReportSummary,
    pub details: ReportDetails,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    /// Milliseconds since the session started
    pub duration: f64,
    pub start_time: DateTime<Utc>,
}

/// Sample counts per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub page_loads: u64,
    pub api_calls: u64,
    pub component_renders: u64,
    pub long_tasks: u64,
    pub resources_loaded: u64,
    pub warnings: usize,
    pub optimization_suggestions: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    pub slowest_components: Vec<SeriesSummary>,
    pub slowest_api_calls: Vec<SeriesSummary>,
    pub long_tasks: Vec<LongTaskRecord>,
    pub warnings: Vec<Warning>,
    pub optimization_suggestions: Vec<Suggestion>,
}

/// One long-task sample
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTaskRecord {
    pub name: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Top `limit` series by average duration, slowest first (ties by name)
pub(crate) fn slowest(series: &HashMap<String, MetricSeries>, limit: usize) -> Vec<SeriesSummary> {
    let mut summaries: Vec<SeriesSummary> = series
        .iter()
        .map(|(name, s)| s.summary(name))
        .collect();
    summaries.sort_by(|a, b| {
        b.average_ms
            .total_cmp(&a.average_ms)
            .then_with(|| a.name.cmp(&b.name))
    });
    summaries.truncate(limit);
    summaries
}

// =============================================================================
// Tests
// =============================================================================
