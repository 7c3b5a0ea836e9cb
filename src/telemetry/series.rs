//! Rolling Metric Series

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// One recorded duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub duration: Duration,
    pub recorded_at: Instant,
}

/// Aggregate of all samples recorded under one name plus a bounded window
/// of the most recent ones
#[derive(Debug, Clone)]
pub struct MetricSeries {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    samples: VecDeque<MetricSample>,
    max_samples: usize,
}

impl MetricSeries {
    pub fn new(max_samples: usize) -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            samples: VecDeque::with_capacity(max_samples.min(128)),
            max_samples,
        }
    }

    /// Add a sample, evicting the oldest one when the window is full
    pub fn record(&mut self, duration: Duration, at: Instant) {
        self.count += 1;
        self.total = self.total.saturating_add(duration);
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);

        if self.max_samples == 0 {
            return;
        }
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(MetricSample {
            duration,
            recorded_at: at,
        });
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn min(&self) -> Option<Duration> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean over every recorded sample (zero when empty)
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total.div_f64(self.count as f64)
    }

    /// Recent samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn summary(&self, name: &str) -> SeriesSummary {
        SeriesSummary {
            name: name.to_string(),
            count: self.count,
            average_ms: as_ms(self.average()),
            min_ms: self.min().map(as_ms).unwrap_or(0.0),
            max_ms: as_ms(self.max),
            total_ms: as_ms(self.total),
        }
    }
}

/// Serializable aggregate of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSummary {
    pub name: String,
    pub count: u64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
}

/// Duration in fractional milliseconds
pub(crate) fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// =============================================================================
// Tests
// =============================================================================
