//! Warnings and Optimization Suggestions
//!
//! Both lists are de-duplicated on `(code, JSON of data)` and bounded; when
//! full, the oldest entry is dropped.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Threshold violation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    PageLoadSlow,
    ComponentRenderSlow,
    ApiCallSlow,
    ResourceLoadSlow,
    LongTask,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::PageLoadSlow => "page_load_slow",
            WarningCode::ComponentRenderSlow => "component_render_slow",
            WarningCode::ApiCallSlow => "api_call_slow",
            WarningCode::ResourceLoadSlow => "resource_load_slow",
            WarningCode::LongTask => "long_task",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimization suggestion kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCode {
    MemoizeComponent,
    CacheApiResults,
    OffloadLongTasks,
    PossibleDuplicateCalls,
}

impl SuggestionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionCode::MemoizeComponent => "memoize_component",
            SuggestionCode::CacheApiResults => "cache_api_results",
            SuggestionCode::OffloadLongTasks => "offload_long_tasks",
            SuggestionCode::PossibleDuplicateCalls => "possible_duplicate_calls",
        }
    }
}

impl std::fmt::Display for SuggestionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded threshold violation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// A derived optimization hint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub code: SuggestionCode,
    pub message: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(code: SuggestionCode, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Something that can be logged once per `(code, data)`
pub trait Advisory {
    fn dedup_key(&self) -> String;
}

impl Advisory for Warning {
    fn dedup_key(&self) -> String {
        format!("{}:{}", self.code, self.data)
    }
}

impl Advisory for Suggestion {
    fn dedup_key(&self) -> String {
        format!("{}:{}", self.code, self.data)
    }
}

/// Bounded, de-duplicated FIFO list
#[derive(Debug, Clone)]
pub struct AdvisoryLog<T> {
    entries: VecDeque<T>,
    keys: HashSet<String>,
    capacity: usize,
}

impl<T: Advisory> AdvisoryLog<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            keys: HashSet::new(),
            capacity,
        }
    }

    /// Append unless an entry with the same key is present; returns whether it was added
    pub fn push(&mut self, entry: T) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let key = entry.dedup_key();
        if self.keys.contains(&key) {
            return false;
        }

        if self.entries.len() == self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                self.keys.remove(&oldest.dedup_key());
            }
        }
        self.keys.insert(key);
        self.entries.push_back(entry);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.entries.iter().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
