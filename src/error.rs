//! Error types for the data loading subsystem

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type returned by caller-supplied fetch, batch, compute and processing functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared form of a caller-supplied error, cheap to hand to every waiter
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, processing or caching data
///
/// The enum is `Clone` so a single failure can be delivered to every caller
/// that joined a deduplicated request or waited in the same batch.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The supplied fetch function failed
    #[error("Fetch failed for {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: SharedError,
    },

    /// The data-type processor exceeded its time budget
    #[error("Processing timed out for {key} after {timeout:?}")]
    ProcessingTimeout { key: String, timeout: Duration },

    /// The data-type processor returned an error
    #[error("Processing failed for {key}: {source}")]
    Processing {
        key: String,
        #[source]
        source: SharedError,
    },

    /// The processed result was rejected by the registered validator
    #[error("Validation failed for {key} (data type: {data_type})")]
    Validation { key: String, data_type: String },

    /// The batch function itself failed
    #[error("Batch {batch_key} failed: {source}")]
    Batch {
        batch_key: String,
        #[source]
        source: SharedError,
    },

    /// The batch function returned no result for a requested key
    #[error("Batch {batch_key} returned no result for {key}")]
    MissingBatchResult { key: String, batch_key: String },

    /// The request was cancelled before it settled
    #[error("Load cancelled for {key}")]
    Cancelled { key: String },

    /// A compute or preload function failed
    #[error("Compute failed for {key}: {source}")]
    Compute {
        key: String,
        #[source]
        source: SharedError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a fetch failure
    pub fn fetch(key: impl Into<String>, source: BoxError) -> Self {
        Self::Fetch {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Wrap a processor failure
    pub fn processing(key: impl Into<String>, source: BoxError) -> Self {
        Self::Processing {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Wrap a batch function failure
    pub fn batch(batch_key: impl Into<String>, source: BoxError) -> Self {
        Self::Batch {
            batch_key: batch_key.into(),
            source: Arc::from(source),
        }
    }

    /// Wrap a compute function failure
    pub fn compute(key: impl Into<String>, source: BoxError) -> Self {
        Self::Compute {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Returns true if this error came from `cancel_all`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
