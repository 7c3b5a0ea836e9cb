//! Processing Pipeline
//!
//! Stages applied to every fetched value before it is cached:
//!
//! ```text
//! fetch ──► process (under processing_timeout) ──► validate ──► transform ──► cache
//! ```
//!
//! Without a registered processor the fetched value passes through unchanged.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use super::processor::DataProcessor;
use crate::error::{Error, Result};

/// Post-fetch stages for one key
pub(crate) struct Pipeline<V> {
    key: String,
    data_type: Option<String>,
    processor: Option<Arc<dyn DataProcessor<V>>>,
    timeout: Duration,
}

impl<V> Clone for Pipeline<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            data_type: self.data_type.clone(),
            processor: self.processor.clone(),
            timeout: self.timeout,
        }
    }
}

impl<V> Pipeline<V>
where
    V: Send + 'static,
{
    pub fn new(
        key: impl Into<String>,
        data_type: Option<String>,
        processor: Option<Arc<dyn DataProcessor<V>>>,
        timeout: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            data_type,
            processor,
            timeout,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run process → validate → transform on a fetched value
    pub async fn run(&self, raw: V) -> Result<V> {
        let processor = match &self.processor {
            Some(p) => p,
            None => return Ok(raw),
        };

        let processed = match timeout(self.timeout, processor.process(raw)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(Error::processing(self.key.as_str(), e)),
            Err(_) => {
                debug!("Processing {} exceeded {:?}", self.key, self.timeout);
                return Err(Error::ProcessingTimeout {
                    key: self.key.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if !processor.validate(&processed) {
            return Err(Error::Validation {
                key: self.key.clone(),
                data_type: self.data_type.clone().unwrap_or_default(),
            });
        }

        Ok(processor.transform(processed))
    }
}

// =============================================================================
// Tests
// =============================================================================
