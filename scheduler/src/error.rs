//! Scheduler-specific error types

use std::time::Duration;

use shared::SharedError;
use thiserror::Error;

/// Failure at the persistence seam
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} row {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("storage backend failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("persistence operation failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("no answer on {event} within {timeout:?}")]
    CorrelationTimeout { event: String, timeout: Duration },

    #[error("correlation entry for {event} dropped before a response arrived")]
    CorrelationClosed { event: String },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("configuration error: {field}")]
    Configuration { field: String },

    #[error("shared component error")]
    Shared(#[from] SharedError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchedulerError {
    pub fn transport(message: impl Into<String>) -> Self {
        SchedulerError::Transport {
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>) -> Self {
        SchedulerError::Configuration {
            field: field.into(),
        }
    }

    /// True for failures the invoking handler should absorb by skipping
    /// dependent work instead of propagating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SchedulerError::CorrelationTimeout { .. } | SchedulerError::CorrelationClosed { .. }
        )
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
