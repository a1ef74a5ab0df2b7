//! Error taxonomy for the ETL pipeline
//!
//! Each stage has its own error type; `PipelineError` is what the scheduler
//! sees at the per-run boundary.

use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

/// Transport-level failure talking to the market data source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Why a single extraction attempt did not produce a payload
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("failed to extract market data after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: AttemptFailure,
    },

    #[error("invalid market payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no raw market items to transform")]
    EmptyInput,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("record {coin_id} has no extraction timestamp")]
    MissingTimestamp { coin_id: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to write batch {batch} ({records} records): {source}")]
    Batch {
        batch: usize,
        records: usize,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractionError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },

    #[error("{key} must be at most {max}")]
    TooLarge { key: &'static str, max: u64 },
}

/// Why the scheduled ETL job could not be started
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExtractionError::RateLimitExceeded { attempts: 3 };
        assert!(err.to_string().contains("rate limit exceeded"));

        let err = ExtractionError::RetriesExhausted {
            attempts: 3,
            source: AttemptFailure::Status {
                status: 503,
                body: "unavailable".to_string(),
            },
        };
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("HTTP 503"));

        let err = ConfigError::Zero { key: "ETL_BATCH_SIZE" };
        assert_eq!(err.to_string(), "ETL_BATCH_SIZE must be greater than zero");
    }

    #[test]
    fn test_pipeline_error_wraps_stage() {
        let err: PipelineError = TransformError::EmptyInput.into();
        assert!(matches!(err, PipelineError::Transform(TransformError::EmptyInput)));
        assert!(err.to_string().starts_with("transform failed"));
    }
}
