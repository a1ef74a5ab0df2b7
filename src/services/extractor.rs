//! Market data extraction
//!
//! Pulls one `/coins/markets` snapshot through a [`MarketSource`], retrying
//! rate limits and transient failures under a bounded [`RetryPolicy`], then
//! validates the payload and keeps a raw copy on disk for auditing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::EtlConfig;
use crate::error::{AttemptFailure, ExtractionError, SourceError};
use crate::models::market::{RawMarketItem, REQUIRED_FIELDS};

/// Outcome of a single request against the market listing endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResponse {
    /// 2xx with a decoded JSON body
    Ok(Value),
    /// HTTP 429, with the server-supplied wait if any
    RateLimited { retry_after: Option<Duration> },
    /// Any other non-success status
    Status { status: u16, body: String },
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<SourceResponse, SourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Retry budget shared by rate limits and transient failures.
///
/// Attempts are numbered from 1; attempt `max_retries` is the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub default_retry_after: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
        }
    }

    /// What to do after `attempt` failed with `failure`
    pub fn decide(&self, attempt: u32, failure: &AttemptFailure) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        match failure {
            AttemptFailure::RateLimited { retry_after } => {
                RetryDecision::Retry(retry_after.unwrap_or(self.default_retry_after))
            }
            // Linear backoff
            AttemptFailure::Status { .. } | AttemptFailure::Source(_) => {
                RetryDecision::Retry(self.retry_delay * attempt)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EtlConfig::default())
    }
}

pub struct Extractor<S> {
    source: S,
    policy: RetryPolicy,
    raw_data_path: Option<PathBuf>,
}

impl<S: MarketSource> Extractor<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            raw_data_path: None,
        }
    }

    /// Persist every validated payload under `path`
    pub fn with_raw_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_data_path = Some(path.into());
        self
    }

    pub async fn extract(&self) -> Result<Vec<RawMarketItem>, ExtractionError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(
                attempt = attempt,
                max_attempts = self.policy.max_retries,
                "Extracting data from market API"
            );

            let failure = match self.source.fetch_markets().await {
                Ok(SourceResponse::Ok(payload)) => {
                    let items = validate_payload(&payload)?;
                    self.save_raw(&payload).await;
                    info!(count = items.len(), "Successfully extracted coins");
                    return Ok(items);
                }
                Ok(SourceResponse::RateLimited { retry_after }) => {
                    AttemptFailure::RateLimited { retry_after }
                }
                Ok(SourceResponse::Status { status, body }) => {
                    AttemptFailure::Status { status, body }
                }
                Err(e) => AttemptFailure::Source(e),
            };

            match self.policy.decide(attempt, &failure) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        attempt = attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %failure,
                        "Extraction attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    error!(attempts = attempt, error = %failure, "Extraction retries exhausted");
                    return Err(match failure {
                        AttemptFailure::RateLimited { .. } => {
                            ExtractionError::RateLimitExceeded { attempts: attempt }
                        }
                        other => ExtractionError::RetriesExhausted {
                            attempts: attempt,
                            source: other,
                        },
                    });
                }
            }
        }
    }

    async fn save_raw(&self, payload: &Value) {
        let Some(dir) = &self.raw_data_path else {
            return;
        };

        if let Err(e) = write_raw_snapshot(dir, Utc::now(), payload).await {
            warn!(error = %e, dir = %dir.display(), "Failed to save raw market data");
        }
    }
}

/// Check the payload shape and decode it.
///
/// One malformed item rejects the whole response.
pub fn validate_payload(payload: &Value) -> Result<Vec<RawMarketItem>, ExtractionError> {
    let items = payload
        .as_array()
        .ok_or_else(|| ExtractionError::InvalidPayload("expected a JSON array".to_string()))?;

    if items.is_empty() {
        return Err(ExtractionError::InvalidPayload(
            "empty market list received".to_string(),
        ));
    }

    for (index, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            ExtractionError::InvalidPayload(format!("item {} is not an object", index))
        })?;

        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !object.contains_key(**f)) {
            let id = object.get("id").and_then(Value::as_str).unwrap_or("unknown");
            return Err(ExtractionError::InvalidPayload(format!(
                "item {} ({}) is missing required field `{}`",
                index, id, missing
            )));
        }
    }

    serde_json::from_value(payload.clone())
        .map_err(|e| ExtractionError::InvalidPayload(format!("undecodable item: {}", e)))
}

/// Write `{timestamp, data}` to `raw_crypto_data_YYYYMMDD_HHMMSS.json` in `dir`
pub async fn write_raw_snapshot(
    dir: &Path,
    captured_at: DateTime<Utc>,
    payload: &Value,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(format!(
        "raw_crypto_data_{}.json",
        captured_at.format("%Y%m%d_%H%M%S")
    ));
    let document = json!({
        "timestamp": captured_at.to_rfc3339(),
        "data": payload,
    });

    tokio::fs::write(&path, serde_json::to_vec_pretty(&document)?).await?;
    debug!(path = %path.display(), "Raw data saved");

    Ok(path)
}
