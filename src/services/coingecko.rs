use async_trait::async_trait;
use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::MarketApiConfig;
use crate::error::SourceError;
use crate::services::extractor::{MarketSource, SourceResponse};

#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    query: Vec<(&'static str, String)>,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketApiConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            query: market_query(config),
        })
    }

    pub fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }
}

/// Fixed query of the market listing: currency, ordering, page size
fn market_query(config: &MarketApiConfig) -> Vec<(&'static str, String)> {
    vec![
        ("vs_currency", config.vs_currency.clone()),
        ("order", config.order.clone()),
        ("per_page", config.per_page.to_string()),
        ("page", config.page.to_string()),
        ("sparkline", config.sparkline.to_string()),
    ]
}

/// Parse a delta-seconds `Retry-After` header; anything else counts as absent
pub fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl MarketSource for CoinGeckoClient {
    async fn fetch_markets(&self) -> Result<SourceResponse, SourceError> {
        tracing::debug!("Fetching market listing from {}", self.markets_url());

        let mut request = self
            .client
            .get(self.markets_url())
            .header("accept", "application/json")
            .query(&self.query);

        if let Some(api_key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            tracing::warn!("Rate limited by CoinGecko (retry after {:?})", retry_after);
            return Ok(SourceResponse::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(SourceResponse::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;

        Ok(SourceResponse::Ok(payload))
    }
}
