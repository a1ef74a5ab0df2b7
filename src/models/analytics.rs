use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_HOURS: u32 = 24;
pub const MAX_HISTORY_HOURS: u32 = 720;
pub const MAX_LIMIT: u64 = 100;

/// Latest row of one coin inside the analytics window
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct LatestQuote {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: Option<Decimal>,
    pub market_cap: Option<i64>,
    pub market_cap_rank: Option<i32>,
    pub total_volume: Option<i64>,
    pub price_change_24h: Option<Decimal>,
    pub volatility_score: Option<Decimal>,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct VolatilityEntry {
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    pub volatility_score: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub total_volume: Option<i64>,
    /// Ties share a rank
    pub volatility_rank: i64,
}

/// Aggregates over the latest row of every coin in the window.
///
/// Market cap statistics ignore coins with a zero market cap.
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromQueryResult)]
pub struct MarketSummary {
    pub total_coins: i64,
    pub total_market_cap: Option<f64>,
    pub avg_market_cap: Option<f64>,
    pub median_market_cap: Option<f64>,
    pub min_market_cap: Option<i64>,
    pub max_market_cap: Option<i64>,
    pub total_volume_24h: Option<f64>,
    pub avg_price_change: Option<f64>,
    pub gainers_count: i64,
    pub losers_count: i64,
}

/// One hour of a coin's price history
#[derive(Debug, Clone, Serialize, Deserialize, FromQueryResult)]
pub struct PricePoint {
    pub hour: DateTime<Utc>,
    pub avg_price: Option<Decimal>,
    pub open_price: Option<Decimal>,
    pub close_price: Option<Decimal>,
    pub hourly_change_percent: Option<Decimal>,
    pub samples: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryResponse {
    pub coin_id: String,
    pub hours: u32,
    pub data: Vec<PricePoint>,
}

/// Query parameters of the ranking endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u64>,
}

impl LimitQuery {
    pub fn limit_or(&self, default: u64) -> u64 {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

/// Query parameters for GET /api/market/history/{coin_id}
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u32>,
}

impl HistoryQuery {
    pub fn hours(&self) -> u32 {
        self.hours
            .unwrap_or(DEFAULT_HISTORY_HOURS)
            .clamp(1, MAX_HISTORY_HOURS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub total_records: u64,
    pub latest_extracted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
