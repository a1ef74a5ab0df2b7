//! Market snapshot records flowing through Extract -> Transform -> Load

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rank stored for coins the API returns without a market cap rank
pub const UNRANKED: i32 = 999;

/// Keys every element of a `/coins/markets` response must carry
pub const REQUIRED_FIELDS: [&str; 7] = [
    "id",
    "symbol",
    "name",
    "current_price",
    "market_cap",
    "total_volume",
    "price_change_percentage_24h",
];

/// One element of the `/coins/markets` response, decoded at the API boundary.
///
/// Key presence is checked before decoding; values may still be null. Numeric
/// fields are kept as raw JSON so the transformer can coerce numeric strings
/// and fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMarketItem {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub current_price: Option<Value>,
    pub market_cap: Option<Value>,
    pub total_volume: Option<Value>,
    pub price_change_percentage_24h: Option<Value>,
    #[serde(default)]
    pub market_cap_rank: Option<Value>,
}

/// One coin's market state at one point in time.
///
/// `(entity_id, extracted_at)` is the natural key of the persisted table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshotRecord {
    pub entity_id: String,
    pub symbol: String,
    pub display_name: String,
    /// USD price, at most 8 decimal places
    pub price: Decimal,
    pub market_cap: i64,
    pub total_volume: i64,
    pub price_change_pct_24h: Decimal,
    pub market_cap_rank: i32,
    /// |price_change_pct_24h| * total_volume
    pub volatility_score: Decimal,
    /// Stamped by the transformer; the loader fills it in when absent
    pub extracted_at: Option<DateTime<Utc>>,
}

impl MarketSnapshotRecord {
    pub fn key(&self) -> (&str, Option<DateTime<Utc>>) {
        (self.entity_id.as_str(), self.extracted_at)
    }
}
