//! Cleaning and feature engineering for raw market items
//!
//! Pure and synchronous: the only outside input is the clock reading used to
//! stamp `extracted_at`, and [`Transformer::transform_at`] takes even that as
//! an argument.

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::TransformError;
use crate::models::market::{MarketSnapshotRecord, RawMarketItem, UNRANKED};

/// Analytic features computed alongside each record but not persisted.
///
/// The `+ 1` in both ratio denominators keeps zero-volume coins finite. It
/// biases ratios for very thin markets; treat them as approximations there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeatures {
    /// price / (total_volume + 1)
    pub price_to_volume_ratio: f64,
    /// market_cap / (total_volume + 1)
    pub market_cap_to_volume: f64,
    /// ln(1 + market_cap)
    pub log_market_cap: f64,
}

impl DerivedFeatures {
    pub fn for_record(record: &MarketSnapshotRecord) -> Self {
        let price = record.price.to_f64().unwrap_or(0.0);
        let market_cap = record.market_cap as f64;
        let volume_guard = record.total_volume as f64 + 1.0;

        Self {
            price_to_volume_ratio: price / volume_guard,
            market_cap_to_volume: market_cap / volume_guard,
            log_market_cap: market_cap.ln_1p(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: MarketSnapshotRecord,
    pub features: DerivedFeatures,
}

impl EnrichedRecord {
    /// Narrow to the persisted columns
    pub fn into_record(self) -> MarketSnapshotRecord {
        self.record
    }
}

/// Rows discarded because a critical field was null, by the first such field
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DroppedRows {
    pub id: usize,
    pub symbol: usize,
    pub name: usize,
    pub current_price: usize,
}

impl DroppedRows {
    pub fn total(&self) -> usize {
        self.id + self.symbol + self.name + self.current_price
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(
        &self,
        raw: &[RawMarketItem],
    ) -> Result<Vec<MarketSnapshotRecord>, TransformError> {
        self.transform_at(raw, Utc::now())
    }

    pub fn transform_at(
        &self,
        raw: &[RawMarketItem],
        started_at: DateTime<Utc>,
    ) -> Result<Vec<MarketSnapshotRecord>, TransformError> {
        Ok(self
            .enrich(raw, started_at)?
            .into_iter()
            .map(EnrichedRecord::into_record)
            .collect())
    }

    /// Run null handling, numeric normalization and feature derivation
    pub fn enrich(
        &self,
        raw: &[RawMarketItem],
        started_at: DateTime<Utc>,
    ) -> Result<Vec<EnrichedRecord>, TransformError> {
        if raw.is_empty() {
            return Err(TransformError::EmptyInput);
        }

        info!(items = raw.len(), "Starting data transformation");

        // Postgres keeps microseconds; truncate so the natural key round-trips
        let extracted_at = started_at.trunc_subsecs(6);

        let mut dropped = DroppedRows::default();
        let enriched: Vec<EnrichedRecord> = raw
            .iter()
            .filter_map(|item| normalize(item, extracted_at, &mut dropped))
            .map(|record| EnrichedRecord {
                features: DerivedFeatures::for_record(&record),
                record,
            })
            .collect();

        log_dropped(&dropped);
        debug!(
            "Added engineered features: volatility_score, price_to_volume_ratio, market_cap_to_volume, log_market_cap"
        );
        info!(records = enriched.len(), "Successfully transformed records");

        Ok(enriched)
    }
}

fn log_dropped(dropped: &DroppedRows) {
    for (field, count) in [
        ("id", dropped.id),
        ("symbol", dropped.symbol),
        ("name", dropped.name),
        ("current_price", dropped.current_price),
    ] {
        if count > 0 {
            warn!(field = field, count = count, "Dropped rows with null values");
        }
    }
}

fn normalize(
    item: &RawMarketItem,
    extracted_at: DateTime<Utc>,
    dropped: &mut DroppedRows,
) -> Option<MarketSnapshotRecord> {
    let Some(id) = &item.id else {
        dropped.id += 1;
        return None;
    };
    let Some(symbol) = &item.symbol else {
        dropped.symbol += 1;
        return None;
    };
    let Some(name) = &item.name else {
        dropped.name += 1;
        return None;
    };
    let Some(price) = &item.current_price else {
        dropped.current_price += 1;
        return None;
    };

    let price = Decimal::from_f64(coerce_f64(Some(price)).max(0.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp(8);
    let market_cap = whole_units(coerce_f64(item.market_cap.as_ref()));
    let total_volume = whole_units(coerce_f64(item.total_volume.as_ref()));
    let price_change_pct_24h = price_change_pct(id, item.price_change_percentage_24h.as_ref());

    Some(MarketSnapshotRecord {
        entity_id: id.clone(),
        symbol: symbol.clone(),
        display_name: name.clone(),
        price,
        market_cap,
        total_volume,
        price_change_pct_24h,
        market_cap_rank: coerce_rank(item.market_cap_rank.as_ref()),
        volatility_score: volatility_score(price_change_pct_24h, total_volume),
        extracted_at: Some(extracted_at),
    })
}

/// Largest magnitude `price_change_24h numeric(10,2)` can hold
fn price_change_limit() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

/// Percentage at the stored precision, so the volatility score is computed
/// from exactly the value that gets persisted
fn price_change_pct(coin_id: &str, value: Option<&Value>) -> Decimal {
    let raw = coerce_f64(value);
    let limit = price_change_limit();

    match Decimal::from_f64(raw)
        .map(|pct| pct.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    {
        Some(pct) if pct.abs() <= limit => pct,
        _ => {
            warn!(coin_id = coin_id, value = raw, "24h price change out of range, clamping");
            if raw.is_sign_negative() { -limit } else { limit }
        }
    }
}

/// |price_change_pct_24h| * total_volume
pub fn volatility_score(price_change_pct_24h: Decimal, total_volume: i64) -> Decimal {
    price_change_pct_24h
        .abs()
        .checked_mul(Decimal::from(total_volume))
        .unwrap_or(Decimal::MAX)
}

/// Numbers and numeric strings; everything else (and non-finite values) is 0
fn coerce_f64(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Truncate to a non-negative 64-bit integer, saturating at i64::MAX
fn whole_units(value: f64) -> i64 {
    value.max(0.0) as i64
}

fn coerce_rank(value: Option<&Value>) -> i32 {
    let rank = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    rank.and_then(|r| i32::try_from(r).ok())
        .filter(|r| *r > 0)
        .unwrap_or(UNRANKED)
}
