#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{Database, DatabaseConnection, DbErr};
use serde_json::{json, Value};

use crypto_market_etl::error::{SourceError, StorageError};
use crypto_market_etl::models::market::MarketSnapshotRecord;
use crypto_market_etl::services::extractor::{MarketSource, SourceResponse};
use crypto_market_etl::services::storage::SnapshotStore;

/// Set up test database connection from TEST_DATABASE_URL.
/// Returns None (and the caller skips) when the variable is not set.
pub async fn setup_test_db() -> Option<Result<DatabaseConnection, DbErr>> {
    let database_url = env::var("TEST_DATABASE_URL").ok()?;
    Some(Database::connect(&database_url).await)
}

/// Serves scripted responses in order, then repeats `fallback` forever
pub struct ScriptedSource {
    responses: Mutex<VecDeque<SourceResponse>>,
    fallback: SourceResponse,
    calls: Arc<Mutex<usize>>,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new(responses: Vec<SourceResponse>, fallback: SourceResponse) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            calls: Arc::new(Mutex::new(0)),
            latency: Duration::ZERO,
        }
    }

    /// Every fetch takes `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn always(response: SourceResponse) -> Self {
        Self::new(Vec::new(), response)
    }

    /// Shared call counter, readable after the source has been moved
    pub fn calls(&self) -> Arc<Mutex<usize>> {
        self.calls.clone()
    }
}

#[async_trait]
impl MarketSource for ScriptedSource {
    async fn fetch_markets(&self) -> Result<SourceResponse, SourceError> {
        *self.calls.lock().unwrap() += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

type Key = (String, DateTime<Utc>);

/// In-memory stand-in for Postgres keyed like the real unique constraint
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<HashMap<Key, MarketSnapshotRecord>>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    failing_reads: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Writes succeed but `latest_extracted_at` and `record_count` fail
    pub fn with_failing_reads() -> Self {
        let store = Self::default();
        store.failing_reads.store(true, Ordering::SeqCst);
        store
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Database(DbErr::Custom(
                "connection reset by peer".to_string(),
            )));
        }
        Ok(())
    }

    pub fn rows(&self) -> Vec<MarketSnapshotRecord> {
        let mut rows: Vec<_> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        rows
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert_batch(&self, records: &[MarketSnapshotRecord]) -> Result<usize, StorageError> {
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            let extracted_at = record.extracted_at.ok_or_else(|| StorageError::MissingTimestamp {
                coin_id: record.entity_id.clone(),
            })?;
            rows.insert((record.entity_id.clone(), extracted_at), record.clone());
        }
        self.batch_sizes.lock().unwrap().push(records.len());
        Ok(records.len())
    }

    async fn latest_extracted_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.check_reads()?;
        Ok(self.rows.lock().unwrap().keys().map(|(_, at)| *at).max())
    }

    async fn record_count(&self) -> Result<u64, StorageError> {
        self.check_reads()?;
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

/// One `/coins/markets` element
pub fn market_item(id: &str, price: Value, volume: i64, change: f64, rank: Value) -> Value {
    json!({
        "id": id,
        "symbol": id.chars().take(3).collect::<String>(),
        "name": id.to_uppercase(),
        "current_price": price,
        "market_cap": volume * 10,
        "total_volume": volume,
        "price_change_percentage_24h": change,
        "market_cap_rank": rank,
    })
}

/// Three coins: A gains 50%, B loses 10%, C has no price
pub fn three_coin_payload() -> Value {
    json!([
        market_item("coin-a", json!(100.0), 1_000_000, 50.0, json!(1)),
        market_item("coin-b", json!(2.5), 500_000, -10.0, json!(2)),
        market_item("coin-c", Value::Null, 250_000, 1.0, json!(3)),
    ])
}
