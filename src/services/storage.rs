use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    Database, DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, Set, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;

use crate::config::DatabaseConfig;
use crate::entities::{crypto_market, prelude::*};
use crate::error::StorageError;
use crate::models::market::MarketSnapshotRecord;

/// Destination of market snapshots.
///
/// Implementations must make `upsert_batch` idempotent on
/// `(entity_id, extracted_at)` and all-or-nothing per call.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or update every record of the batch, returning how many were written
    async fn upsert_batch(&self, records: &[MarketSnapshotRecord]) -> Result<usize, StorageError>;

    async fn latest_extracted_at(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    async fn record_count(&self) -> Result<u64, StorageError>;
}

/// Postgres-backed store; clones share one connection pool
#[derive(Clone)]
pub struct PostgresStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::shared(Arc::new(db))
    }

    pub fn shared(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        tracing::info!("Connecting to database...");
        let db = Database::connect(config.connect_options()).await?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Handle to the same pool, for readers such as the analytics service
    pub fn shared_connection(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.db)
    }

    /// Create the `crypto_market` table and its indexes if missing
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        tracing::info!("Running migrations...");
        migration::Migrator::up(self.connection(), None).await?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}

fn active_model(record: &MarketSnapshotRecord) -> Result<crypto_market::ActiveModel, StorageError> {
    let extracted_at = record
        .extracted_at
        .ok_or_else(|| StorageError::MissingTimestamp {
            coin_id: record.entity_id.clone(),
        })?;

    Ok(crypto_market::ActiveModel {
        coin_id: Set(record.entity_id.clone()),
        symbol: Set(record.symbol.clone()),
        name: Set(record.display_name.clone()),
        current_price: Set(Some(record.price)),
        market_cap: Set(Some(record.market_cap)),
        total_volume: Set(Some(record.total_volume)),
        price_change_24h: Set(Some(record.price_change_pct_24h)),
        market_cap_rank: Set(Some(record.market_cap_rank)),
        volatility_score: Set(Some(record.volatility_score)),
        extracted_at: Set(extracted_at.into()),
        ..Default::default()
    })
}

fn upsert_on_natural_key() -> OnConflict {
    OnConflict::columns([
        crypto_market::Column::CoinId,
        crypto_market::Column::ExtractedAt,
    ])
    .update_columns([
        crypto_market::Column::Symbol,
        crypto_market::Column::Name,
        crypto_market::Column::CurrentPrice,
        crypto_market::Column::MarketCap,
        crypto_market::Column::TotalVolume,
        crypto_market::Column::PriceChange24h,
        crypto_market::Column::MarketCapRank,
        crypto_market::Column::VolatilityScore,
    ])
    .to_owned()
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn upsert_batch(&self, records: &[MarketSnapshotRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let models = records
            .iter()
            .map(active_model)
            .collect::<Result<Vec<_>, _>>()?;

        let txn = self.db.begin().await?;

        let result = CryptoMarket::insert_many(models)
            .on_conflict(upsert_on_natural_key())
            .exec_without_returning(&txn)
            .await;

        match result {
            Ok(rows) => {
                txn.commit().await?;
                tracing::debug!("Upserted {} rows ({} affected)", records.len(), rows);
                Ok(records.len())
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!("Rollback failed: {}", rollback_err);
                }
                Err(e.into())
            }
        }
    }

    async fn latest_extracted_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let latest = CryptoMarket::find()
            .order_by_desc(crypto_market::Column::ExtractedAt)
            .one(self.connection())
            .await?;

        Ok(latest.map(|row| row.extracted_at.with_timezone(&Utc)))
    }

    async fn record_count(&self) -> Result<u64, StorageError> {
        Ok(CryptoMarket::find().count(self.connection()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};

    fn transaction_log(store: PostgresStore) -> Vec<Transaction> {
        Arc::try_unwrap(store.db)
            .ok()
            .expect("store connection is still shared")
            .into_transaction_log()
    }

    fn record(coin: &str) -> MarketSnapshotRecord {
        MarketSnapshotRecord {
            entity_id: coin.to_string(),
            symbol: coin[..3].to_string(),
            display_name: coin.to_uppercase(),
            price: dec!(65000.12345678),
            market_cap: 1_280_000_000_000,
            total_volume: 35_000_000_000,
            price_change_pct_24h: dec!(2.15),
            market_cap_rank: 1,
            volatility_score: dec!(75250000000),
            extracted_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_upsert_batch_runs_in_one_transaction() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();
        let store = PostgresStore::new(db);

        let written = store
            .upsert_batch(&[record("bitcoin"), record("ethereum")])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let log = transaction_log(store);
        assert_eq!(log.len(), 1);

        let statements = format!("{:?}", log[0]);
        assert!(statements.contains("BEGIN"));
        assert!(statements.contains("crypto_market"));
        assert!(statements.contains("ON CONFLICT"));
        assert!(statements.contains("DO UPDATE SET"));
        assert!(statements.contains("COMMIT"));
    }

    #[tokio::test]
    async fn test_failed_batch_is_rolled_back() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = PostgresStore::new(db);

        let result = store.upsert_batch(&[record("bitcoin")]).await;
        assert!(matches!(result, Err(StorageError::Database(_))));

        let log = transaction_log(store);
        let statements = format!("{:?}", log);
        assert!(statements.contains("ROLLBACK"));
        assert!(!statements.contains("COMMIT"));
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = PostgresStore::new(db);

        assert_eq!(store.upsert_batch(&[]).await.unwrap(), 0);
        assert!(transaction_log(store).is_empty());
    }

    #[test]
    fn test_record_without_timestamp_is_rejected() {
        let mut unstamped = record("solana");
        unstamped.extracted_at = None;

        let err = active_model(&unstamped).unwrap_err();
        assert!(matches!(err, StorageError::MissingTimestamp { coin_id } if coin_id == "solana"));
    }
}
