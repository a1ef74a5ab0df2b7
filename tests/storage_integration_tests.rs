mod common;

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use crypto_market_etl::entities::{crypto_market, prelude::*};
use crypto_market_etl::models::market::MarketSnapshotRecord;
use crypto_market_etl::services::loader::Loader;
use crypto_market_etl::services::storage::{PostgresStore, SnapshotStore};
use crate::common::setup_test_db;

fn record(coin_id: &str, extracted_at: DateTime<Utc>) -> MarketSnapshotRecord {
    MarketSnapshotRecord {
        entity_id: coin_id.to_string(),
        symbol: "tst".to_string(),
        display_name: "Test Coin".to_string(),
        price: dec!(1.23456789),
        market_cap: 1_000_000,
        total_volume: 250_000,
        price_change_pct_24h: dec!(4.2),
        market_cap_rank: 42,
        volatility_score: dec!(1050000),
        extracted_at: Some(extracted_at),
    }
}

async fn store() -> Option<PostgresStore> {
    let Some(db) = setup_test_db().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let store = PostgresStore::new(db.expect("Failed to connect to test database"));
    store.ensure_schema().await.expect("Failed to run migrations");
    Some(store)
}

#[tokio::test]
async fn test_upsert_is_idempotent_and_last_write_wins() {
    let Some(store) = store().await else { return };

    let coin_id = format!("it-coin-{}", Utc::now().timestamp_micros());
    let extracted_at = Utc::now().trunc_subsecs(6);
    let loader = Loader::new(store.clone());

    let first = record(&coin_id, extracted_at);
    assert_eq!(loader.load(vec![first.clone()], 100).await.unwrap(), 1);

    let mut second = first;
    second.price = dec!(2.5);
    second.market_cap_rank = 7;
    assert_eq!(loader.load(vec![second], 100).await.unwrap(), 1);

    let rows = CryptoMarket::find()
        .filter(crypto_market::Column::CoinId.eq(coin_id.as_str()))
        .all(store.connection())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].current_price, Some(dec!(2.5)));
    assert_eq!(rows[0].market_cap_rank, Some(7));
    assert_eq!(rows[0].extracted_at.with_timezone(&Utc), extracted_at);

    let latest = store.latest_extracted_at().await.unwrap();
    assert!(latest.is_some_and(|at| at >= extracted_at));
    assert!(store.record_count().await.unwrap() >= 1);

    CryptoMarket::delete_many()
        .filter(crypto_market::Column::CoinId.eq(coin_id.as_str()))
        .exec(store.connection())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_duplicate_keys_in_one_batch_collapse() {
    let Some(store) = store().await else { return };

    let coin_id = format!("it-dup-{}", Utc::now().timestamp_micros());
    let extracted_at = Utc::now().trunc_subsecs(6);
    let loader = Loader::new(store.clone());

    let mut later = record(&coin_id, extracted_at);
    later.price = dec!(9.99);
    let loaded = loader
        .load(vec![record(&coin_id, extracted_at), later], 100)
        .await
        .unwrap();
    assert_eq!(loaded, 1);

    let row = CryptoMarket::find()
        .filter(crypto_market::Column::CoinId.eq(coin_id.as_str()))
        .one(store.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.current_price, Some(dec!(9.99)));

    CryptoMarket::delete_many()
        .filter(crypto_market::Column::CoinId.eq(coin_id.as_str()))
        .exec(store.connection())
        .await
        .unwrap();
}
