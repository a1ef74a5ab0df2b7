use crypto_market_etl::{
    config::AppConfig,
    services::storage::{PostgresStore, SnapshotStore},
    telemetry::{init_tracing, DEFAULT_LOG_FILTER},
};

/// Provision the `crypto_market` schema and exit
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(DEFAULT_LOG_FILTER, config.logging.dir.as_deref());

    let store = PostgresStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    let rows = store.record_count().await?;
    println!("✅ Database schema ready ({} rows in crypto_market)", rows);

    Ok(())
}
