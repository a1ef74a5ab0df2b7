use std::time::Duration;

use crypto_market_etl::{
    config::AppConfig,
    handlers,
    jobs::{etl_pipeline::start_etl_job, shutdown::{spawn_signal_listener, Shutdown}},
    services::{analytics::MarketAnalytics, storage::PostgresStore},
    telemetry::{init_tracing, DEFAULT_LOG_FILTER},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(DEFAULT_LOG_FILTER, config.logging.dir.as_deref());

    let store = PostgresStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    // Start background jobs
    let etl_job = start_etl_job(store.clone(), &config, shutdown.clone())?;
    tracing::info!(
        "ETL job scheduled every {} minutes",
        config.etl.interval_minutes
    );

    let state = AppState {
        analytics: MarketAnalytics::new(
            store.shared_connection(),
            Duration::from_secs(config.server.cache_ttl_secs),
        ),
        store,
    };
    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await?;

    // Let an in-flight ETL run finish before the process exits
    if let Err(e) = etl_job.await {
        tracing::error!("ETL job terminated abnormally: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
