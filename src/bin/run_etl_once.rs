use crypto_market_etl::{
    config::AppConfig,
    jobs::etl_pipeline::EtlPipeline,
    services::{
        coingecko::CoinGeckoClient,
        extractor::{Extractor, RetryPolicy},
        storage::PostgresStore,
    },
    telemetry::{init_tracing, DEFAULT_LOG_FILTER},
};

/// One Extract -> Transform -> Load run; the exit status reflects the outcome
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(DEFAULT_LOG_FILTER, config.logging.dir.as_deref());

    let store = PostgresStore::connect(&config.database).await?;
    store.ensure_schema().await?;

    let client = CoinGeckoClient::new(&config.market_api)?;
    let extractor = Extractor::new(client, RetryPolicy::from_config(&config.etl))
        .with_raw_data_path(config.etl.raw_data_path.clone());
    let pipeline = EtlPipeline::new(
        extractor,
        store,
        config.etl.batch_size,
        config.etl.interval(),
    )?;

    let report = pipeline.run_once().await?;

    println!(
        "✅ Run {} complete: extracted {}, transformed {}, loaded {} in {:.2}s",
        report.run_id,
        report.extracted,
        report.transformed,
        report.loaded,
        report.elapsed.as_secs_f64()
    );

    Ok(())
}
