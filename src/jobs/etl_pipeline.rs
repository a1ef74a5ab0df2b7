//! Extract -> Transform -> Load, once or on a fixed interval

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::error::{ConfigError, PipelineError, StartupError};
use crate::jobs::shutdown::Shutdown;
use crate::services::coingecko::CoinGeckoClient;
use crate::services::extractor::{Extractor, MarketSource, RetryPolicy};
use crate::services::loader::Loader;
use crate::services::storage::{PostgresStore, SnapshotStore};
use crate::services::transformer::Transformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    ShuttingDown,
}

/// Outcome of one successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub extracted: usize,
    pub transformed: usize,
    pub loaded: usize,
    pub elapsed: Duration,
}

pub fn run_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%d_%H%M%S").to_string()
}

pub struct EtlPipeline<S, T> {
    extractor: Extractor<S>,
    transformer: Transformer,
    loader: Loader<T>,
    store: T,
    batch_size: usize,
    interval: Duration,
    state: watch::Sender<PipelineState>,
}

impl<S, T> EtlPipeline<S, T>
where
    S: MarketSource,
    T: SnapshotStore + Clone,
{
    /// Fails when `interval` is zero, which the scheduler cannot tick on
    pub fn new(
        extractor: Extractor<S>,
        store: T,
        batch_size: usize,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::Zero { key: "interval" });
        }

        let (state, _) = watch::channel(PipelineState::Idle);

        Ok(Self {
            extractor,
            transformer: Transformer::new(),
            loader: Loader::new(store.clone()),
            store,
            batch_size,
            interval,
            state,
        })
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Publish a stage transition. `ShuttingDown` is terminal and is never
    /// overwritten by a later stage of an in-flight run.
    fn set_state(&self, next: PipelineState) {
        self.state.send_if_modified(|state| {
            if *state == PipelineState::ShuttingDown || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn begin_shutdown(&self) {
        self.state.send_replace(PipelineState::ShuttingDown);
    }

    /// Run the three stages once, strictly in sequence
    pub async fn run_once(&self) -> Result<RunReport, PipelineError> {
        let run_id = run_id_for(Utc::now());
        let span = info_span!("etl_run", run_id = %run_id);

        let result = self.run_stages(run_id).instrument(span).await;
        self.set_state(PipelineState::Idle);
        result
    }

    async fn run_stages(&self, run_id: String) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        info!("Starting ETL pipeline run");

        self.set_state(PipelineState::Extracting);
        let raw = self.extractor.extract().await?;
        if raw.is_empty() {
            warn!("No data extracted, skipping run");
            return Ok(RunReport {
                run_id,
                extracted: 0,
                transformed: 0,
                loaded: 0,
                elapsed: started.elapsed(),
            });
        }

        self.set_state(PipelineState::Transforming);
        let records = self.transformer.transform(&raw)?;
        let transformed = records.len();

        self.set_state(PipelineState::Loading);
        let loaded = self.loader.load(records, self.batch_size).await?;

        let elapsed = started.elapsed();
        info!(
            records = loaded,
            elapsed_ms = elapsed.as_millis() as u64,
            "ETL pipeline completed successfully"
        );

        Ok(RunReport {
            run_id,
            extracted: raw.len(),
            transformed,
            loaded,
            elapsed,
        })
    }

    /// Run immediately, then once per interval until `shutdown` fires.
    ///
    /// A failed run is logged and the schedule continues. A run in progress
    /// always completes before shutdown is honoured.
    pub async fn run_scheduled(&self, shutdown: Shutdown) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting ETL scheduler"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {}
            }

            let run = self.run_once();
            tokio::pin!(run);

            // Shutdown during a run is published right away, but the run
            // itself is never cancelled
            let outcome = tokio::select! {
                biased;
                outcome = &mut run => outcome,
                _ = shutdown.wait() => {
                    self.begin_shutdown();
                    info!("Shutdown requested, waiting for the current run to finish");
                    run.await
                }
            };

            match outcome {
                Ok(report) => {
                    info!(
                        run_id = %report.run_id,
                        extracted = report.extracted,
                        loaded = report.loaded,
                        "Scheduled ETL run finished"
                    );
                    self.log_summary().await;
                }
                Err(e) => error!("ETL pipeline failed: {}", e),
            }
        }

        self.begin_shutdown();
        info!("ETL scheduler stopped");
    }

    async fn log_summary(&self) {
        match self.store.latest_extracted_at().await {
            Ok(Some(latest)) => info!("Latest data timestamp: {}", latest),
            Ok(None) => info!("No data stored yet"),
            Err(e) => warn!("Could not read latest timestamp: {}", e),
        }

        match self.store.record_count().await {
            Ok(count) => info!("Total records in database: {}", count),
            Err(e) => warn!("Could not count records: {}", e),
        }
    }
}

/// Spawn the scheduled ETL against CoinGecko and Postgres
pub fn start_etl_job(
    store: PostgresStore,
    config: &AppConfig,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>, StartupError> {
    let client = CoinGeckoClient::new(&config.market_api)?;
    let extractor = Extractor::new(client, RetryPolicy::from_config(&config.etl))
        .with_raw_data_path(config.etl.raw_data_path.clone());
    let pipeline = EtlPipeline::new(
        extractor,
        store,
        config.etl.batch_size,
        config.etl.interval(),
    )?;

    Ok(tokio::spawn(async move {
        pipeline.run_scheduled(shutdown).await;
    }))
}
