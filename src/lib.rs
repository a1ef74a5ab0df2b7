// src/lib.rs

use services::{analytics::MarketAnalytics, storage::PostgresStore};

#[derive(Clone)]
pub struct AppState {
    pub store: PostgresStore,
    pub analytics: MarketAnalytics,
}

pub mod entities {
    pub mod prelude;
    pub mod crypto_market;
}

pub mod services {
    pub mod coingecko;
    pub mod extractor;
    pub mod transformer;
    pub mod loader;
    pub mod storage;
    pub mod analytics;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod telemetry;
