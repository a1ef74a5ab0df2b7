pub mod market;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Read-only dashboard API over the ETL output
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(market::health))
        .route("/api/market/status", get(market::get_status))
        .route("/api/market/gainers", get(market::get_top_gainers))
        .route("/api/market/top", get(market::get_top_by_market_cap))
        .route("/api/market/volatility", get(market::get_volatility_ranking))
        .route("/api/market/volume", get(market::get_volume_leaders))
        .route("/api/market/summary", get(market::get_market_summary))
        .route("/api/market/history/{coin_id}", get(market::get_price_history))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
