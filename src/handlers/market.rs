use std::fmt::Display;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    models::analytics::{
        ErrorResponse, HistoryQuery, LatestQuote, LimitQuery, MarketSummary,
        PriceHistoryResponse, StatusResponse, VolatilityEntry,
    },
    services::storage::SnapshotStore,
    AppState,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(context: &str, e: impl Display) -> ApiError {
    tracing::error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("{}: {}", context, e),
        }),
    )
}

/// Handler for GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Handler for GET /api/market/status
/// Reports how much data the ETL has written and when it last ran
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, ApiError> {
    let total_records = state
        .store
        .record_count()
        .await
        .map_err(|e| internal_error("Failed to count records", e))?;
    let latest_extracted_at = state
        .analytics
        .latest_extracted_at()
        .await
        .map_err(|e| internal_error("Failed to read latest timestamp", e))?;

    let status = if total_records > 0 { "ok" } else { "empty" };

    Ok(Json(StatusResponse {
        status: status.to_string(),
        total_records,
        latest_extracted_at,
    }))
}

/// Handler for GET /api/market/gainers
pub async fn get_top_gainers(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LatestQuote>>, ApiError> {
    let rows = state
        .analytics
        .top_gainers(query.limit_or(5))
        .await
        .map_err(|e| internal_error("Failed to fetch top gainers", e))?;

    Ok(Json(rows.to_vec()))
}

/// Handler for GET /api/market/top
pub async fn get_top_by_market_cap(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LatestQuote>>, ApiError> {
    let rows = state
        .analytics
        .top_by_market_cap(query.limit_or(5))
        .await
        .map_err(|e| internal_error("Failed to fetch market cap leaders", e))?;

    Ok(Json(rows.to_vec()))
}

/// Handler for GET /api/market/volatility
pub async fn get_volatility_ranking(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<VolatilityEntry>>, ApiError> {
    let rows = state
        .analytics
        .volatility_ranking(query.limit_or(10))
        .await
        .map_err(|e| internal_error("Failed to fetch volatility ranking", e))?;

    Ok(Json(rows.to_vec()))
}

/// Handler for GET /api/market/volume
pub async fn get_volume_leaders(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LatestQuote>>, ApiError> {
    let rows = state
        .analytics
        .volume_leaders(query.limit_or(10))
        .await
        .map_err(|e| internal_error("Failed to fetch volume leaders", e))?;

    Ok(Json(rows.to_vec()))
}

/// Handler for GET /api/market/summary
pub async fn get_market_summary(
    State(state): State<AppState>,
) -> Result<Json<MarketSummary>, ApiError> {
    let summary = state
        .analytics
        .market_summary()
        .await
        .map_err(|e| internal_error("Failed to compute market summary", e))?;

    Ok(Json(summary.as_ref().clone()))
}

/// Handler for GET /api/market/history/{coin_id}
pub async fn get_price_history(
    State(state): State<AppState>,
    Path(coin_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<PriceHistoryResponse>, ApiError> {
    let hours = query.hours();
    tracing::debug!("Fetching {}h price history for {}", hours, coin_id);

    let data = state
        .analytics
        .price_history(&coin_id, hours)
        .await
        .map_err(|e| internal_error("Failed to fetch price history", e))?;

    Ok(Json(PriceHistoryResponse {
        coin_id,
        hours,
        data: data.to_vec(),
    }))
}
