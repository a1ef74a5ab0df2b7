//! Read queries over `crypto_market` used by the dashboard API
//!
//! Every ranking works on the latest row of each coin inside a recent window,
//! selected with Postgres `DISTINCT ON`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ColumnTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    QuerySelect, Statement, Value,
};

use crate::entities::{crypto_market, prelude::*};
use crate::models::analytics::{LatestQuote, MarketSummary, PricePoint, VolatilityEntry};

/// Rows older than this are not considered "latest"
pub const LATEST_WINDOW_HOURS: i32 = 1;

const LATEST_CTE: &str = r#"
    WITH latest AS (
        SELECT DISTINCT ON (coin_id)
            coin_id,
            symbol,
            name,
            current_price,
            market_cap,
            market_cap_rank,
            total_volume,
            price_change_24h,
            volatility_score,
            extracted_at
        FROM crypto_market
        WHERE extracted_at >= NOW() - make_interval(hours => $1)
        ORDER BY coin_id, extracted_at DESC
    )
"#;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum QueryKey {
    TopGainers(u64),
    TopByMarketCap(u64),
    VolatilityRanking(u64),
    VolumeLeaders(u64),
    Summary,
    PriceHistory(String, u32),
}

#[derive(Debug, Clone)]
enum CachedResult {
    Quotes(Arc<Vec<LatestQuote>>),
    Volatility(Arc<Vec<VolatilityEntry>>),
    Summary(Arc<MarketSummary>),
    History(Arc<Vec<PricePoint>>),
}

#[derive(Clone)]
pub struct MarketAnalytics {
    db: Arc<DatabaseConnection>,
    cache: Cache<QueryKey, CachedResult>,
}

impl MarketAnalytics {
    pub fn new(db: Arc<DatabaseConnection>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(cache_ttl)
            .build();

        Self { db, cache }
    }

    /// Coins with the highest 24h change
    pub async fn top_gainers(&self, limit: u64) -> Result<Arc<Vec<LatestQuote>>, DbErr> {
        let key = QueryKey::TopGainers(limit);
        if let Some(CachedResult::Quotes(rows)) = self.cache.get(&key).await {
            tracing::debug!("Cache hit for top {} gainers", limit);
            return Ok(rows);
        }

        let sql = format!(
            "{LATEST_CTE}
            SELECT * FROM latest
            WHERE price_change_24h IS NOT NULL
            ORDER BY price_change_24h DESC
            LIMIT $2"
        );
        let rows = Arc::new(self.latest_quotes(&sql, limit).await?);

        self.cache.insert(key, CachedResult::Quotes(rows.clone())).await;
        Ok(rows)
    }

    pub async fn top_by_market_cap(&self, limit: u64) -> Result<Arc<Vec<LatestQuote>>, DbErr> {
        let key = QueryKey::TopByMarketCap(limit);
        if let Some(CachedResult::Quotes(rows)) = self.cache.get(&key).await {
            return Ok(rows);
        }

        let sql = format!(
            "{LATEST_CTE}
            SELECT * FROM latest
            ORDER BY market_cap_rank ASC NULLS LAST, market_cap DESC NULLS LAST
            LIMIT $2"
        );
        let rows = Arc::new(self.latest_quotes(&sql, limit).await?);

        self.cache.insert(key, CachedResult::Quotes(rows.clone())).await;
        Ok(rows)
    }

    /// Coins with the highest volatility score, with window-function ranks
    pub async fn volatility_ranking(
        &self,
        limit: u64,
    ) -> Result<Arc<Vec<VolatilityEntry>>, DbErr> {
        let key = QueryKey::VolatilityRanking(limit);
        if let Some(CachedResult::Volatility(rows)) = self.cache.get(&key).await {
            return Ok(rows);
        }

        let sql = format!(
            "{LATEST_CTE}
            SELECT
                coin_id,
                symbol,
                name,
                volatility_score,
                price_change_24h,
                total_volume,
                RANK() OVER (ORDER BY volatility_score DESC) AS volatility_rank
            FROM latest
            WHERE volatility_score IS NOT NULL
            ORDER BY volatility_score DESC
            LIMIT $2"
        );
        let rows = Arc::new(
            VolatilityEntry::find_by_statement(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                sql,
                window_and_limit(limit),
            ))
            .all(self.db.as_ref())
            .await?,
        );

        self.cache
            .insert(key, CachedResult::Volatility(rows.clone()))
            .await;
        Ok(rows)
    }

    /// Coins with the largest 24h trading volume
    pub async fn volume_leaders(&self, limit: u64) -> Result<Arc<Vec<LatestQuote>>, DbErr> {
        let key = QueryKey::VolumeLeaders(limit);
        if let Some(CachedResult::Quotes(rows)) = self.cache.get(&key).await {
            return Ok(rows);
        }

        let sql = format!(
            "{LATEST_CTE}
            SELECT * FROM latest
            WHERE total_volume > 0
            ORDER BY total_volume DESC
            LIMIT $2"
        );
        let rows = Arc::new(self.latest_quotes(&sql, limit).await?);

        self.cache.insert(key, CachedResult::Quotes(rows.clone())).await;
        Ok(rows)
    }

    pub async fn market_summary(&self) -> Result<Arc<MarketSummary>, DbErr> {
        let key = QueryKey::Summary;
        if let Some(CachedResult::Summary(summary)) = self.cache.get(&key).await {
            return Ok(summary);
        }

        let sql = format!(
            "{LATEST_CTE}
            SELECT
                COUNT(*) AS total_coins,
                SUM(market_cap)::float8 AS total_market_cap,
                (AVG(market_cap) FILTER (WHERE market_cap > 0))::float8 AS avg_market_cap,
                PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY market_cap)
                    FILTER (WHERE market_cap > 0) AS median_market_cap,
                MIN(market_cap) FILTER (WHERE market_cap > 0) AS min_market_cap,
                MAX(market_cap) FILTER (WHERE market_cap > 0) AS max_market_cap,
                SUM(total_volume)::float8 AS total_volume_24h,
                AVG(price_change_24h)::float8 AS avg_price_change,
                COUNT(*) FILTER (WHERE price_change_24h > 0) AS gainers_count,
                COUNT(*) FILTER (WHERE price_change_24h < 0) AS losers_count
            FROM latest"
        );
        let summary = MarketSummary::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            [LATEST_WINDOW_HOURS.into()],
        ))
        .one(self.db.as_ref())
        .await?
        .unwrap_or_default();
        let summary = Arc::new(summary);

        self.cache
            .insert(key, CachedResult::Summary(summary.clone()))
            .await;
        Ok(summary)
    }

    /// Hourly price buckets of one coin over the last `hours`
    pub async fn price_history(
        &self,
        coin_id: &str,
        hours: u32,
    ) -> Result<Arc<Vec<PricePoint>>, DbErr> {
        let key = QueryKey::PriceHistory(coin_id.to_string(), hours);
        if let Some(CachedResult::History(rows)) = self.cache.get(&key).await {
            return Ok(rows);
        }

        let hours = i32::try_from(hours).unwrap_or(i32::MAX);
        let rows = PricePoint::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            r#"
            SELECT
                date_trunc('hour', extracted_at) AS hour,
                ROUND(AVG(current_price), 8) AS avg_price,
                (array_agg(current_price ORDER BY extracted_at ASC))[1] AS open_price,
                (array_agg(current_price ORDER BY extracted_at DESC))[1] AS close_price,
                ROUND(
                    ((array_agg(current_price ORDER BY extracted_at DESC))[1]
                        - (array_agg(current_price ORDER BY extracted_at ASC))[1])
                    / NULLIF((array_agg(current_price ORDER BY extracted_at ASC))[1], 0)
                    * 100,
                    4
                ) AS hourly_change_percent,
                COUNT(*) AS samples
            FROM crypto_market
            WHERE coin_id = $1
              AND extracted_at >= NOW() - make_interval(hours => $2)
            GROUP BY 1
            ORDER BY 1 ASC
            "#,
            [coin_id.into(), hours.into()],
        ))
        .all(self.db.as_ref())
        .await?;
        let rows = Arc::new(rows);

        self.cache
            .insert(key, CachedResult::History(rows.clone()))
            .await;
        Ok(rows)
    }

    /// Timestamp of the newest snapshot, uncached
    pub async fn latest_extracted_at(&self) -> Result<Option<DateTime<Utc>>, DbErr> {
        let latest: Option<Option<DateTimeWithTimeZone>> = CryptoMarket::find()
            .select_only()
            .column_as(crypto_market::Column::ExtractedAt.max(), "latest")
            .into_tuple()
            .one(self.db.as_ref())
            .await?;

        Ok(latest.flatten().map(|at| at.with_timezone(&Utc)))
    }

    async fn latest_quotes(&self, sql: &str, limit: u64) -> Result<Vec<LatestQuote>, DbErr> {
        LatestQuote::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            window_and_limit(limit),
        ))
        .all(self.db.as_ref())
        .await
    }
}

fn window_and_limit(limit: u64) -> [Value; 2] {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    [LATEST_WINDOW_HOURS.into(), limit.into()]
}
