//! SeaORM Entity for the crypto_market time-series table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "crypto_market")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// CoinGecko coin id, e.g. "bitcoin"
    pub coin_id: String,
    pub symbol: String,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((20, 8)))", nullable)]
    pub current_price: Option<Decimal>,
    pub market_cap: Option<i64>,
    pub total_volume: Option<i64>,
    /// 24h price change in percent
    #[sea_orm(
        column_name = "price_change_24h",
        column_type = "Decimal(Some((10, 2)))",
        nullable
    )]
    pub price_change_24h: Option<Decimal>,
    pub market_cap_rank: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((30, 2)))", nullable)]
    pub volatility_score: Option<Decimal>,
    /// Snapshot time; unique together with coin_id
    pub extracted_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
