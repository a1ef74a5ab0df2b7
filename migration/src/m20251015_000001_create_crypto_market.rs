use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per coin per extraction; the table accumulates a time series
        manager
            .create_table(
                Table::create()
                    .table(CryptoMarket::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CryptoMarket::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CryptoMarket::CoinId)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CryptoMarket::Symbol)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CryptoMarket::Name)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CryptoMarket::CurrentPrice)
                            .decimal_len(20, 8)
                            .null(),
                    )
                    .col(ColumnDef::new(CryptoMarket::MarketCap).big_integer().null())
                    .col(ColumnDef::new(CryptoMarket::TotalVolume).big_integer().null())
                    .col(
                        ColumnDef::new(CryptoMarket::PriceChange24h)
                            .decimal_len(10, 2)
                            .null(),
                    )
                    .col(ColumnDef::new(CryptoMarket::MarketCapRank).integer().null())
                    .col(
                        ColumnDef::new(CryptoMarket::VolatilityScore)
                            .decimal_len(30, 2)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CryptoMarket::ExtractedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .index(
                        Index::create()
                            .name("uq_crypto_market_coin_extracted_at")
                            .col(CryptoMarket::CoinId)
                            .col(CryptoMarket::ExtractedAt)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CryptoMarket::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CryptoMarket {
    Table,
    Id,
    CoinId,
    Symbol,
    Name,
    CurrentPrice,
    MarketCap,
    TotalVolume,
    #[sea_orm(iden = "price_change_24h")]
    PriceChange24h,
    MarketCapRank,
    VolatilityScore,
    ExtractedAt,
}
