use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Latest-per-coin lookups (DISTINCT ON coin_id)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_crypto_market_coin_id")
                    .table(CryptoMarket::Table)
                    .col(CryptoMarket::CoinId)
                    .to_owned(),
            )
            .await?;

        // Time-window filters and MAX(extracted_at)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_crypto_market_extracted_at")
                    .table(CryptoMarket::Table)
                    .col(CryptoMarket::ExtractedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_crypto_market_rank")
                    .table(CryptoMarket::Table)
                    .col(CryptoMarket::MarketCapRank)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_crypto_market_rank",
            "idx_crypto_market_extracted_at",
            "idx_crypto_market_coin_id",
        ] {
            manager
                .drop_index(
                    Index::drop()
                        .name(name)
                        .table(CryptoMarket::Table)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }
}

#[derive(DeriveIden)]
enum CryptoMarket {
    Table,
    CoinId,
    ExtractedAt,
    MarketCapRank,
}
