//! Campaign catalog tables
//!
//! campaigns / traffic_channels / offers / offer_sources. These rows are owned
//! by configuration and only read by the attribution pipeline.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OfferSources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OfferSources::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OfferSources::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(OfferSources::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Offers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Offers::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Offers::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Offers::OfferSourceId).big_integer().null())
                    .col(ColumnDef::new(Offers::PayoutMicros).big_integer().null())
                    .col(
                        ColumnDef::new(Offers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TrafficChannels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrafficChannels::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::Name)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::PlatformType)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::FacebookPixelId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::FacebookAccessToken)
                            .string_len(512)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::FacebookTestEventCode)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::GoogleAccountId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::GoogleConversionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrafficChannels::GoogleConversionLabel)
                            .string_len(128)
                            .null(),
                    )
                    .col(ColumnDef::new(TrafficChannels::MacroMapping).text().null())
                    .col(
                        ColumnDef::new(TrafficChannels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Campaigns::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Campaigns::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Campaigns::TrafficChannelId)
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Campaigns::OfferId).big_integer().null())
                    .col(
                        ColumnDef::new(Campaigns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrafficChannels::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Offers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OfferSources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Campaigns {
    #[sea_orm(iden = "campaigns")]
    Table,
    Id,
    Name,
    TrafficChannelId,
    OfferId,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TrafficChannels {
    #[sea_orm(iden = "traffic_channels")]
    Table,
    Id,
    Name,
    PlatformType,
    FacebookPixelId,
    FacebookAccessToken,
    FacebookTestEventCode,
    GoogleAccountId,
    GoogleConversionId,
    GoogleConversionLabel,
    MacroMapping,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Offers {
    #[sea_orm(iden = "offers")]
    Table,
    Id,
    Name,
    OfferSourceId,
    PayoutMicros,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OfferSources {
    #[sea_orm(iden = "offer_sources")]
    Table,
    Id,
    Name,
    UpdatedAt,
}
