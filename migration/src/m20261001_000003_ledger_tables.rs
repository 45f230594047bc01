//! Revenue / cost ledger tables
//!
//! Both tables are append-only: rows are never updated or deleted, corrections
//! are written as new compensating rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversions::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversions::ClickId).string_len(128).null())
                    .col(
                        ColumnDef::new(Conversions::RawClickId)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Conversions::PlatformClickId)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(Conversions::CampaignId).big_integer().null())
                    .col(ColumnDef::new(Conversions::Matched).boolean().not_null())
                    .col(
                        ColumnDef::new(Conversions::RevenueMicros)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Conversions::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(Conversions::EventName)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Conversions::Identifiers).text().null())
                    .col(ColumnDef::new(Conversions::ClientIp).string_len(45).null())
                    .col(ColumnDef::new(Conversions::UserAgent).text().null())
                    .col(ColumnDef::new(Conversions::ContentIds).text().null())
                    .col(ColumnDef::new(Conversions::PostbackMacros).text().null())
                    .col(
                        ColumnDef::new(Conversions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_click_id")
                    .table(Conversions::Table)
                    .col(Conversions::ClickId)
                    .to_owned(),
            )
            .await?;

        // 未匹配转化的对账查询
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversions_raw_click_id")
                    .table(Conversions::Table)
                    .col(Conversions::RawClickId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CostEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CostEntries::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CostEntries::ClickId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CostEntries::CampaignId).big_integer().null())
                    .col(
                        ColumnDef::new(CostEntries::AmountMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CostEntries::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(CostEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_cost_entries_click_id")
                    .table(CostEntries::Table)
                    .col(CostEntries::ClickId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_cost_entries_click_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CostEntries::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_conversions_raw_click_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_conversions_click_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Conversions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Conversions {
    #[sea_orm(iden = "conversions")]
    Table,
    Id,
    ClickId,
    RawClickId,
    PlatformClickId,
    CampaignId,
    Matched,
    RevenueMicros,
    Currency,
    EventName,
    Identifiers,
    ClientIp,
    UserAgent,
    ContentIds,
    PostbackMacros,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CostEntries {
    #[sea_orm(iden = "cost_entries")]
    Table,
    Id,
    ClickId,
    CampaignId,
    AmountMicros,
    Currency,
    CreatedAt,
}
