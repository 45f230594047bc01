//! 点击与宏参数表迁移
//!
//! - clicks: 每次点击一行，click_id 为主键
//! - macro_sets: sub1..sub25 宽表，带 version 用于条件更新

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Clicks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Clicks::ClickId)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Clicks::CampaignId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Clicks::TrafficChannelId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Clicks::LanderId).big_integer().null())
                    .col(ColumnDef::new(Clicks::OfferId).big_integer().null())
                    .col(ColumnDef::new(Clicks::IpAddress).string_len(45).null())
                    .col(ColumnDef::new(Clicks::UserAgent).text().null())
                    .col(ColumnDef::new(Clicks::Country).string_len(2).null())
                    .col(ColumnDef::new(Clicks::Region).string_len(100).null())
                    .col(ColumnDef::new(Clicks::City).string_len(100).null())
                    .col(
                        ColumnDef::new(Clicks::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Clicks::Converted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // 按 campaign 的时间序列查询
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_clicks_campaign_time")
                    .table(Clicks::Table)
                    .col(Clicks::CampaignId)
                    .col(Clicks::ClickedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MacroSets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MacroSets::ClickId)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MacroSets::Sub1).text().null())
                    .col(ColumnDef::new(MacroSets::Sub2).text().null())
                    .col(ColumnDef::new(MacroSets::Sub3).text().null())
                    .col(ColumnDef::new(MacroSets::Sub4).text().null())
                    .col(ColumnDef::new(MacroSets::Sub5).text().null())
                    .col(ColumnDef::new(MacroSets::Sub6).text().null())
                    .col(ColumnDef::new(MacroSets::Sub7).text().null())
                    .col(ColumnDef::new(MacroSets::Sub8).text().null())
                    .col(ColumnDef::new(MacroSets::Sub9).text().null())
                    .col(ColumnDef::new(MacroSets::Sub10).text().null())
                    .col(ColumnDef::new(MacroSets::Sub11).text().null())
                    .col(ColumnDef::new(MacroSets::Sub12).text().null())
                    .col(ColumnDef::new(MacroSets::Sub13).text().null())
                    .col(ColumnDef::new(MacroSets::Sub14).text().null())
                    .col(ColumnDef::new(MacroSets::Sub15).text().null())
                    .col(ColumnDef::new(MacroSets::Sub16).text().null())
                    .col(ColumnDef::new(MacroSets::Sub17).text().null())
                    .col(ColumnDef::new(MacroSets::Sub18).text().null())
                    .col(ColumnDef::new(MacroSets::Sub19).text().null())
                    .col(ColumnDef::new(MacroSets::Sub20).text().null())
                    .col(ColumnDef::new(MacroSets::Sub21).text().null())
                    .col(ColumnDef::new(MacroSets::Sub22).text().null())
                    .col(ColumnDef::new(MacroSets::Sub23).text().null())
                    .col(ColumnDef::new(MacroSets::Sub24).text().null())
                    .col(ColumnDef::new(MacroSets::Sub25).text().null())
                    .col(
                        ColumnDef::new(MacroSets::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MacroSets::UpdatedAt)
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
            .drop_table(Table::drop().table(MacroSets::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_clicks_campaign_time").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Clicks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Clicks {
    #[sea_orm(iden = "clicks")]
    Table,
    ClickId,
    CampaignId,
    TrafficChannelId,
    LanderId,
    OfferId,
    IpAddress,
    UserAgent,
    Country,
    Region,
    City,
    ClickedAt,
    Converted,
}

#[derive(DeriveIden)]
enum MacroSets {
    #[sea_orm(iden = "macro_sets")]
    Table,
    ClickId,
    Sub1,
    Sub2,
    Sub3,
    Sub4,
    Sub5,
    Sub6,
    Sub7,
    Sub8,
    Sub9,
    Sub10,
    Sub11,
    Sub12,
    Sub13,
    Sub14,
    Sub15,
    Sub16,
    Sub17,
    Sub18,
    Sub19,
    Sub20,
    Sub21,
    Sub22,
    Sub23,
    Sub24,
    Sub25,
    Version,
    UpdatedAt,
}
