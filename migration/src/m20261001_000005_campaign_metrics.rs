//! campaign 天级指标汇总表迁移（计数 + 按币种金额）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CampaignMetricsDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::CampaignId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::DayBucket)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::LpViews)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::LpClicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignMetricsDaily::Conversions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：campaign_id + day_bucket（upsert 依赖）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_campaign_metrics_daily_unique")
                    .table(CampaignMetricsDaily::Table)
                    .col(CampaignMetricsDaily::CampaignId)
                    .col(CampaignMetricsDaily::DayBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 金额按币种分桶，不同币种不可相加
        manager
            .create_table(
                Table::create()
                    .table(CampaignMoneyDaily::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CampaignMoneyDaily::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CampaignMoneyDaily::CampaignId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CampaignMoneyDaily::DayBucket).date().not_null())
                    .col(
                        ColumnDef::new(CampaignMoneyDaily::Currency)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CampaignMoneyDaily::RevenueMicros)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CampaignMoneyDaily::CostMicros)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_campaign_money_daily_unique")
                    .table(CampaignMoneyDaily::Table)
                    .col(CampaignMoneyDaily::CampaignId)
                    .col(CampaignMoneyDaily::DayBucket)
                    .col(CampaignMoneyDaily::Currency)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaign_money_daily_unique")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CampaignMoneyDaily::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_campaign_metrics_daily_unique")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CampaignMetricsDaily::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CampaignMetricsDaily {
    #[sea_orm(iden = "campaign_metrics_daily")]
    Table,
    Id,
    CampaignId,
    DayBucket,
    Clicks,
    LpViews,
    LpClicks,
    Conversions,
}

#[derive(DeriveIden)]
enum CampaignMoneyDaily {
    #[sea_orm(iden = "campaign_money_daily")]
    Table,
    Id,
    CampaignId,
    DayBucket,
    Currency,
    RevenueMicros,
    CostMicros,
}
