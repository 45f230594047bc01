//! 转化回传记录表迁移
//!
//! dispatch_records 记录每次向广告平台回传的结果，供审计与重试使用。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DispatchRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DispatchRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::ConversionId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::Platform)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DispatchRecords::Payload).text().not_null())
                    .col(
                        ColumnDef::new(DispatchRecords::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DispatchRecords::Response).text().null())
                    .col(
                        ColumnDef::new(DispatchRecords::ErrorCode)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::Retryable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::LastAttemptAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DispatchRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 重试扫描：status + last_attempt_at
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_dispatch_records_status_time")
                    .table(DispatchRecords::Table)
                    .col(DispatchRecords::Status)
                    .col(DispatchRecords::LastAttemptAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_dispatch_records_status_time")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(DispatchRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DispatchRecords {
    #[sea_orm(iden = "dispatch_records")]
    Table,
    Id,
    ConversionId,
    Platform,
    Payload,
    Status,
    Response,
    ErrorCode,
    Retryable,
    AttemptCount,
    LastAttemptAt,
    CreatedAt,
}
