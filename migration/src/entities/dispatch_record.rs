//! Dispatch record entity (postback log)
//!
//! One row per conversion; retried attempts update the same row.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "dispatch_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub conversion_id: String,
    /// facebook | google | none
    pub platform: String,
    /// Outbound payload snapshot (JSON)
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// pending | sent | failed | skipped
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub response: Option<String>,
    pub error_code: Option<String>,
    pub retryable: bool,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
