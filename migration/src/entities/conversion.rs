//! Conversion entity (append-only ledger)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "conversions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Resolved click; NULL when the postback did not match
    pub click_id: Option<String>,
    /// Click id exactly as received, kept for later reconciliation
    pub raw_click_id: Option<String>,
    pub platform_click_id: Option<String>,
    pub campaign_id: Option<i64>,
    pub matched: bool,
    pub revenue_micros: i64,
    pub currency: String,
    pub event_name: String,
    /// Hashed user identifiers as JSON
    #[sea_orm(column_type = "Text", nullable)]
    pub identifiers: Option<String>,
    pub client_ip: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    /// JSON array of content ids
    #[sea_orm(column_type = "Text", nullable)]
    pub content_ids: Option<String>,
    /// subN values of an unmatched postback as JSON
    #[sea_orm(column_type = "Text", nullable)]
    pub postback_macros: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
