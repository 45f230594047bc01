//! Traffic channel entity
//!
//! Carries the ad-platform routing (`platform_type`) and the credentials
//! used by the outbound dispatcher.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "traffic_channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub name: String,
    /// facebook | google | NULL
    pub platform_type: Option<String>,
    pub facebook_pixel_id: Option<String>,
    pub facebook_access_token: Option<String>,
    pub facebook_test_event_code: Option<String>,
    pub google_account_id: Option<String>,
    pub google_conversion_id: Option<String>,
    pub google_conversion_label: Option<String>,
    /// JSON object: named field -> macro key, e.g. {"gclid":"sub2"}
    #[sea_orm(column_type = "Text", nullable)]
    pub macro_mapping: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
