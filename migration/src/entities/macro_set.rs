//! Macro (sub-parameter) entity
//!
//! Wide table keyed by click id, one nullable column per sub1..sub25.
//! `version` is bumped on every merge and used for conditional updates.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "macro_sets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub click_id: String,
    pub sub1: Option<String>,
    pub sub2: Option<String>,
    pub sub3: Option<String>,
    pub sub4: Option<String>,
    pub sub5: Option<String>,
    pub sub6: Option<String>,
    pub sub7: Option<String>,
    pub sub8: Option<String>,
    pub sub9: Option<String>,
    pub sub10: Option<String>,
    pub sub11: Option<String>,
    pub sub12: Option<String>,
    pub sub13: Option<String>,
    pub sub14: Option<String>,
    pub sub15: Option<String>,
    pub sub16: Option<String>,
    pub sub17: Option<String>,
    pub sub18: Option<String>,
    pub sub19: Option<String>,
    pub sub20: Option<String>,
    pub sub21: Option<String>,
    pub sub22: Option<String>,
    pub sub23: Option<String>,
    pub sub24: Option<String>,
    pub sub25: Option<String>,
    pub version: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
