//! Click and macro-set persistence

use chrono::Utc;
use sea_orm::{
    ColumnTrait, EntityTrait, ExprTrait, QueryFilter, TransactionTrait, sea_query::Expr,
};
use tracing::debug;

use super::converters::{
    click_to_active_model, macro_column, macro_set_to_active_model, model_to_click,
    model_to_macro_set,
};
use super::{SeaOrmStorage, metrics, retry};
use crate::errors::{AttributorError, Result};
use crate::storage::models::{Click, MacroPatch, MacroSet, MetricsDelta};
use migration::entities::{click, macro_set};

/// Result of a single conditional macro update
#[derive(Debug)]
pub enum MergeOutcome {
    Applied(MacroSet),
    /// Nothing to write; the stored set already contains the patch
    Unchanged(MacroSet),
    /// Another writer bumped the version first
    Conflict,
}

/// `UPDATE macro_sets SET subN = ?, version = version + 1 WHERE click_id = ? AND version = ?`
fn merge_statement(
    click_id: &str,
    patch: &MacroPatch,
    expected_version: i64,
) -> sea_orm::UpdateMany<macro_set::Entity> {
    let mut update = macro_set::Entity::update_many()
        .col_expr(
            macro_set::Column::Version,
            Expr::col(macro_set::Column::Version).add(1),
        )
        .col_expr(macro_set::Column::UpdatedAt, Expr::value(Utc::now()));
    for (key, value) in patch.iter() {
        update = update.col_expr(macro_column(key), Expr::value(value.to_string()));
    }
    update
        .filter(macro_set::Column::ClickId.eq(click_id))
        .filter(macro_set::Column::Version.eq(expected_version))
}

impl SeaOrmStorage {
    pub async fn get_click(&self, click_id: &str) -> Result<Option<Click>> {
        let db = &self.db;
        let model = retry::with_retry("get_click", self.db_retry, || async {
            click::Entity::find_by_id(click_id.to_string()).one(db).await
        })
        .await?;
        Ok(model.map(model_to_click))
    }

    pub async fn get_macro_set(&self, click_id: &str) -> Result<Option<MacroSet>> {
        let db = &self.db;
        let model = retry::with_retry("get_macro_set", self.db_retry, || async {
            macro_set::Entity::find_by_id(click_id.to_string()).one(db).await
        })
        .await?;
        Ok(model.map(model_to_macro_set))
    }

    /// Insert a click, its macro row and the click counter in one transaction
    ///
    /// Fails with a unique violation (as `DbErr`) when the click id exists.
    pub async fn insert_click(
        &self,
        click: &Click,
        macros: &MacroSet,
    ) -> std::result::Result<(), sea_orm::DbErr> {
        let txn = self.db.begin().await?;

        click::Entity::insert(click_to_active_model(click))
            .exec_without_returning(&txn)
            .await?;
        macro_set::Entity::insert(macro_set_to_active_model(macros))
            .exec_without_returning(&txn)
            .await?;
        metrics::increment(
            &txn,
            click.campaign_id(),
            metrics::day_bucket(click.clicked_at),
            MetricsDelta::click(),
        )
        .await?;

        txn.commit().await?;
        debug!("Click recorded: {}", click.click_id);
        Ok(())
    }

    /// Replace the context of an existing click (overwrite policy)
    pub async fn replace_click(&self, click: &Click) -> Result<()> {
        let db = &self.db;
        let mut active = click_to_active_model(click);
        // converted flag is owned by the ledger
        active.converted = sea_orm::ActiveValue::NotSet;

        retry::with_retry("replace_click", self.db_retry, || async {
            click::Entity::update(active.clone()).exec(db).await
        })
        .await
        .map_err(|e| match e {
            sea_orm::DbErr::RecordNotUpdated => {
                AttributorError::unknown_click(format!("Click not found: {}", click.click_id))
            }
            other => AttributorError::from(other),
        })?;
        Ok(())
    }

    /// One optimistic merge step: read, apply, conditional write
    pub async fn try_merge_macros(&self, click_id: &str, patch: &MacroPatch) -> Result<MergeOutcome> {
        let Some(set) = self.get_macro_set(click_id).await? else {
            return Err(AttributorError::unknown_click(format!(
                "Click not found: {}",
                click_id
            )));
        };
        self.merge_macros_onto(set, patch).await
    }

    /// Conditional write of `patch` on top of `base`; `Conflict` when the
    /// stored version is no longer `base.version`
    pub async fn merge_macros_onto(&self, base: MacroSet, patch: &MacroPatch) -> Result<MergeOutcome> {
        let mut set = base;
        let expected_version = set.version;
        if !set.apply(patch) {
            return Ok(MergeOutcome::Unchanged(set));
        }

        let db = &self.db;
        let click_id = set.click_id.clone();
        let result = retry::with_retry("merge_macros", self.db_retry, || async {
            merge_statement(&click_id, patch, expected_version)
                .exec(db)
                .await
        })
        .await?;

        if result.rows_affected == 0 {
            return Ok(MergeOutcome::Conflict);
        }

        set.version = expected_version + 1;
        Ok(MergeOutcome::Applied(set))
    }
}
