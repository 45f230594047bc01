//! Append-only ledger writes
//!
//! Inserts run once inside a transaction and are never retried here;
//! failures go straight to the caller.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Query,
};
use tracing::debug;

use super::converters::{
    conversion_to_active_model, cost_entry_to_active_model, model_to_conversion,
    model_to_cost_entry,
};
use super::{SeaOrmStorage, metrics, retry};
use crate::errors::{AttributorError, Result};
use crate::storage::models::{Conversion, CostEntry, MetricsDelta, MoneyDelta};
use migration::entities::{click, conversion, cost_entry, dispatch_record};

impl SeaOrmStorage {
    /// Insert a conversion; a matched one also flags its click as converted
    pub async fn insert_conversion(&self, conv: &Conversion) -> Result<()> {
        let active = conversion_to_active_model(conv)?;
        let txn = self.db.begin().await?;

        conversion::Entity::insert(active)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| {
                AttributorError::database_operation(format!(
                    "写入转化记录 '{}' 失败: {}",
                    conv.id, e
                ))
            })?;

        if let Some(click_id) = conv.click_id.as_ref().filter(|_| conv.matched) {
            click::Entity::update_many()
                .set(click::ActiveModel {
                    converted: Set(true),
                    ..Default::default()
                })
                .filter(click::Column::ClickId.eq(click_id.as_str()))
                .exec(&txn)
                .await?;
        }

        if let Some(campaign_id) = conv.campaign_id {
            let day = metrics::day_bucket(conv.created_at);
            metrics::increment(&txn, campaign_id, day, MetricsDelta::conversion()).await?;
            metrics::add_money(
                &txn,
                campaign_id,
                day,
                &conv.currency,
                MoneyDelta::revenue(conv.revenue),
            )
            .await?;
        }

        txn.commit().await?;
        debug!(
            "Conversion {} recorded (matched: {}, revenue: {} {})",
            conv.id, conv.matched, conv.revenue, conv.currency
        );
        Ok(())
    }

    pub async fn insert_cost_entry(&self, entry: &CostEntry) -> Result<()> {
        let txn = self.db.begin().await?;

        cost_entry::Entity::insert(cost_entry_to_active_model(entry))
            .exec_without_returning(&txn)
            .await
            .map_err(|e| {
                AttributorError::database_operation(format!(
                    "写入成本记录 '{}' 失败: {}",
                    entry.id, e
                ))
            })?;

        if let Some(campaign_id) = entry.campaign_id {
            metrics::add_money(
                &txn,
                campaign_id,
                metrics::day_bucket(entry.created_at),
                &entry.currency,
                MoneyDelta::cost(entry.amount),
            )
            .await?;
        }

        txn.commit().await?;
        debug!("Cost entry {} recorded ({} {})", entry.id, entry.amount, entry.currency);
        Ok(())
    }

    pub async fn get_conversion(&self, id: &str) -> Result<Option<Conversion>> {
        let db = &self.db;
        let model = retry::with_retry("get_conversion", self.db_retry, || async {
            conversion::Entity::find_by_id(id.to_string()).one(db).await
        })
        .await?;
        model.map(model_to_conversion).transpose()
    }

    /// Conversions whose raw click id equals `raw_click_id`, oldest first
    pub async fn conversions_by_raw_click_id(&self, raw_click_id: &str) -> Result<Vec<Conversion>> {
        let db = &self.db;
        let models = retry::with_retry("conversions_by_raw_click_id", self.db_retry, || async {
            conversion::Entity::find()
                .filter(conversion::Column::RawClickId.eq(raw_click_id))
                .order_by_asc(conversion::Column::CreatedAt)
                .all(db)
                .await
        })
        .await?;
        models.into_iter().map(model_to_conversion).collect()
    }

    /// Conversions created before `older_than` that have no dispatch record,
    /// oldest first
    pub async fn conversions_without_dispatch(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Conversion>> {
        let db = &self.db;
        let models = retry::with_retry("conversions_without_dispatch", self.db_retry, || async {
            let recorded = Query::select()
                .column(dispatch_record::Column::ConversionId)
                .from(dispatch_record::Entity)
                .to_owned();
            conversion::Entity::find()
                .filter(conversion::Column::Id.not_in_subquery(recorded))
                .filter(conversion::Column::CreatedAt.lt(older_than))
                .order_by_asc(conversion::Column::CreatedAt)
                .limit(limit)
                .all(db)
                .await
        })
        .await?;
        models.into_iter().map(model_to_conversion).collect()
    }

    pub async fn cost_entries_for_click(&self, click_id: &str) -> Result<Vec<CostEntry>> {
        let db = &self.db;
        let models = retry::with_retry("cost_entries_for_click", self.db_retry, || async {
            cost_entry::Entity::find()
                .filter(cost_entry::Column::ClickId.eq(click_id))
                .order_by_asc(cost_entry::Column::CreatedAt)
                .all(db)
                .await
        })
        .await?;
        models.into_iter().map(model_to_cost_entry).collect()
    }
}
