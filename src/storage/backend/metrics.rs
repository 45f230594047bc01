//! Daily campaign metrics rollup
//!
//! Counters are incremented with a single upsert per event:
//! SQLite/PostgreSQL use `col = col + excluded.col`, MySQL uses `VALUES(col)`.
//! Money goes to a separate (campaign, day, currency) bucket.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveValue::Set,
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, ExprTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, OnConflict},
};

use super::{
    SeaOrmStorage,
    converters::{model_to_currency_totals, model_to_metrics},
    retry,
};
use crate::errors::{AttributorError, Result};
use crate::storage::models::{CampaignMetrics, Currency, MetricsDelta, MoneyDelta};
use migration::entities::{campaign_metrics_daily, campaign_money_daily};

pub fn day_bucket(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

fn additive<C: sea_orm::ColumnTrait>(backend: DatabaseBackend, column: C, name: &str) -> Expr {
    let incoming = match backend {
        DatabaseBackend::MySql => Expr::cust(format!("VALUES({})", name)),
        _ => Expr::cust(format!("excluded.{}", name)),
    };
    Expr::col(column).add(incoming)
}

/// Add `delta` to the (campaign, day) bucket, creating it if missing
pub async fn increment<C: ConnectionTrait>(
    db: &C,
    campaign_id: i64,
    day: NaiveDate,
    delta: MetricsDelta,
) -> std::result::Result<(), sea_orm::DbErr> {
    use campaign_metrics_daily::Column;
    let backend = db.get_database_backend();

    let model = campaign_metrics_daily::ActiveModel {
        campaign_id: Set(campaign_id),
        day_bucket: Set(day),
        clicks: Set(delta.clicks),
        lp_views: Set(delta.lp_views),
        lp_clicks: Set(delta.lp_clicks),
        conversions: Set(delta.conversions),
        ..Default::default()
    };

    let on_conflict = OnConflict::columns([Column::CampaignId, Column::DayBucket])
        .value(Column::Clicks, additive(backend, Column::Clicks, "clicks"))
        .value(Column::LpViews, additive(backend, Column::LpViews, "lp_views"))
        .value(Column::LpClicks, additive(backend, Column::LpClicks, "lp_clicks"))
        .value(
            Column::Conversions,
            additive(backend, Column::Conversions, "conversions"),
        )
        .to_owned();

    campaign_metrics_daily::Entity::insert(model)
        .on_conflict(on_conflict)
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Add `delta` to the (campaign, day, currency) money bucket
pub async fn add_money<C: ConnectionTrait>(
    db: &C,
    campaign_id: i64,
    day: NaiveDate,
    currency: &Currency,
    delta: MoneyDelta,
) -> std::result::Result<(), sea_orm::DbErr> {
    use campaign_money_daily::Column;
    let backend = db.get_database_backend();

    let model = campaign_money_daily::ActiveModel {
        campaign_id: Set(campaign_id),
        day_bucket: Set(day),
        currency: Set(currency.to_string()),
        revenue_micros: Set(delta.revenue_micros),
        cost_micros: Set(delta.cost_micros),
        ..Default::default()
    };

    let on_conflict = OnConflict::columns([Column::CampaignId, Column::DayBucket, Column::Currency])
        .value(
            Column::RevenueMicros,
            additive(backend, Column::RevenueMicros, "revenue_micros"),
        )
        .value(
            Column::CostMicros,
            additive(backend, Column::CostMicros, "cost_micros"),
        )
        .to_owned();

    campaign_money_daily::Entity::insert(model)
        .on_conflict(on_conflict)
        .exec_without_returning(db)
        .await?;

    Ok(())
}

impl SeaOrmStorage {
    /// Standalone increment (landing-page events); other writers call
    /// [`increment`] inside their own transaction
    pub async fn increment_metrics(
        &self,
        campaign_id: i64,
        at: DateTime<Utc>,
        delta: MetricsDelta,
    ) -> Result<()> {
        let db = &self.db;
        let day = day_bucket(at);
        retry::with_retry("increment_metrics", self.db_retry, || async {
            increment(db, campaign_id, day, delta).await
        })
        .await
        .map_err(|e| AttributorError::database_operation(format!("指标更新失败: {}", e)))
    }

    /// Day buckets for a campaign in `[from, to]`, oldest first
    ///
    /// A day with money but no counter row is still reported, with zero counts.
    pub async fn campaign_metrics(
        &self,
        campaign_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CampaignMetrics>> {
        let db = &self.db;
        let counters = retry::with_retry("campaign_metrics", self.db_retry, || async {
            campaign_metrics_daily::Entity::find()
                .filter(campaign_metrics_daily::Column::CampaignId.eq(campaign_id))
                .filter(campaign_metrics_daily::Column::DayBucket.between(from, to))
                .all(db)
                .await
        })
        .await?;
        let money = retry::with_retry("campaign_money", self.db_retry, || async {
            campaign_money_daily::Entity::find()
                .filter(campaign_money_daily::Column::CampaignId.eq(campaign_id))
                .filter(campaign_money_daily::Column::DayBucket.between(from, to))
                .order_by_asc(campaign_money_daily::Column::Currency)
                .all(db)
                .await
        })
        .await?;

        let mut days: BTreeMap<NaiveDate, CampaignMetrics> = counters
            .into_iter()
            .map(|row| (row.day_bucket, model_to_metrics(row)))
            .collect();
        for row in money {
            let day = row.day_bucket;
            let totals = model_to_currency_totals(row)?;
            days.entry(day)
                .or_insert_with(|| CampaignMetrics {
                    campaign_id,
                    day,
                    ..Default::default()
                })
                .money
                .push(totals);
        }

        Ok(days.into_values().collect())
    }
}
