//! Admin API `/api`
//!
//! Catalog upserts (with context cache invalidation), campaign metrics,
//! click lookup and the dispatch audit/retry endpoints.

use std::collections::BTreeMap;

use actix_web::{Responder, web};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::response::{api_result, error_from_attributor};
use crate::errors::{AttributorError, Result};
use crate::services::AppServices;
use crate::storage::models::{
    Campaign, Click, Conversion, CostEntry, DispatchStatus, FacebookCredentials,
    GoogleCredentials, MacroMapping, Offer, OfferSource, TrafficChannel,
};

const DEFAULT_METRICS_DAYS: u64 = 30;
const DEFAULT_DISPATCH_LIMIT: u64 = 50;
const MAX_DISPATCH_LIMIT: u64 = 500;

#[derive(Debug, Deserialize)]
pub struct UpsertCampaign {
    pub name: String,
    pub traffic_channel_id: Option<i64>,
    pub offer_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertTrafficChannel {
    pub name: String,
    pub platform_type: Option<String>,
    #[serde(default)]
    pub facebook: FacebookCredentials,
    #[serde(default)]
    pub google: GoogleCredentials,
    #[serde(default)]
    pub macro_mapping: MacroMapping,
}

#[derive(Debug, Deserialize)]
pub struct UpsertOffer {
    pub name: String,
    pub offer_source_id: Option<i64>,
    pub payout_micros: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertOfferSource {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct DispatchListQuery {
    pub status: Option<String>,
    pub limit: Option<u64>,
}

/// Click lookup; `click` is null for an id only seen on postbacks or costs
#[derive(Debug, Serialize)]
pub struct ClickDetails {
    pub click: Option<Click>,
    pub macros: BTreeMap<String, String>,
    pub macro_version: i64,
    pub conversions: Vec<Conversion>,
    pub cost_entries: Vec<CostEntry>,
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AttributorError::validation("name must not be empty"));
    }
    Ok(())
}

/// PUT /api/campaigns/{id}
pub async fn put_campaign(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
    body: web::Json<UpsertCampaign>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    let result = async {
        validate_name(&body.name)?;
        let campaign = Campaign {
            id,
            name: body.name,
            traffic_channel_id: body.traffic_channel_id,
            offer_id: body.offer_id,
        };
        services.storage.upsert_campaign(&campaign).await?;
        services.contexts.invalidate(id).await;
        info!("Campaign {} saved", id);
        Ok::<_, AttributorError>(campaign)
    }
    .await;
    api_result(result)
}

/// PUT /api/traffic-channels/{id}
pub async fn put_traffic_channel(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
    body: web::Json<UpsertTrafficChannel>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    let result = async {
        validate_name(&body.name)?;
        let channel = TrafficChannel {
            id,
            name: body.name,
            platform_type: body.platform_type,
            facebook: body.facebook,
            google: body.google,
            macro_mapping: body.macro_mapping,
        };
        services.storage.upsert_traffic_channel(&channel).await?;
        services.contexts.invalidate_all();
        info!("Traffic channel {} saved (platform: {})", id, channel.platform());
        Ok::<_, AttributorError>(channel)
    }
    .await;
    api_result(result)
}

/// PUT /api/offers/{id}
pub async fn put_offer(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
    body: web::Json<UpsertOffer>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    let result = async {
        validate_name(&body.name)?;
        let offer = Offer {
            id,
            name: body.name,
            offer_source_id: body.offer_source_id,
            payout_micros: body.payout_micros,
        };
        services.storage.upsert_offer(&offer).await?;
        services.contexts.invalidate_all();
        Ok::<_, AttributorError>(offer)
    }
    .await;
    api_result(result)
}

/// PUT /api/offer-sources/{id}
pub async fn put_offer_source(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
    body: web::Json<UpsertOfferSource>,
) -> impl Responder {
    let id = path.into_inner();
    let body = body.into_inner();
    let result = async {
        validate_name(&body.name)?;
        let source = OfferSource {
            id,
            name: body.name,
        };
        services.storage.upsert_offer_source(&source).await?;
        services.contexts.invalidate_all();
        Ok::<_, AttributorError>(source)
    }
    .await;
    api_result(result)
}

/// Default range is the last 30 days ending today
fn metrics_range(query: &MetricsQuery) -> Result<(NaiveDate, NaiveDate)> {
    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = match query.from {
        Some(from) => from,
        None => to
            .checked_sub_days(Days::new(DEFAULT_METRICS_DAYS))
            .unwrap_or(to),
    };
    if from > to {
        return Err(AttributorError::validation(format!(
            "from ({}) must not be after to ({})",
            from, to
        )));
    }
    Ok((from, to))
}

/// GET /api/campaigns/{id}/metrics?from=YYYY-MM-DD&to=YYYY-MM-DD
pub async fn get_campaign_metrics(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
    query: web::Query<MetricsQuery>,
) -> impl Responder {
    let campaign_id = path.into_inner();
    let (from, to) = match metrics_range(&query) {
        Ok(range) => range,
        Err(e) => return error_from_attributor(&e),
    };
    api_result(services.storage.campaign_metrics(campaign_id, from, to).await)
}

/// GET /api/clicks/{click_id}
///
/// Also answers for orphaned ids so unmatched conversions can be reconciled.
pub async fn get_click(
    services: web::Data<AppServices>,
    path: web::Path<String>,
) -> impl Responder {
    let click_id = path.into_inner();
    let result = async {
        let click = services.storage.get_click(&click_id).await?;
        let macros = services.storage.get_macro_set(&click_id).await?;
        let conversions = services.ledger.conversions_for_click(&click_id).await?;
        let cost_entries = services.ledger.costs_for_click(&click_id).await?;

        if click.is_none() && conversions.is_empty() && cost_entries.is_empty() {
            return Err(AttributorError::not_found(format!(
                "Click not found: {}",
                click_id
            )));
        }

        Ok::<_, AttributorError>(ClickDetails {
            click,
            macros: macros.as_ref().map(|m| m.to_map()).unwrap_or_default(),
            macro_version: macros.map(|m| m.version).unwrap_or_default(),
            conversions,
            cost_entries,
        })
    }
    .await;
    api_result(result)
}

/// GET /api/dispatches?status=failed&limit=N
pub async fn list_dispatches(
    services: web::Data<AppServices>,
    query: web::Query<DispatchListQuery>,
) -> impl Responder {
    let status = match query.status.as_deref().map(str::parse::<DispatchStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(_)) => {
            return error_from_attributor(&AttributorError::validation(format!(
                "Unknown dispatch status: {}",
                query.status.as_deref().unwrap_or_default()
            )));
        }
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DISPATCH_LIMIT)
        .clamp(1, MAX_DISPATCH_LIMIT);

    api_result(services.tracker.list(status, limit).await)
}

/// POST /api/dispatches/{id}/retry
pub async fn retry_dispatch(
    services: web::Data<AppServices>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    info!("Manual retry requested for dispatch record {}", id);
    api_result(services.postback.retry_record(id).await)
}

/// Admin 路由 `/api`；挂载时需包一层 `AdminAuth`
pub fn admin_scope() -> actix_web::Scope {
    web::scope("/api")
        .route("/campaigns/{id}", web::put().to(put_campaign))
        .route("/campaigns/{id}/metrics", web::get().to(get_campaign_metrics))
        .route("/traffic-channels/{id}", web::put().to(put_traffic_channel))
        .route("/offers/{id}", web::put().to(put_offer))
        .route("/offer-sources/{id}", web::put().to(put_offer_source))
        .route("/clicks/{click_id}", web::get().to(get_click))
        .route("/dispatches", web::get().to(list_dispatches))
        .route("/dispatches/{id}/retry", web::post().to(retry_dispatch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_range_defaults_and_validation() {
        let to = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let (from, end) = metrics_range(&MetricsQuery {
            from: None,
            to: Some(to),
        })
        .unwrap();
        assert_eq!(end, to);
        assert_eq!(from, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());

        let err = metrics_range(&MetricsQuery {
            from: Some(to),
            to: NaiveDate::from_ymd_opt(2026, 1, 1),
        })
        .unwrap_err();
        assert!(matches!(err, AttributorError::Validation(_)));
    }
}
