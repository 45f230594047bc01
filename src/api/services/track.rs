//! Tracking endpoints: clicks, landing-page events and ad spend

use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::params::{
    Params, params_from_json, take_currency, take_i64, take_id, take_macros, take_money,
    take_string,
    user_agent,
};
use super::response::{api_result, error_from_attributor};
use crate::errors::{AttributorError, Result};
use crate::services::{AppServices, LandingEvent};
use crate::storage::models::{Click, ClickContext, CostEntry, Currency, Money};
use crate::utils::extract_client_ip;

#[derive(Debug, Serialize)]
pub struct TrackClickResponse {
    pub click_id: String,
    pub campaign_id: i64,
    pub clicked_at: chrono::DateTime<chrono::Utc>,
}

impl From<Click> for TrackClickResponse {
    fn from(click: Click) -> Self {
        Self {
            campaign_id: click.campaign_id(),
            click_id: click.click_id,
            clicked_at: click.clicked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MacroSetResponse {
    pub click_id: String,
    pub version: i64,
    pub macros: BTreeMap<String, String>,
}

fn required_i64(params: &mut Params, name: &str) -> Result<i64> {
    take_i64(params, &[name])?
        .ok_or_else(|| AttributorError::validation(format!("{} is required", name)))
}

fn required_click_id(params: &mut Params) -> Result<String> {
    take_id(params, &["click_id", "clickid"])
        .ok_or_else(|| AttributorError::validation("click_id is required"))
}

fn click_context(params: &mut Params, req: &HttpRequest) -> Result<ClickContext> {
    Ok(ClickContext {
        campaign_id: required_i64(params, "campaign_id")?,
        traffic_channel_id: required_i64(params, "traffic_channel_id")?,
        lander_id: take_i64(params, &["lander_id"])?,
        offer_id: take_i64(params, &["offer_id"])?,
        ip_address: take_string(params, &["ip"]).or_else(|| extract_client_ip(req)),
        user_agent: take_string(params, &["user_agent"]).or_else(|| user_agent(req)),
        country: take_string(params, &["country"]),
        region: take_string(params, &["region"]),
        city: take_string(params, &["city"]),
    })
}

/// POST /track/click
pub async fn track_click(
    req: HttpRequest,
    services: web::Data<AppServices>,
    body: web::Json<BTreeMap<String, Value>>,
) -> impl Responder {
    let mut params = params_from_json(body.into_inner());
    trace!("track_click params: {:?}", params.keys().collect::<Vec<_>>());

    let parsed = take_macros(&mut params).and_then(|macros| {
        let click_id = take_id(&mut params, &["click_id", "clickid"]);
        let context = click_context(&mut params, &req)?;
        Ok((click_id, context, macros))
    });
    let (click_id, context, macros) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return error_from_attributor(&e),
    };

    let result = services
        .attribution
        .record_click(click_id, context, macros)
        .await
        .map(TrackClickResponse::from);
    api_result(result)
}

async fn landing_event(
    services: &AppServices,
    body: BTreeMap<String, Value>,
    event: LandingEvent,
) -> HttpResponse {
    let mut params = params_from_json(body);
    let parsed = take_macros(&mut params)
        .and_then(|macros| required_click_id(&mut params).map(|id| (id, macros)));
    let (click_id, macros) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return error_from_attributor(&e),
    };

    debug!("Landing {:?} for {} ({} macros)", event, click_id, macros.len());
    let result = services
        .attribution
        .record_landing_event(&click_id, event, &macros)
        .await
        .map(|set| MacroSetResponse {
            click_id: set.click_id.clone(),
            version: set.version,
            macros: set.to_map(),
        });
    api_result(result)
}

/// POST /track/lpview
pub async fn track_lp_view(
    services: web::Data<AppServices>,
    body: web::Json<BTreeMap<String, Value>>,
) -> impl Responder {
    landing_event(&services, body.into_inner(), LandingEvent::View).await
}

/// POST /track/lpclick
pub async fn track_lp_click(
    services: web::Data<AppServices>,
    body: web::Json<BTreeMap<String, Value>>,
) -> impl Responder {
    landing_event(&services, body.into_inner(), LandingEvent::Click).await
}

fn cost_params(mut params: Params) -> Result<(String, Money, Currency)> {
    let click_id = required_click_id(&mut params)?;
    let amount = take_money(&mut params, &["amount", "cost"])?
        .ok_or_else(|| AttributorError::validation("amount is required"))?;
    let currency = take_currency(&mut params)?;
    Ok((click_id, amount, currency))
}

/// POST /track/cost
pub async fn track_cost(
    services: web::Data<AppServices>,
    body: web::Json<BTreeMap<String, Value>>,
) -> impl Responder {
    let parsed = cost_params(params_from_json(body.into_inner()));
    let (click_id, amount, currency) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return error_from_attributor(&e),
    };

    let result: Result<CostEntry> = services.ledger.record_cost(&click_id, amount, currency).await;
    api_result(result)
}

/// Tracking 路由 `/track`
pub fn track_routes() -> actix_web::Scope {
    web::scope("/track")
        .route("/click", web::post().to(track_click))
        .route("/lpview", web::post().to(track_lp_view))
        .route("/lpclick", web::post().to(track_lp_click))
        .route("/cost", web::post().to(track_cost))
}
