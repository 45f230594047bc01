//! Conversion postback endpoint (POST JSON or GET query string)
//!
//! Responds once the conversion is durable; dispatch continues in the
//! background and never changes the response.

use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::params::{Params, conversion_event, params_from_json, params_from_query};
use super::response::{error_from_attributor, success_response};
use crate::services::AppServices;

#[derive(Debug, Serialize)]
pub struct PostbackResponse {
    pub click_id: Option<String>,
    pub conversion_id: String,
    pub matched: bool,
}

async fn handle(services: &AppServices, params: Params, req: &HttpRequest) -> HttpResponse {
    let event = match conversion_event(params, req) {
        Ok(event) => event,
        Err(e) => return error_from_attributor(&e),
    };

    match services.postback.handle_conversion(&event).await {
        Ok((conversion, _)) => {
            info!(
                "Postback accepted: conversion {} (click {:?}, matched: {})",
                conversion.id, conversion.raw_click_id, conversion.matched
            );
            success_response(PostbackResponse {
                click_id: conversion.raw_click_id,
                conversion_id: conversion.id,
                matched: conversion.matched,
            })
        }
        Err(e) => error_from_attributor(&e),
    }
}

/// POST /postback/conversion
pub async fn post_conversion(
    req: HttpRequest,
    services: web::Data<AppServices>,
    body: web::Json<BTreeMap<String, Value>>,
) -> impl Responder {
    handle(&services, params_from_json(body.into_inner()), &req).await
}

/// GET /postback/conversion
pub async fn get_conversion(
    req: HttpRequest,
    services: web::Data<AppServices>,
    query: web::Query<BTreeMap<String, String>>,
) -> impl Responder {
    handle(&services, params_from_query(query.into_inner()), &req).await
}

/// Postback 路由 `/postback`
pub fn postback_routes() -> actix_web::Scope {
    web::scope("/postback")
        .route("/conversion", web::post().to(post_conversion))
        .route("/conversion", web::get().to(get_conversion))
}
