//! Admin authentication middleware
//!
//! `/api` requires `Authorization: Bearer <api.admin_token>`. With no token
//! configured the admin API answers 404, as if it did not exist.

use actix_service::{Service, Transform};
use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{ServiceRequest, ServiceResponse},
    http::{StatusCode, header::CONTENT_TYPE},
};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use std::rc::Rc;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::api::services::response::{ApiResponse, ErrorCode};

#[derive(Clone, Default)]
pub struct AdminAuth {
    /// Overrides `api.admin_token`; used by tests
    token: Option<String>,
}

impl AdminAuth {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AdminAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let admin_token = self
            .token
            .clone()
            .unwrap_or_else(|| crate::config::get_config().api.admin_token.clone());
        ready(Ok(AdminAuthMiddleware {
            service: Rc::new(service),
            admin_token: Rc::from(admin_token.as_str()),
        }))
    }
}

pub struct AdminAuthMiddleware<S> {
    service: Rc<S>,
    admin_token: Rc<str>,
}

/// 常量时间比较
fn tokens_match(given: &str, expected: &str) -> bool {
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn extract_bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
}

fn reject<B>(
    req: ServiceRequest,
    status: StatusCode,
    code: ErrorCode,
    message: &str,
) -> ServiceResponse<EitherBody<B>> {
    req.into_response(
        HttpResponse::build(status)
            .insert_header((CONTENT_TYPE, "application/json; charset=utf-8"))
            .json(ApiResponse::<()> {
                code: code as i32,
                message: message.to_string(),
                data: None,
            })
            .map_into_right_body(),
    )
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.admin_token.is_empty() {
            debug!("Admin token not configured - returning 404");
            let resp = reject(req, StatusCode::NOT_FOUND, ErrorCode::AdminDisabled, "Not Found");
            return Box::pin(async move { Ok(resp) });
        }

        let authorized = extract_bearer_token(&req)
            .map(|token| tokens_match(token, &self.admin_token))
            .unwrap_or(false);

        if !authorized {
            info!("Admin authentication failed - invalid or missing token");
            let resp = reject(
                req,
                StatusCode::UNAUTHORIZED,
                ErrorCode::Unauthorized,
                "Unauthorized: Invalid or missing token",
            );
            return Box::pin(async move { Ok(resp) });
        }

        let srv = self.service.clone();
        Box::pin(async move {
            let res = srv.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}
