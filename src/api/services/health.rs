use actix_web::{HttpResponse, Responder, http::StatusCode, web};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, trace};

use super::response::{ErrorCode, json_response};
use crate::services::AppServices;

const STORAGE_CHECK_TIMEOUT_SECS: u64 = 5;

// 应用启动时间
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthStorageCheck {
    pub status: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub uptime: u64,
    pub storage: HealthStorageCheck,
    pub in_flight_dispatches: usize,
    pub response_time_ms: u64,
}

async fn check_storage(services: &AppServices) -> HealthStorageCheck {
    let backend = services.storage.backend_name().to_string();
    match tokio::time::timeout(
        Duration::from_secs(STORAGE_CHECK_TIMEOUT_SECS),
        services.storage.ping(),
    )
    .await
    {
        Ok(true) => HealthStorageCheck {
            status: "healthy".to_string(),
            backend,
            error: None,
        },
        Ok(false) => {
            error!("Storage health check failed");
            HealthStorageCheck {
                status: "unhealthy".to_string(),
                backend,
                error: Some("database ping failed".to_string()),
            }
        }
        Err(_) => {
            error!("Storage health check timeout");
            HealthStorageCheck {
                status: "unhealthy".to_string(),
                backend,
                error: Some("timeout".to_string()),
            }
        }
    }
}

pub struct HealthService;

impl HealthService {
    pub async fn health_check(
        services: web::Data<AppServices>,
        app_start_time: web::Data<AppStartTime>,
    ) -> impl Responder {
        let start_time = Instant::now();
        trace!("Received health check request");

        let storage = check_storage(&services).await;
        let is_healthy = storage.status == "healthy";
        let now = chrono::Utc::now();

        let data = HealthResponse {
            status: storage.status.clone(),
            timestamp: now.to_rfc3339(),
            uptime: (now - app_start_time.start_datetime).num_seconds().max(0) as u64,
            storage,
            in_flight_dispatches: services.postback.in_flight(),
            response_time_ms: start_time.elapsed().as_millis() as u64,
        };

        if is_healthy {
            json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
        } else {
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ServiceUnavailable,
                "Service Unavailable",
                Some(data),
            )
        }
    }

    // 就绪检查：存储可用才返回 200
    pub async fn readiness_check(services: web::Data<AppServices>) -> impl Responder {
        trace!("Received readiness check request");
        if services.storage.ping().await {
            HttpResponse::Ok()
                .append_header(("Content-Type", "text/plain"))
                .body("OK")
        } else {
            HttpResponse::ServiceUnavailable()
                .append_header(("Content-Type", "text/plain"))
                .body("Storage unavailable")
        }
    }

    pub async fn liveness_check() -> impl Responder {
        trace!("Received liveness check request");
        HttpResponse::NoContent().finish()
    }
}

/// Health 路由 `/health`
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/ready", web::get().to(HealthService::readiness_check))
        .route("/ready", web::head().to(HealthService::readiness_check))
        .route("/live", web::get().to(HealthService::liveness_check))
        .route("/live", web::head().to(HealthService::liveness_check))
}
