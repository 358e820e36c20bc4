use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::app::AppCore;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    databases: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn check_databases(core: &AppCore) -> Result<(), String> {
    for name in core.catalog.names() {
        let Some(pool) = core.catalog.get(&name) else {
            continue;
        };
        if let Err(e) = sqlx::query("select 1").fetch_one(pool).await {
            return Err(format!("Database '{}' error: {}", name, e));
        }
    }
    Ok(())
}

/// Health check endpoint
///
/// General health check including connectivity to every cataloged database.
/// Use for load balancers and uptime monitors.
#[get("/health")]
async fn health_check(core: web::Data<Arc<AppCore>>) -> impl Responder {
    match check_databases(&core).await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "healthy".to_string(),
            databases: "connected".to_string(),
            error: None,
        }),
        Err(e) => {
            error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "unhealthy".to_string(),
                databases: "disconnected".to_string(),
                error: Some(e),
            })
        }
    }
}

/// Readiness check endpoint
///
/// Checks if service is ready to accept traffic (includes database check).
/// Returns 503 if dependencies unavailable, but process will recover when they return.
#[get("/ready")]
async fn readiness_check(core: web::Data<Arc<AppCore>>) -> impl Responder {
    match check_databases(&core).await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "ready".to_string(),
            databases: "connected".to_string(),
            error: None,
        }),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "not_ready".to_string(),
                databases: "disconnected".to_string(),
                error: Some(e),
            })
        }
    }
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive".to_string(),
        databases: "not_checked".to_string(),
        error: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
