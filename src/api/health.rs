use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::state::AppState;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    running_jobs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_workspaces: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime_secs: Option<i64>,
}

impl HealthResponse {
    fn engine_only(status: &str, state: &AppState) -> Self {
        let engine = state.runner.engine();
        HealthResponse {
            status: status.to_string(),
            engine: if engine.is_some() { "available" } else { "missing" }.to_string(),
            engine_path: engine.map(|e| e.program().display().to_string()),
            running_jobs: None,
            active_workspaces: None,
            uptime_secs: None,
        }
    }
}

/// Landing route, kept for clients that poll `/` to see if the server is up
#[get("/")]
async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("media gateway is online")
}

/// Health check endpoint
///
/// Always 200. Reports `degraded` when no media engine was found, since
/// every job endpoint will then fail.
#[get("/health")]
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let status = if state.runner.engine().is_some() { "healthy" } else { "degraded" };
    debug!("Health check: {}", status);

    let mut response = HealthResponse::engine_only(status, &state);
    response.running_jobs = Some(state.runner.running_jobs());
    response.active_workspaces = Some(state.workspaces.active_count());
    response.uptime_secs = Some(state.uptime_secs());
    HttpResponse::Ok().json(response)
}

/// Readiness check endpoint
///
/// Returns 503 while no engine is available so a load balancer stops
/// routing job traffic here.
#[get("/ready")]
async fn readiness_check(state: web::Data<AppState>) -> impl Responder {
    if state.runner.engine().is_some() {
        HttpResponse::Ok().json(HealthResponse::engine_only("ready", &state))
    } else {
        warn!("Readiness check failed: media engine unavailable");
        HttpResponse::ServiceUnavailable().json(HealthResponse::engine_only("not_ready", &state))
    }
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "alive"}))
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(index)
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
