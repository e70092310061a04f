//! HTTP route handlers: webhook intake, output retrieval, health

use crate::middleware::signature::{HubSignature, SIGNATURE_HEADER};
use crate::models::types::{PingEvent, PushEvent};
use crate::services::scheduler::JobScheduler;
use crate::stores::output::OutputStore;
use crate::utils::metrics::Metrics;
use actix_web::{web, HttpRequest, HttpResponse, Responder, Result as ActixResult};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const EVENT_HEADER: &str = "X-GitHub-Event";

pub struct AppState {
    pub scheduler: Arc<JobScheduler>,
    pub outputs: Arc<OutputStore>,
    pub signature: HubSignature,
    pub metrics: Arc<Metrics>,
}

/// Mount every route under `base_path`, except `/health` which stays at
/// the root for probes.
pub fn configure(cfg: &mut web::ServiceConfig, base_path: &str) {
    let base_path = base_path.trim_end_matches('/');
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope(base_path)
            .route("/hook", web::post().to(hook))
            .route("/outputs/{job_id}", web::get().to(get_output))
            .route("/debug/status", web::get().to(debug_status))
            .route("/metrics", web::get().to(metrics_handler)),
    );
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

pub async fn hook(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> ActixResult<impl Responder> {
    info!("Handling hook request");

    if let Err(e) = data.signature.verify(header(&req, SIGNATURE_HEADER), &body) {
        error!("Failed to validate hook payload: {}", e);
        return Ok(HttpResponse::Unauthorized().finish());
    }

    let event_type = header(&req, EVENT_HEADER).unwrap_or_default();
    match event_type {
        "ping" => {
            let event: PingEvent = match serde_json::from_slice(&body) {
                Ok(event) => event,
                Err(e) => return Ok(bad_payload(event_type, e)),
            };
            data.scheduler.orchestrator().on_ping(event).await;
        }
        "push" => {
            let event: PushEvent = match serde_json::from_slice(&body) {
                Ok(event) => event,
                Err(e) => return Ok(bad_payload(event_type, e)),
            };
            data.scheduler.schedule_push(event).await;
        }
        other => {
            info!(event_type = %other, "Ignoring unsupported hook event");
        }
    }

    Ok(HttpResponse::Ok().content_type("text/plain").body("OK"))
}

fn bad_payload(event_type: &str, e: serde_json::Error) -> HttpResponse {
    warn!(event_type = %event_type, "Failed to parse hook event: {}", e);
    HttpResponse::BadRequest().json(json!({
        "error": "Invalid event payload",
        "details": e.to_string(),
    }))
}

pub async fn get_output(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> ActixResult<impl Responder> {
    let job_id = path.into_inner();
    info!(job_id = %job_id, "Handling output request");

    Ok(match data.outputs.get_output(&job_id) {
        Some(output) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(output),
        None => HttpResponse::NotFound()
            .content_type("text/plain; charset=utf-8")
            .body(format!("No output found for jobid '{}'.", job_id)),
    })
}

pub async fn debug_status() -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().content_type("text/plain").body("OK"))
}

pub async fn health_check(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "active_jobs": data.scheduler.active_job_ids().await,
        "cached_outputs": data.outputs.len(),
        "output_capacity": data.outputs.capacity(),
    })))
}

pub async fn metrics_handler(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    match data.metrics.render() {
        Ok(body) => Ok(HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body)),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            Ok(HttpResponse::InternalServerError().finish())
        }
    }
}
