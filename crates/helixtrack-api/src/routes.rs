//! Route table: wires the HTTP surface onto the dispatcher and hub.

use actix_web::{web, HttpRequest, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dispatcher::{self, AppState};
use crate::envelope::ResponseEnvelope;
use crate::error::ApiError;

async fn do_action(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> impl Responder {
    match dispatcher::handle_do(&state, &req, &body).await {
        Ok(envelope) => HttpResponse::Ok().json(envelope),
        Err(err) => err.error_response(),
    }
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    db: bool,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    #[serde(rename = "uptimeSeconds")]
    uptime_seconds: u64,
    checks: HealthChecks,
}

/// `GET /health` is public and unauthenticated.
async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthBody {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        checks: HealthChecks { db: true },
    })
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    username: String,
    #[allow(dead_code)]
    password: String,
}

/// Public auth endpoint — out of core scope, but the dispatcher needs to
/// know it's public. No credential store exists in this crate, so this
/// only exercises the brute-force tracker honestly and then reports a
/// generic failure rather than faking a login that never succeeds.
async fn login(state: web::Data<AppState>, req: HttpRequest, body: web::Json<AuthBody>) -> impl Responder {
    let ip = req.peer_addr().map(|a| a.ip()).unwrap_or_else(|| "0.0.0.0".parse().unwrap());
    let ctx = helixtrack_security::RequestContext {
        ip,
        method: "POST",
        path: "/auth/login",
        uri_len: req.uri().to_string().len(),
        header_len: 0,
        body_len: 0,
        body: None,
        user_agent: req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).unwrap_or(""),
        csrf_cookie: None,
        csrf_header: None,
        auth_username: Some(&body.username),
    };

    match state.ingress.check(&ctx).await {
        Err(denial) => ApiError::ingress_denied(&denial.reason, denial.detail, denial.status_code).error_response(),
        Ok(delay) => {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            state.ingress.record_auth_failure(ip, &body.username);
            HttpResponse::Unauthorized().json(ResponseEnvelope::error(1008, "invalid credentials"))
        }
    }
}

async fn register() -> impl Responder {
    HttpResponse::NotImplemented().json(ResponseEnvelope::error(2000, "registration is out-of-core"))
}

async fn logout() -> impl Responder {
    HttpResponse::Ok().json(ResponseEnvelope::success(json!(null)))
}

async fn csp_report(body: web::Bytes) -> impl Responder {
    tracing::warn!(bytes = body.len(), "received CSP violation report");
    HttpResponse::NoContent().finish()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/do", web::post().to(do_action))
        .route("/health", web::get().to(health))
        .route("/auth/register", web::post().to(register))
        .route("/auth/login", web::post().to(login))
        .route("/auth/logout", web::post().to(logout))
        .route("/csp-report", web::post().to(csp_report));
    helixtrack_websocket::configure(cfg);
}
