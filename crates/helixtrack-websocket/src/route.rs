//! `GET /ws` upgrade handler: validates the JWT before starting the
//! session actor.

use actix_web::{web, HttpRequest, HttpResponse, Result};
use actix_web_actors::ws;
use helixtrack_auth::JwtManager;
use serde::Deserialize;

use crate::client::WsSession;
use crate::hub::HubHandle;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT passed as a query parameter; a cookie is also accepted.
    pub token: Option<String>,
}

const WS_COOKIE_NAME: &str = "helixtrack_ws_token";

/// Upgrades and authenticates a client. Auth happens before the upgrade
/// completes: a missing/invalid token never reaches `Connecting` at all,
/// the strictest reading of "Connecting may only transition to Closed on
/// auth failure".
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    jwt: web::Data<JwtManager>,
    hub: web::Data<HubHandle>,
    max_consecutive_drops: web::Data<u64>,
) -> Result<HttpResponse> {
    let token = query
        .token
        .clone()
        .or_else(|| req.cookie(WS_COOKIE_NAME).map(|c| c.value().to_string()));

    let Some(token) = token else {
        return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
            "errorCode": 1007,
            "errorMessage": "Missing JWT",
        })));
    };

    let claims = match jwt.validate_access_token(&token) {
        Ok(claims) => claims,
        Err(_) => {
            return Ok(HttpResponse::Unauthorized().json(serde_json::json!({
                "errorCode": 1008,
                "errorMessage": "Invalid JWT",
            })));
        }
    };

    let session = WsSession::new(claims.username, hub.get_ref().clone(), *max_consecutive_drops.get_ref());
    ws::start(session, &req, stream)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_handler));
}
