//! Action Dispatcher: the pipeline every `POST /do` request passes through,
//! ending in a static action-routing table keyed by the envelope's
//! `action` field.

use actix_web::HttpRequest;
use helixtrack_auth::{AuthorizationEngine, JwtManager};
use helixtrack_core::{AccessRequest, PermissionLevel};
use helixtrack_events::{EventContext, EventPublisher};
use helixtrack_security::{AuditEntry, AuditKind, AuditSink, IngressPipeline, RequestContext};
use helixtrack_websocket::HubHandle;
use serde_json::Value as Json;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::config::ApiConfig;
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::ApiError;
use crate::handlers::ticket::{self, TicketStore};

/// Actions reachable without a JWT. `/do`
/// itself has none today — health/auth/csp-report live on their own routes
/// — but the dispatcher still carries the set as the extension point the
/// step implies, rather than hard-coding "every action requires a JWT".
fn public_actions() -> &'static HashSet<&'static str> {
    static PUBLIC: std::sync::OnceLock<HashSet<&'static str>> = std::sync::OnceLock::new();
    PUBLIC.get_or_init(HashSet::new)
}

struct ActionMeta {
    resource: &'static str,
    entity: &'static str,
    mutating: bool,
}

fn action_meta(action: &str) -> Option<ActionMeta> {
    match action {
        "ticketCreate" => Some(ActionMeta { resource: "ticket", entity: "ticket", mutating: true }),
        "ticketList" => Some(ActionMeta { resource: "ticket", entity: "ticket", mutating: false }),
        "ticketUpdate" => Some(ActionMeta { resource: "ticket", entity: "ticket", mutating: true }),
        "ticketDelete" => Some(ActionMeta { resource: "ticket", entity: "ticket", mutating: true }),
        _ => None,
    }
}

pub struct AppState {
    pub config: ApiConfig,
    pub engine: Arc<AuthorizationEngine>,
    pub publisher: Arc<EventPublisher>,
    pub jwt: Arc<JwtManager>,
    pub ingress: Arc<IngressPipeline>,
    pub audit: Arc<AuditSink>,
    pub hub: HubHandle,
    pub tickets: TicketStore,
    pub started_at: Instant,
}

impl AppState {
    fn audit_ingress_denial(&self, ip: IpAddr, reason: &str) {
        let entry = AuditEntry::new(AuditKind::Security, None, "ingress", "ingress-check", false, reason.to_string())
            .with_source(ip.to_string(), None);
        self.audit.log(entry);
    }
}

fn client_ip(req: &HttpRequest) -> IpAddr {
    req.peer_addr().map(|addr| addr.ip()).unwrap_or_else(|| "0.0.0.0".parse().unwrap())
}

/// Steps 1-2: run the ingress pipeline over the raw request, then decode the
/// envelope. Oversized/injection/rate-limit/CSRF denials never reach JSON
/// decoding — the audit entry for the denial is written before any
/// DB/authorization work is performed.
pub async fn handle_do(state: &AppState, req: &HttpRequest, body: &[u8]) -> Result<ResponseEnvelope, ApiError> {
    let ip = client_ip(req);
    let uri_len = req.uri().to_string().len();
    let header_len: usize = req.headers().iter().map(|(k, v)| k.as_str().len() + v.len()).sum();

    let parsed_body: Option<Json> = serde_json::from_slice(body).ok();

    let ctx = RequestContext {
        ip,
        method: req.method().as_str(),
        path: req.path(),
        uri_len,
        header_len,
        body_len: body.len(),
        body: parsed_body.as_ref(),
        user_agent: req.headers().get("User-Agent").and_then(|v| v.to_str().ok()).unwrap_or(""),
        csrf_cookie: None,
        csrf_header: None,
        auth_username: None,
    };

    if let Err(denial) = state.ingress.check(&ctx).await {
        state.audit_ingress_denial(ip, &denial.reason);
        return Err(ApiError::ingress_denied(&denial.reason, denial.detail, denial.status_code));
    }

    let envelope: RequestEnvelope =
        serde_json::from_slice(body).map_err(|e| ApiError::invalid_request(format!("malformed envelope: {e}")))?;

    dispatch(state, req, envelope).await
}

/// Steps 3-9: action routing, authentication, authorization, invocation, and
/// publication.
async fn dispatch(state: &AppState, req: &HttpRequest, envelope: RequestEnvelope) -> Result<ResponseEnvelope, ApiError> {
    let RequestEnvelope { action, jwt, data, .. } = envelope;

    let Some(meta) = action_meta(&action) else {
        return Ok(ResponseEnvelope::error(1001, format!("Unknown action: {action}")));
    };

    let is_public = public_actions().contains(action.as_str());

    let claims = if is_public {
        None
    } else {
        let token = jwt
            .or_else(|| bearer_token(req))
            .ok_or_else(ApiError::missing_jwt)?;
        Some(state.jwt.validate_access_token(&token).map_err(|_| ApiError::invalid_jwt())?)
    };

    let username = claims.as_ref().map(|c| c.username.clone()).unwrap_or_else(|| "anonymous".to_string());

    let project_id = data.get("projectId").and_then(|v| v.as_str()).map(|s| s.to_string());
    let entity_id = data.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());

    if !is_public {
        let mut access = AccessRequest::new(username.clone(), meta.resource, entity_id.clone(), action.clone());
        if let Some(project_id) = &project_id {
            access = access.with_project(project_id.clone());
        }
        let decision = state.engine.check_access(&access).await;
        if !decision.allowed {
            return Err(ApiError::forbidden(&decision.reason));
        }
    }

    let result = invoke(state, &username, &action, data)?;

    if meta.mutating {
        if let Some((entity_id, event_data)) = result.published.clone() {
            // The event's visibility gate is the permission needed to *view* the
            // entity, not the permission the mutating action itself required —
            // a read-only subscriber must still receive `ticket.created`.
            let required = vec![PermissionLevel::Read.name().to_string()];
            let mut context = EventContext::new().with_required_permissions(required);
            if let Some(project_id) = project_id {
                context = context.with_project(project_id);
            }
            state.publisher.publish(
                helixtrack_events::event_type_name(meta.entity, verb(&action)),
                meta.entity,
                entity_id,
                username.as_str(),
                event_data,
                context,
            );
        }
    }

    Ok(ResponseEnvelope::success(result.data))
}

struct HandlerResult {
    data: Json,
    /// Set only for mutations that should publish an event: `(entity_id, event_data)`.
    published: Option<(String, Json)>,
}

fn verb(action: &str) -> &str {
    if action.ends_with("Create") {
        "created"
    } else if action.ends_with("Update") {
        "updated"
    } else if action.ends_with("Delete") {
        "deleted"
    } else {
        "changed"
    }
}

fn invoke(state: &AppState, username: &str, action: &str, data: Json) -> Result<HandlerResult, ApiError> {
    match action {
        "ticketCreate" => {
            let (response, id, event_data) = ticket::create(&state.tickets, username, data)?;
            Ok(HandlerResult { data: response, published: Some((id, event_data)) })
        }
        "ticketList" => Ok(HandlerResult { data: ticket::list(&state.tickets, data)?, published: None }),
        "ticketUpdate" => {
            let (response, id, event_data) = ticket::update(&state.tickets, data)?;
            Ok(HandlerResult { data: response, published: Some((id, event_data)) })
        }
        "ticketDelete" => {
            let (response, id) = ticket::delete(&state.tickets, data)?;
            Ok(HandlerResult { data: response, published: Some((id, Json::Null)) })
        }
        other => {
            warn!(action = other, "routed action has no handler");
            Err(ApiError::unknown_action(other))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_has_no_metadata() {
        assert!(action_meta("bogus").is_none());
    }

    #[test]
    fn ticket_create_is_classified_as_a_mutation() {
        let meta = action_meta("ticketCreate").unwrap();
        assert!(meta.mutating);
    }

    #[test]
    fn ticket_list_is_not_a_mutation() {
        let meta = action_meta("ticketList").unwrap();
        assert!(!meta.mutating);
    }
}
