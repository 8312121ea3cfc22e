//! Event record: a dynamic `entity`/`event_type` string pair rather than a
//! closed enum, since HelixTrack's entity set (tickets, versions, filters,
//! watchers, ...) isn't known to this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

/// The schema revision of the event envelope itself. Bump this, not
/// `Event`'s field shape, when the wire envelope changes.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// `event.context.required-permissions` on `event.context.project-id` is
/// what the Hub checks against the authorization engine before delivering
/// to a subscriber.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(rename = "permissions", default)]
    pub required_permissions: Vec<String>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_required_permissions(mut self, permissions: Vec<String>) -> Self {
        self.required_permissions = permissions;
        self
    }
}

/// The WebSocket protocol server-to-client `event` frame shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub entity: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub actor: String,
    pub data: Json,
    pub context: EventContext,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        actor: impl Into<String>,
        data: Json,
        context: EventContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            entity: entity.into(),
            entity_id: entity_id.into(),
            actor: actor.into(),
            data,
            context,
            timestamp: Utc::now(),
            version: EVENT_SCHEMA_VERSION,
        }
    }
}

/// Event naming convention: `<entity>.<verb>`.
pub fn event_type_name(entity: &str, verb: &str) -> String {
    format!("{entity}.{verb}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_name_follows_entity_dot_verb() {
        assert_eq!(event_type_name("ticket", "created"), "ticket.created");
        assert_eq!(event_type_name("version", "released"), "version.released");
    }

    #[test]
    fn new_event_carries_the_current_schema_version() {
        let event = Event::new("ticket.created", "ticket", "t-1", "alice", Json::Null, EventContext::new());
        assert_eq!(event.version, EVENT_SCHEMA_VERSION);
    }

    #[test]
    fn context_serializes_permissions_under_the_short_wire_key() {
        let context = EventContext::new()
            .with_project("proj-1")
            .with_required_permissions(vec!["READ".to_string()]);
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["permissions"], serde_json::json!(["READ"]));
        assert!(value.get("requiredPermissions").is_none());
    }
}
