//! Event Publisher: a bounded `mpsc` inbox feeding a fan-out stage. The
//! broadcast-to-many-clients side lives in `helixtrack-websocket`'s Hub,
//! which is handed this channel's receiving end at startup.

use crate::event::{Event, EventContext};
use helixtrack_security::{AuditEntry, AuditKind, AuditSink};
use serde_json::Value as Json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventPublisherConfig {
    /// Bound on the single inbox between the publisher and the Hub. On
    /// queue-full, the event is dropped and a warning audit entry is emitted.
    pub queue_capacity: usize,
}

impl Default for EventPublisherConfig {
    fn default() -> Self {
        Self { queue_capacity: 4096 }
    }
}

/// `Publish(action, entity-kind, entity-id, actor, data, context)`. Never
/// blocks the calling handler beyond the cost of a bounded-channel enqueue.
pub struct EventPublisher {
    tx: mpsc::Sender<Event>,
    audit: Arc<AuditSink>,
}

impl EventPublisher {
    /// Returns the publisher plus the receiving half the Hub subscribes to.
    pub fn new(config: EventPublisherConfig, audit: Arc<AuditSink>) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        (Self { tx, audit }, rx)
    }

    pub fn publish(
        &self,
        action: impl Into<String>,
        entity: impl Into<String>,
        entity_id: impl Into<String>,
        actor: impl Into<String>,
        data: Json,
        context: EventContext,
    ) -> Uuid {
        let event = Event::new(action, entity, entity_id, actor, data, context);
        let id = event.id;

        if let Err(err) = self.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(dropped) => {
                    warn!(event_type = %dropped.event_type, entity_id = %dropped.entity_id, "event queue full, dropping event");
                    let entry = AuditEntry::new(
                        AuditKind::Access,
                        Some(dropped.actor.clone()),
                        dropped.entity.clone(),
                        dropped.event_type.clone(),
                        false,
                        "event-queue-full",
                    )
                    .with_resource_id(dropped.entity_id.clone());
                    self.audit.log(entry);
                }
                mpsc::error::TrySendError::Closed(_) => {
                    // No Hub is listening (e.g. during startup/shutdown); not
                    // an error condition worth an audit entry.
                    warn!("event hub receiver dropped, no subscriber to deliver to");
                }
            }
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn test_audit_sink() -> Arc<AuditSink> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://localhost/helixtrack_test")
            .expect("lazy pool construction never touches the network");
        Arc::new(AuditSink::new(pool, 30))
    }

    #[tokio::test]
    async fn publish_delivers_to_the_hub_receiver() {
        let (publisher, mut rx) = EventPublisher::new(EventPublisherConfig { queue_capacity: 4 }, test_audit_sink());

        publisher.publish("ticket.created", "ticket", "t-1", "alice", Json::Null, EventContext::new().with_project("proj-1"));

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.event_type, "ticket.created");
        assert_eq!(event.entity_id, "t-1");
        assert_eq!(event.context.project_id.as_deref(), Some("proj-1"));
    }

    #[tokio::test]
    async fn publish_drops_silently_once_the_inbox_is_full() {
        let (publisher, mut rx) = EventPublisher::new(EventPublisherConfig { queue_capacity: 1 }, test_audit_sink());

        publisher.publish("ticket.created", "ticket", "t-1", "alice", Json::Null, EventContext::new());
        // Inbox capacity 1 is now full (nobody has received yet); the second
        // publish must drop instead of blocking this async test forever.
        publisher.publish("ticket.created", "ticket", "t-2", "alice", Json::Null, EventContext::new());

        let first = rx.recv().await.expect("first event survives");
        assert_eq!(first.entity_id, "t-1");

        let second = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err(), "second event should have been dropped, not queued");
    }
}
