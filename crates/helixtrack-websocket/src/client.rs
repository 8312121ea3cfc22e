//! Per-client connection actor: an `actix-web-actors` websocket actor with
//! a heartbeat interval, a subscription set, and an authorization-filtered
//! event feed.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web_actors::ws;
use helixtrack_events::Event;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::hub::HubHandle;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-client state machine. `Connecting` never becomes an in-process
/// state here: the HTTP handler authenticates before starting the actor
/// at all, so a session is born `Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Authenticated,
    Subscribed,
    Idle,
    Closing,
    Closed,
}

/// Registry-side view of a connected client, shared between the session
/// actor (which owns the actix mailbox) and the Hub's dispatch loop (which
/// only needs to read/write the subscription set and send events).
#[derive(Clone)]
pub struct ClientHandle {
    pub username: String,
    pub subscriptions: Arc<RwLock<HashSet<String>>>,
    pub addr: actix::Addr<WsSession>,
    pub dropped: Arc<AtomicU64>,
}

/// Message the Hub's dispatch loop sends to push one event to this client.
#[derive(Message)]
#[rtype(result = "()")]
pub struct DeliverEvent(pub Event);

#[derive(Message)]
#[rtype(result = "()")]
pub struct ForceClose(pub String);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame<'a> {
    Event(&'a Event),
    Pong,
    Error { message: String },
    Close { reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientFrame {
    Subscribe { data: EventTypesPayload },
    Unsubscribe { data: EventTypesPayload },
    Ping,
}

#[derive(Debug, Deserialize)]
struct EventTypesPayload {
    #[serde(rename = "eventTypes")]
    event_types: Vec<String>,
}

pub struct WsSession {
    id: Uuid,
    username: String,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    state: ClientState,
    last_heartbeat: Instant,
    hub: HubHandle,
    /// Backpressure threshold: consecutive drops beyond this closes the
    /// connection.
    dropped: Arc<AtomicU64>,
    max_consecutive_drops: u64,
}

impl WsSession {
    pub fn new(username: String, hub: HubHandle, max_consecutive_drops: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            state: ClientState::Authenticated,
            last_heartbeat: Instant::now(),
            hub,
            dropped: Arc::new(AtomicU64::new(0)),
            max_consecutive_drops,
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |session, ctx| {
            if Instant::now().duration_since(session.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(client_id = %session.id, username = %session.username, "websocket heartbeat missed, closing");
                session.state = ClientState::Closed;
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_frame(&mut self, frame: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame {
            ClientFrame::Subscribe { data } => {
                let mut subs = self.subscriptions.write().expect("subscription lock poisoned");
                for event_type in data.event_types {
                    // Set semantics: double subscribe is a no-op.
                    subs.insert(event_type);
                }
                drop(subs);
                self.state = ClientState::Subscribed;
            }
            ClientFrame::Unsubscribe { data } => {
                let mut subs = self.subscriptions.write().expect("subscription lock poisoned");
                for event_type in data.event_types {
                    subs.remove(&event_type);
                }
                if subs.is_empty() {
                    self.state = ClientState::Idle;
                }
            }
            ClientFrame::Ping => {
                self.last_heartbeat = Instant::now();
                self.send_frame(ctx, &ServerFrame::Pong);
            }
        }
    }

    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &ServerFrame<'_>) {
        match serde_json::to_string(frame) {
            Ok(json) => ctx.text(json),
            Err(err) => warn!(error = %err, "failed to serialize websocket frame"),
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.hub.register(
            self.id,
            ClientHandle {
                username: self.username.clone(),
                subscriptions: self.subscriptions.clone(),
                addr: ctx.address(),
                dropped: self.dropped.clone(),
            },
        );
        info!(client_id = %self.id, username = %self.username, "websocket client connected");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.unregister(self.id);
        info!(client_id = %self.id, username = %self.username, "websocket client disconnected");
    }
}

impl Handler<DeliverEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: DeliverEvent, ctx: &mut Self::Context) {
        self.dropped.store(0, Ordering::Relaxed);
        self.send_frame(ctx, &ServerFrame::Event(&msg.0));
    }
}

impl Handler<ForceClose> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: ForceClose, ctx: &mut Self::Context) {
        self.state = ClientState::Closing;
        self.send_frame(ctx, &ServerFrame::Close { reason: msg.0 });
        self.state = ClientState::Closed;
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => self.handle_frame(frame, ctx),
                Err(err) => {
                    debug!(error = %err, "ignoring malformed websocket frame");
                    self.send_frame(ctx, &ServerFrame::Error { message: "malformed frame".into() });
                }
            },
            Ok(ws::Message::Binary(_)) => {
                // Text-JSON protocol only; binary frames are ignored.
            }
            Ok(ws::Message::Close(reason)) => {
                self.state = ClientState::Closing;
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helixtrack_events::EventContext;

    #[test]
    fn client_subscribe_frame_parses_event_type_list() {
        let json = r#"{"type":"subscribe","data":{"eventTypes":["ticket.created","ticket.updated"]}}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Subscribe { data } => {
                assert_eq!(data.event_types, vec!["ticket.created", "ticket.updated"]);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn server_event_frame_serializes_with_type_tag() {
        let event = Event::new("ticket.created", "ticket", "t-1", "alice", serde_json::Value::Null, EventContext::new());
        let frame = ServerFrame::Event(&event);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["eventType"], "ticket.created");
        assert_eq!(json["entityId"], "t-1");
    }

    #[test]
    fn server_pong_frame_serializes_to_bare_type_tag() {
        let json = serde_json::to_value(ServerFrame::Pong).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong"}));
    }
}
