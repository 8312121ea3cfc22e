//! WebSocket Hub: client registry, event fan-out, and stats. Clients are
//! addressed through `actix::Addr` mailboxes rather than raw sockets.

use crate::client::{ClientHandle, DeliverEvent, ForceClose};
use actix::SendError;
use dashmap::DashMap;
use helixtrack_auth::AuthorizationEngine;
use helixtrack_events::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Snapshot of hub health: active clients, events delivered per second,
/// and drops.
#[derive(Debug, Clone)]
pub struct HubStats {
    pub active_clients: u64,
    pub events_per_sec: f64,
    pub dropped: u64,
}

struct HubInner {
    clients: DashMap<Uuid, ClientHandle>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    started_at: Instant,
}

/// Cloneable capability handle passed to both the HTTP upgrade route and
/// every `WsSession` actor.
#[derive(Clone)]
pub struct HubHandle {
    inner: Arc<HubInner>,
}

impl HubHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                clients: DashMap::new(),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn register(&self, id: Uuid, handle: ClientHandle) {
        self.inner.clients.insert(id, handle);
    }

    pub fn unregister(&self, id: Uuid) {
        self.inner.clients.remove(&id);
    }

    pub fn stats(&self) -> HubStats {
        let elapsed = self.inner.started_at.elapsed().as_secs_f64().max(1.0);
        HubStats {
            active_clients: self.inner.clients.len() as u64,
            events_per_sec: self.inner.delivered.load(Ordering::Relaxed) as f64 / elapsed,
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Backpressure threshold past which a consistently-full client gets
    /// disconnected rather than endlessly dropped.
    const MAX_CONSECUTIVE_DROPS: u64 = 20;

    fn deliver_to(&self, handle: &ClientHandle, event: &Event) {
        match handle.addr.try_send(DeliverEvent(event.clone())) {
            Ok(()) => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(SendError::Full(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                let consecutive = handle.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if consecutive >= Self::MAX_CONSECUTIVE_DROPS {
                    warn!(username = %handle.username, "client exceeded backpressure threshold, disconnecting");
                    handle.addr.do_send(ForceClose("backpressure".into()));
                }
            }
            Err(SendError::Closed(_)) => {
                // Actor already stopped; `started`/`stopped` will reconcile the
                // registry shortly, nothing to do here.
            }
        }
    }

    /// Drains the publisher's event channel and fans each event out to every
    /// subscribed, authorized client. Runs for the
    /// lifetime of the process; intended to be spawned once at startup.
    pub async fn run(self, mut events: mpsc::Receiver<Event>, engine: Arc<AuthorizationEngine>) {
        while let Some(event) = events.recv().await {
            let candidates: Vec<ClientHandle> = self
                .inner
                .clients
                .iter()
                .filter(|entry| entry.value().subscriptions.read().expect("subscription lock poisoned").contains(&event.event_type))
                .map(|entry| entry.value().clone())
                .collect();

            for handle in candidates {
                let allowed = engine
                    .satisfies(
                        &handle.username,
                        &event.entity,
                        event.context.project_id.as_deref(),
                        &event.context.required_permissions,
                    )
                    .await;
                if allowed {
                    self.deliver_to(&handle, &event);
                }
            }
        }
    }
}

impl Default for HubHandle {
    fn default() -> Self {
        Self::new()
    }
}
