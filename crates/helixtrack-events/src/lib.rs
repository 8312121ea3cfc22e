//! In-process event publication for HelixTrack Core: domain
//! handlers call `Publish`; the event lands in a bounded channel the
//! `helixtrack-websocket` Hub drains and fans out to subscribed, authorized
//! clients.

pub mod event;
pub mod publisher;

pub use event::{event_type_name, Event, EventContext, EVENT_SCHEMA_VERSION};
pub use publisher::{EventPublisher, EventPublisherConfig};
