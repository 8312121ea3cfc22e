//! WebSocket Hub for HelixTrack Core: client registry,
//! authorization-filtered event fan-out, and the `GET /ws` upgrade route.

pub mod client;
pub mod hub;
pub mod route;

pub use client::{ClientHandle, ClientState, DeliverEvent, ForceClose, WsSession};
pub use hub::{HubHandle, HubStats};
pub use route::{configure, ws_handler, WsQuery};
