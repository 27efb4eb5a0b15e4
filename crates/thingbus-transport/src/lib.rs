//! Thingbus Transport Layer
//!
//! Message transport between client proxies and the broker:
//! - `server`: the public router endpoint. Every WebSocket connection gets
//!   an identity; inbound frames, connects and disconnects are delivered as
//!   [`RouterEvent`]s and replies are addressed back by identity.
//! - `client`: the request socket used by a client proxy.
//! - `endpoint`: parsing of `tcp://host:port` style addresses.
//!
//! The transport knows nothing about calls or responses; frames are opaque text.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod server;

pub use client::RequestSocket;
pub use endpoint::Endpoint;
pub use error::TransportError;
pub use server::{HealthProbe, PeerId, RouterEndpoint, RouterEvent, TransportConfig};
