//! Thingbus Client — proxies for remote shared objects.
//!
//! A [`Thing`] connects to a broker, fetches the method table of one named
//! object, and forwards calls to it. Calls are strictly request-then-reply
//! and each waits at most the configured request timeout.

pub mod error;
pub mod thing;

pub use error::ClientError;
pub use thing::{Thing, ThingConfig};
