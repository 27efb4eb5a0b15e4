//! Client errors.

use thingbus_protocol::{ErrorKind, ProtocolError};
use thingbus_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("timed out waiting for response from server")]
    Timeout,
    #[error("remote procedure error: {0}")]
    Remote(ErrorKind),
    #[error("received invalid response: {0}")]
    InvalidResponse(#[source] ProtocolError),
    #[error("failed to encode call: {0}")]
    Encode(#[source] ProtocolError),
    #[error("unexpected result type: {0}")]
    ResultType(#[source] serde_json::Error),
    #[error("method name `{0}` is reserved for internal use, please change it in the remote object")]
    ReservedName(String),
    #[error("connection to the server already closed")]
    AlreadyClosed,
    #[error("connection to the server is closed")]
    Closed,
}

impl ClientError {
    /// The wire-level error kind, for failures reported by or about a response.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote(kind) => Some(*kind),
            Self::InvalidResponse(_) => Some(ErrorKind::InvalidResponse),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
