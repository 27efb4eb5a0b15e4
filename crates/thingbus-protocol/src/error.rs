//! Thingbus error kinds carried on the wire, plus local decode/validation errors.

use serde::{Deserialize, Serialize};

/// Outcome of a remote procedure call as reported in a [`Response`](crate::Response).
///
/// This is a closed set. `NoError` is the only success value; every other
/// variant means the response carries no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoError,
    /// The target object name is not registered.
    NoSuchThing,
    /// The object exists but does not expose the method.
    NoSuchMethod,
    /// The exposed method failed while executing.
    MethodException,
    /// The request did not decode into a well-formed call.
    InvalidRpc,
    /// The object's critical section is held by another caller.
    LockHeld,
    /// Client side: the response did not decode into a well-formed response.
    InvalidResponse,
}

impl ErrorKind {
    pub fn is_error(&self) -> bool {
        *self != Self::NoError
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoError => "NO_ERROR",
            Self::NoSuchThing => "NO_SUCH_THING",
            Self::NoSuchMethod => "NO_SUCH_METHOD",
            Self::MethodException => "METHOD_EXCEPTION",
            Self::InvalidRpc => "INVALID_RPC",
            Self::LockHeld => "LOCK_HELD",
            Self::InvalidResponse => "INVALID_RESPONSE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to decode a frame into a [`Call`](crate::Call) or [`Response`](crate::Response).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("error response carries a result")]
    ErrorWithResult,
}

/// Why a received response could not be turned into a call result.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    /// The server answered with an error kind.
    #[error("remote procedure error: {0}")]
    Remote(ErrorKind),
    /// The frame was not a well-formed response.
    #[error("invalid response: {0}")]
    Invalid(#[source] ProtocolError),
    /// The frame answers an earlier request, not the one being waited on.
    #[error("stale response for request {got} (expected {expected})")]
    Stale { expected: u64, got: u64 },
}

impl ResponseError {
    /// The wire-level kind this failure maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(kind) => *kind,
            Self::Invalid(_) | Self::Stale { .. } => ErrorKind::InvalidResponse,
        }
    }
}
