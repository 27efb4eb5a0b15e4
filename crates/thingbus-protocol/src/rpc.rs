//! Call / response envelope types (schema version 1).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, ProtocolError};
use crate::methods::{GET_OBJECT_METHODS, RELEASE_LOCK_IF_ANY, SERVER_TARGET};

/// Current wire schema version. Frames carrying any other version are rejected.
pub const SCHEMA_VERSION: u32 = 1;

/// Positional arguments of a call.
pub type Args = Vec<Value>;

/// Keyword arguments of a call.
pub type Kwargs = Map<String, Value>;

/// Description of one exposed method, as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDescriptor {
    pub name: String,
    /// Rendered parameter list, e.g. `(a, b)`.
    pub signature: String,
    pub docstring: String,
}

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        signature: impl Into<String>,
        docstring: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            docstring: docstring.into(),
        }
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// A remote procedure call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Call {
    pub v: u32,
    /// Client-chosen request id, echoed back in the response.
    pub id: u64,
    /// Object name, or [`SERVER_TARGET`] for broker-internal operations.
    pub target: String,
    pub method: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub kwargs: Kwargs,
}

/// Reply to a [`Call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Response {
    pub v: u32,
    /// Id of the call this answers; `None` when the call could not be decoded.
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Value,
    pub error: ErrorKind,
}

// ─────────────────────────────────────────────────────────────────────────────
// Constructors
// ─────────────────────────────────────────────────────────────────────────────

impl Call {
    pub fn new(
        id: u64,
        target: impl Into<String>,
        method: impl Into<String>,
        args: Args,
        kwargs: Kwargs,
    ) -> Self {
        Self {
            v: SCHEMA_VERSION,
            id,
            target: target.into(),
            method: method.into(),
            args,
            kwargs,
        }
    }

    /// The reserved discovery call for `name`.
    pub fn get_object_methods(id: u64, name: &str) -> Self {
        Self::new(id, SERVER_TARGET, GET_OBJECT_METHODS, vec![Value::from(name)], Kwargs::new())
    }

    /// The reserved lock cleanup call for `name`.
    pub fn release_lock_if_any(id: u64, name: &str) -> Self {
        Self::new(id, SERVER_TARGET, RELEASE_LOCK_IF_ANY, vec![Value::from(name)], Kwargs::new())
    }

    pub fn is_server_call(&self) -> bool {
        self.target == SERVER_TARGET
    }

    /// First positional argument as a string, used by the reserved calls.
    pub fn object_name_arg(&self) -> Option<&str> {
        self.args.first().and_then(Value::as_str)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let call: Self = serde_json::from_str(frame)?;
        if call.v != SCHEMA_VERSION {
            return Err(ProtocolError::UnsupportedVersion(call.v));
        }
        Ok(call)
    }
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            v: SCHEMA_VERSION,
            id: Some(id),
            result,
            error: ErrorKind::NoError,
        }
    }

    /// An error response; the result is always null.
    pub fn error(id: Option<u64>, error: ErrorKind) -> Self {
        Self {
            v: SCHEMA_VERSION,
            id,
            result: Value::Null,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.error.is_error()
    }

    pub fn into_result(self) -> Result<Value, ErrorKind> {
        if self.error.is_error() {
            Err(self.error)
        } else {
            Ok(self.result)
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let response: Self = serde_json::from_str(frame)?;
        if response.v != SCHEMA_VERSION {
            return Err(ProtocolError::UnsupportedVersion(response.v));
        }
        if response.error.is_error() && !response.result.is_null() {
            return Err(ProtocolError::ErrorWithResult);
        }
        Ok(response)
    }
}
