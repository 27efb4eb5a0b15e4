//! Thingbus - Protocol Types
//!
//! The shared vocabulary between broker, workers and client proxies: the
//! call and response envelopes, the closed set of error kinds, method
//! descriptors returned by discovery, and the reserved `_server` surface.
//!
//! Frames are JSON text under a versioned schema. Anything outside the schema
//! (unknown fields, wrong version, wrong types) is rejected at decode time.

pub mod error;
pub mod methods;
pub mod rpc;
pub mod validate;

pub use error::{ErrorKind, ProtocolError, ResponseError};
pub use methods::{
    GET_OBJECT_METHODS, RELEASE_LOCK_IF_ANY, RESERVED_CLIENT_NAMES, SERVER_TARGET,
    internal_address, is_reserved_client_name,
};
pub use rpc::{Args, Call, Kwargs, MethodDescriptor, Response, SCHEMA_VERSION};
pub use validate::{decode_method_table, validate_response};
