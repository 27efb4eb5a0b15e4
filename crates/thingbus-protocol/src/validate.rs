//! Client-side response validation.

use serde_json::Value;

use crate::error::{ProtocolError, ResponseError};
use crate::rpc::{MethodDescriptor, Response};

/// Validate a raw response frame for the call with id `expected_id`.
///
/// Returns the call result on success. A response with an id other than
/// `expected_id` is reported as [`ResponseError::Stale`]; a response with no id
/// is taken to answer the pending call (the broker could not read its id).
pub fn validate_response(frame: &str, expected_id: u64) -> Result<Value, ResponseError> {
    let response = Response::decode(frame).map_err(ResponseError::Invalid)?;

    if let Some(got) = response.id {
        if got != expected_id {
            return Err(ResponseError::Stale {
                expected: expected_id,
                got,
            });
        }
    }

    response.into_result().map_err(ResponseError::Remote)
}

/// Decode the result of a discovery call into a method table.
pub fn decode_method_table(result: Value) -> Result<Vec<MethodDescriptor>, ResponseError> {
    serde_json::from_value(result)
        .map_err(|e| ResponseError::Invalid(ProtocolError::Malformed(e)))
}
