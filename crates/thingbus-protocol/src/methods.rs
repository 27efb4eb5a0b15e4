//! Reserved names and address conventions shared by broker and client.

/// Target name of broker-internal operations.
pub const SERVER_TARGET: &str = "_server";

/// `_server.get_object_methods(name) -> [MethodDescriptor]`
pub const GET_OBJECT_METHODS: &str = "get_object_methods";

/// `_server.release_lock_if_any(name) -> null`
pub const RELEASE_LOCK_IF_ANY: &str = "release_lock_if_any";

/// Method names the client proxy keeps for itself. A remote object may not
/// expose methods with these names.
pub const RESERVED_CLIENT_NAMES: &[&str] = &["available_methods", "close_this_thing"];

pub fn is_reserved_client_name(name: &str) -> bool {
    RESERVED_CLIENT_NAMES.contains(&name)
}

/// Private address of the worker that owns object `name`.
///
/// Derived from the name alone and only used between broker and worker.
pub fn internal_address(name: &str) -> String {
    format!("inproc://{name}_worker")
}
