//! Protocol layer tests — envelope serialization, schema checks, validation.

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};
    use thingbus_protocol::*;

    // ─────────────────────────────────────────────────────────────────────
    // ErrorKind
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn error_kind_wire_names() {
        assert_eq!(serde_json::to_value(ErrorKind::NoError).unwrap(), json!("NO_ERROR"));
        assert_eq!(serde_json::to_value(ErrorKind::LockHeld).unwrap(), json!("LOCK_HELD"));
        let kind: ErrorKind = serde_json::from_value(json!("NO_SUCH_METHOD")).unwrap();
        assert_eq!(kind, ErrorKind::NoSuchMethod);
    }

    #[test]
    fn error_kind_display_matches_wire() {
        for kind in [
            ErrorKind::NoError,
            ErrorKind::NoSuchThing,
            ErrorKind::NoSuchMethod,
            ErrorKind::MethodException,
            ErrorKind::InvalidRpc,
            ErrorKind::LockHeld,
            ErrorKind::InvalidResponse,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.to_string()));
        }
    }

    #[test]
    fn unknown_error_kind_rejected() {
        assert!(serde_json::from_value::<ErrorKind>(json!("TIMEOUT")).is_err());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Call
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn call_roundtrip_with_mixed_values() {
        let mut kwargs = Map::new();
        kwargs.insert("scale".into(), json!(1.5));
        kwargs.insert("tags".into(), json!({"a": [1, null, true]}));
        let call = Call::new(7, "calc", "add", vec![json!(2), json!("x"), json!(null)], kwargs);

        let frame = call.encode().unwrap();
        let parsed = Call::decode(&frame).unwrap();
        assert_eq!(parsed, call);
    }

    #[test]
    fn call_from_wire_format() {
        let wire = r#"{"v":1,"id":3,"target":"calc","method":"add","args":[2,3]}"#;
        let call = Call::decode(wire).unwrap();
        assert_eq!(call.target, "calc");
        assert_eq!(call.args, vec![json!(2), json!(3)]);
        assert!(call.kwargs.is_empty());
        assert!(!call.is_server_call());
    }

    #[test]
    fn call_wrong_version_rejected() {
        let wire = r#"{"v":2,"id":1,"target":"calc","method":"add"}"#;
        assert!(matches!(
            Call::decode(wire),
            Err(ProtocolError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn call_unknown_field_rejected() {
        let wire = r#"{"v":1,"id":1,"target":"calc","method":"add","extra":true}"#;
        assert!(matches!(Call::decode(wire), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn call_missing_method_rejected() {
        let wire = r#"{"v":1,"id":1,"target":"calc"}"#;
        assert!(Call::decode(wire).is_err());
    }

    #[test]
    fn call_garbage_rejected() {
        assert!(Call::decode("not json").is_err());
        assert!(Call::decode("[1,2,3]").is_err());
    }

    #[test]
    fn reserved_calls() {
        let call = Call::get_object_methods(1, "calc");
        assert!(call.is_server_call());
        assert_eq!(call.method, GET_OBJECT_METHODS);
        assert_eq!(call.object_name_arg(), Some("calc"));

        let call = Call::release_lock_if_any(2, "calc");
        assert_eq!(call.target, SERVER_TARGET);
        assert_eq!(call.method, RELEASE_LOCK_IF_ANY);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Response
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn success_response_serialization() {
        let resp = Response::success(4, json!(5));
        assert!(resp.is_success());
        let parsed: serde_json::Value = serde_json::from_str(&resp.encode().unwrap()).unwrap();
        assert_eq!(parsed["id"], 4);
        assert_eq!(parsed["result"], 5);
        assert_eq!(parsed["error"], "NO_ERROR");
    }

    #[test]
    fn error_response_has_null_result() {
        let resp = Response::error(Some(9), ErrorKind::NoSuchThing);
        assert!(!resp.is_success());
        assert!(resp.result.is_null());
        assert_eq!(resp.clone().into_result(), Err(ErrorKind::NoSuchThing));

        let parsed = Response::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn error_response_with_result_rejected() {
        let wire = r#"{"v":1,"id":1,"result":42,"error":"METHOD_EXCEPTION"}"#;
        assert!(matches!(
            Response::decode(wire),
            Err(ProtocolError::ErrorWithResult)
        ));
    }

    #[test]
    fn response_null_id_allowed() {
        let wire = r#"{"v":1,"id":null,"result":null,"error":"INVALID_RPC"}"#;
        let resp = Response::decode(wire).unwrap();
        assert_eq!(resp.id, None);
        assert_eq!(resp.error, ErrorKind::InvalidRpc);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn validate_success_returns_result() {
        let frame = Response::success(1, json!({"sum": 5})).encode().unwrap();
        assert_eq!(validate_response(&frame, 1).unwrap(), json!({"sum": 5}));
    }

    #[test]
    fn validate_surfaces_error_kind() {
        let frame = Response::error(Some(1), ErrorKind::LockHeld).encode().unwrap();
        let err = validate_response(&frame, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockHeld);
    }

    #[test]
    fn validate_malformed_is_invalid_response() {
        let err = validate_response("{\"hello\":1}", 1).unwrap_err();
        assert!(matches!(err, ResponseError::Invalid(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn validate_detects_stale_reply() {
        let frame = Response::success(3, json!(1)).encode().unwrap();
        let err = validate_response(&frame, 4).unwrap_err();
        assert!(matches!(err, ResponseError::Stale { expected: 4, got: 3 }));
    }

    #[test]
    fn validate_accepts_anonymous_error() {
        let frame = Response::error(None, ErrorKind::InvalidRpc).encode().unwrap();
        let err = validate_response(&frame, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRpc);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Method descriptors
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn method_table_decodes() {
        let table = json!([
            {"name": "add", "signature": "(a, b)", "docstring": "Add two numbers."},
            {"name": "reset", "signature": "()", "docstring": ""},
        ]);
        let methods = decode_method_table(table).unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0], MethodDescriptor::new("add", "(a, b)", "Add two numbers."));
        assert_eq!(methods[0].to_string(), "add(a, b)");
    }

    #[test]
    fn method_table_rejects_wrong_shape() {
        assert!(decode_method_table(json!({"name": "add"})).is_err());
        assert!(decode_method_table(json!([{"name": "add"}])).is_err());
        assert!(decode_method_table(json!([1, 2])).is_err());
    }

    #[test]
    fn internal_address_is_deterministic() {
        assert_eq!(internal_address("calc"), "inproc://calc_worker");
        assert_eq!(internal_address("calc"), internal_address("calc"));
        assert_ne!(internal_address("calc"), internal_address("other"));
    }

    #[test]
    fn reserved_client_names() {
        assert!(is_reserved_client_name("available_methods"));
        assert!(is_reserved_client_name("close_this_thing"));
        assert!(!is_reserved_client_name("add"));
    }
}
