//! Registry and lock-state tests.

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use thingbus_protocol::ErrorKind;
    use thingbus_server::{
        CallArgs, CallerId, MethodError, ObjectLock, RegistrationError, Registry, Shareable,
        SharedMethod,
    };

    struct Door;

    impl Door {
        fn open(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Ok(json!("open"))
        }

        fn close(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Ok(json!("closed"))
        }
    }

    impl Shareable for Door {
        fn shared_methods() -> &'static [SharedMethod<Self>] {
            static METHODS: &[SharedMethod<Door>] = &[
                SharedMethod::new("open", "()", "Open the door.", Door::open).acquires(),
                SharedMethod::new("close", "()", "Close the door.", Door::close).releases(),
            ];
            METHODS
        }
    }

    struct Empty;

    impl Shareable for Empty {
        fn shared_methods() -> &'static [SharedMethod<Self>] {
            &[]
        }
    }

    struct Greedy;

    impl Greedy {
        fn noop(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Ok(Value::Null)
        }
    }

    impl Shareable for Greedy {
        fn shared_methods() -> &'static [SharedMethod<Self>] {
            static METHODS: &[SharedMethod<Greedy>] = &[
                SharedMethod::new("ping", "()", "", Greedy::noop),
                SharedMethod::new("close_this_thing", "()", "", Greedy::noop),
            ];
            METHODS
        }
    }

    struct Twice;

    impl Twice {
        fn noop(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Ok(Value::Null)
        }
    }

    impl Shareable for Twice {
        fn shared_methods() -> &'static [SharedMethod<Self>] {
            static METHODS: &[SharedMethod<Twice>] = &[
                SharedMethod::new("ping", "()", "", Twice::noop),
                SharedMethod::new("ping", "(x)", "", Twice::noop),
            ];
            METHODS
        }
    }

    fn caller(id: &str) -> CallerId {
        CallerId::from(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn register_and_lookup() {
        let mut registry = Registry::new();
        let descriptor = registry.register("door", &Door).unwrap();

        assert_eq!(descriptor.name, "door");
        assert_eq!(descriptor.methods.len(), 2);
        assert_eq!(descriptor.methods[0].name, "open");
        assert_eq!(descriptor.methods[0].docstring, "Open the door.");

        assert!(registry.contains("door"));
        assert!(registry.exposes("door", "open"));
        assert!(!registry.exposes("door", "paint"));
        assert!(!registry.exposes("window", "open"));
        assert_eq!(registry.lookup("door").unwrap(), &descriptor);
        assert_eq!(registry.methods_of("door").unwrap(), descriptor.methods.as_slice());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_object_is_no_such_thing() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.lookup("door").unwrap_err(), ErrorKind::NoSuchThing);
        assert_eq!(registry.methods_of("door").unwrap_err(), ErrorKind::NoSuchThing);
        assert_eq!(
            registry.try_acquire("door", &caller("a")).unwrap_err(),
            ErrorKind::NoSuchThing
        );
    }

    #[test]
    fn duplicate_name_keeps_first() {
        let mut registry = Registry::new();
        let first = registry.register("door", &Door).unwrap();

        let err = registry.register("door", &Door).unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateName("door".into()));
        assert_eq!(registry.lookup("door").unwrap(), &first);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_method_table_rejected() {
        let mut registry = Registry::new();
        let err = registry.register("empty", &Empty).unwrap_err();
        assert_eq!(err, RegistrationError::NoSharedMethods("empty".into()));
        assert!(!registry.contains("empty"));
    }

    #[test]
    fn reserved_method_rejected() {
        let mut registry = Registry::new();
        let err = registry.register("greedy", &Greedy).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::ReservedMethod {
                object: "greedy".into(),
                method: "close_this_thing".into(),
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_method_rejected() {
        let mut registry = Registry::new();
        let err = registry.register("twice", &Twice).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateMethod { method, .. } if method == "ping"));
    }

    #[test]
    fn invalid_names_rejected() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.register("", &Door).unwrap_err(),
            RegistrationError::InvalidName(String::new())
        );
        assert_eq!(
            registry.register("_server", &Door).unwrap_err(),
            RegistrationError::InvalidName("_server".into())
        );
    }

    #[test]
    fn validate_does_not_register() {
        let registry = Registry::new();
        let methods = registry.validate("door", &Door).unwrap();
        assert_eq!(methods.len(), 2);
        assert!(!registry.contains("door"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = Registry::new();
        registry.register("zebra", &Door).unwrap();
        registry.register("alpha", &Door).unwrap();
        registry.register("mid", &Door).unwrap();
        assert_eq!(registry.names(), vec!["alpha", "mid", "zebra"]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lock state
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn lock_is_exclusive_and_reentrant() {
        let lock = ObjectLock::new();
        let a = caller("a");
        let b = caller("b");

        assert!(!lock.is_held());
        assert_eq!(lock.try_acquire(&a), Ok(true));
        assert_eq!(lock.try_acquire(&a), Ok(false));
        assert!(lock.try_acquire(&b).is_err());

        assert!(lock.is_held_by(&a));
        assert!(lock.is_held_by_other(&b));
        assert!(!lock.is_held_by_other(&a));
        assert_eq!(lock.holder(), Some(a.clone()));
    }

    #[test]
    fn release_only_by_holder() {
        let lock = ObjectLock::new();
        let a = caller("a");
        let b = caller("b");

        assert!(!lock.release(&a));
        lock.try_acquire(&a).unwrap();
        assert!(!lock.release(&b));
        assert!(lock.is_held_by(&a));

        assert!(lock.release(&a));
        assert!(!lock.release(&a));
        assert_eq!(lock.holder(), None);
        assert_eq!(lock.try_acquire(&b), Ok(true));
    }

    #[test]
    fn registry_lock_is_shared_with_handle() {
        let mut registry = Registry::new();
        registry.register("door", &Door).unwrap();
        let lock = registry.lock_of("door").unwrap();

        let a = caller("a");
        assert_eq!(registry.try_acquire("door", &a), Ok(true));
        assert!(lock.is_held_by(&a));
        assert_eq!(registry.try_acquire("door", &caller("b")), Err(ErrorKind::LockHeld));

        assert!(registry.release_if_holder("door", &a));
        assert!(!lock.is_held());
    }

    #[test]
    fn release_of_unknown_object_is_noop() {
        let registry = Registry::new();
        assert!(!registry.release("ghost", &caller("a")));
        assert!(!registry.release_if_holder("ghost", &caller("a")));
    }

    #[test]
    fn release_all_held_by_caller() {
        let mut registry = Registry::new();
        for name in ["front", "back", "side"] {
            registry.register(name, &Door).unwrap();
        }
        let a = caller("a");
        let b = caller("b");
        registry.try_acquire("front", &a).unwrap();
        registry.try_acquire("back", &a).unwrap();
        registry.try_acquire("side", &b).unwrap();

        assert_eq!(registry.release_all_held_by(&a), vec!["back", "front"]);
        assert!(registry.release_all_held_by(&a).is_empty());
        assert!(registry.lock_of("side").unwrap().is_held_by(&b));
        assert_eq!(registry.try_acquire("front", &b), Ok(true));
    }
}
