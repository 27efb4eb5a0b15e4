//! Explicit per-type method tables for objects shared over the broker.
//!
//! A type opts in by implementing [`Shareable`] and listing the methods it
//! exposes in a static table. Nothing outside that table is callable remotely.
//!
//! ```ignore
//! struct Calculator;
//!
//! impl Calculator {
//!     fn add(&mut self, args: &CallArgs) -> Result<Value, MethodError> {
//!         let a: i64 = args.get(0, "a")?;
//!         let b: i64 = args.get(1, "b")?;
//!         Ok(json!(a + b))
//!     }
//! }
//!
//! impl Shareable for Calculator {
//!     fn shared_methods() -> &'static [SharedMethod<Self>] {
//!         static METHODS: &[SharedMethod<Calculator>] = &[
//!             SharedMethod::new("add", "(a, b)", "Add two numbers.", Calculator::add),
//!         ];
//!         METHODS
//!     }
//! }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thingbus_protocol::{Args, Kwargs, MethodDescriptor};

/// How a method takes part in its object's critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockEffect {
    /// No interaction with the lock.
    #[default]
    None,
    /// Enters the critical section; fails if another caller holds it.
    Acquires,
    /// Only callable by the current holder.
    Requires,
    /// Leaves the critical section after running successfully.
    Releases,
}

/// Adapter from decoded arguments to a concrete method.
pub type Invoke<T> = fn(&mut T, &CallArgs) -> Result<Value, MethodError>;

/// One entry of a [`Shareable`] type's method table.
pub struct SharedMethod<T> {
    pub name: &'static str,
    pub signature: &'static str,
    pub doc: &'static str,
    pub lock: LockEffect,
    pub invoke: Invoke<T>,
}

impl<T> SharedMethod<T> {
    pub const fn new(
        name: &'static str,
        signature: &'static str,
        doc: &'static str,
        invoke: Invoke<T>,
    ) -> Self {
        Self {
            name,
            signature,
            doc,
            lock: LockEffect::None,
            invoke,
        }
    }

    pub const fn acquires(self) -> Self {
        Self { lock: LockEffect::Acquires, ..self }
    }

    pub const fn requires(self) -> Self {
        Self { lock: LockEffect::Requires, ..self }
    }

    pub const fn releases(self) -> Self {
        Self { lock: LockEffect::Releases, ..self }
    }

    pub fn descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(self.name, self.signature, self.doc)
    }
}

/// A type whose methods can be exposed through the broker.
///
/// The table is built once per type; instances share it.
pub trait Shareable: Sized + Send + 'static {
    fn shared_methods() -> &'static [SharedMethod<Self>];
}

/// Object-safe view of a [`Shareable`], as owned by a worker.
pub trait SharedObject: Send {
    fn method_table(&self) -> Vec<MethodDescriptor>;
    /// `None` if the method is not exposed.
    fn lock_effect(&self, method: &str) -> Option<LockEffect>;
    fn invoke(&mut self, method: &str, args: &CallArgs) -> Result<Value, MethodError>;
}

impl<T: Shareable> SharedObject for T {
    fn method_table(&self) -> Vec<MethodDescriptor> {
        T::shared_methods().iter().map(SharedMethod::descriptor).collect()
    }

    fn lock_effect(&self, method: &str) -> Option<LockEffect> {
        T::shared_methods()
            .iter()
            .find(|m| m.name == method)
            .map(|m| m.lock)
    }

    fn invoke(&mut self, method: &str, args: &CallArgs) -> Result<Value, MethodError> {
        let entry = T::shared_methods()
            .iter()
            .find(|m| m.name == method)
            .ok_or_else(|| MethodError::UnknownMethod(method.to_string()))?;
        (entry.invoke)(self, args)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Args,
    pub kwargs: Kwargs,
}

impl CallArgs {
    pub fn new(args: Args, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// Parameter `name` at position `index`, given either positionally or by keyword.
    pub fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, MethodError> {
        self.get_opt(index, name)?
            .ok_or_else(|| MethodError::MissingArgument(name.to_string()))
    }

    /// Like [`get`](Self::get) but a missing argument is `None`.
    pub fn get_opt<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, MethodError> {
        let value = match (self.args.get(index), self.kwargs.get(name)) {
            (Some(_), Some(_)) => return Err(MethodError::DuplicateArgument(name.to_string())),
            (Some(v), None) | (None, Some(v)) => v,
            (None, None) => return Ok(None),
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| MethodError::InvalidArgument {
                name: name.to_string(),
                source,
            })
    }

    pub fn len(&self) -> usize {
        self.args.len() + self.kwargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize a method's return value.
pub fn to_value<T: Serialize>(value: T) -> Result<Value, MethodError> {
    serde_json::to_value(value).map_err(|e| MethodError::Failed(e.into()))
}

/// Failure of a shared method. Logged by the worker; the caller only sees
/// `METHOD_EXCEPTION`.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("missing argument `{0}`")]
    MissingArgument(String),
    #[error("invalid argument `{name}`: {source}")]
    InvalidArgument {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("argument `{0}` given both positionally and by keyword")]
    DuplicateArgument(String),
    #[error("unknown method `{0}`")]
    UnknownMethod(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i64,
    }

    impl Counter {
        fn bump(&mut self, args: &CallArgs) -> Result<Value, MethodError> {
            let by: i64 = args.get_opt(0, "by")?.unwrap_or(1);
            self.value += by;
            Ok(json!(self.value))
        }

        fn open(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Ok(Value::Null)
        }

        fn fail(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
            Err(anyhow::anyhow!("counter jammed").into())
        }
    }

    impl Shareable for Counter {
        fn shared_methods() -> &'static [SharedMethod<Self>] {
            static METHODS: &[SharedMethod<Counter>] = &[
                SharedMethod::new("bump", "(by=1)", "Increment.", Counter::bump),
                SharedMethod::new("open", "()", "", Counter::open).acquires(),
                SharedMethod::new("fail", "()", "Always fails.", Counter::fail),
            ];
            METHODS
        }
    }

    #[test]
    fn table_describes_exposed_methods_only() {
        let counter = Counter::default();
        let table = counter.method_table();
        let names: Vec<_> = table.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["bump", "open", "fail"]);
        assert_eq!(table[0].signature, "(by=1)");
        assert_eq!(counter.lock_effect("open"), Some(LockEffect::Acquires));
        assert_eq!(counter.lock_effect("bump"), Some(LockEffect::None));
        assert_eq!(counter.lock_effect("value"), None);
    }

    #[test]
    fn invoke_dispatches_through_table() {
        let mut counter = Counter::default();
        let out = counter.invoke("bump", &CallArgs::new(vec![json!(5)], Map::new())).unwrap();
        assert_eq!(out, json!(5));

        let mut kwargs = Map::new();
        kwargs.insert("by".into(), json!(2));
        let out = counter.invoke("bump", &CallArgs::new(vec![], kwargs)).unwrap();
        assert_eq!(out, json!(7));

        let out = counter.invoke("bump", &CallArgs::default()).unwrap();
        assert_eq!(out, json!(8));
    }

    #[test]
    fn invoke_reports_failures() {
        let mut counter = Counter::default();
        assert!(matches!(
            counter.invoke("nope", &CallArgs::default()),
            Err(MethodError::UnknownMethod(_))
        ));
        assert!(matches!(
            counter.invoke("fail", &CallArgs::default()),
            Err(MethodError::Failed(_))
        ));
        assert!(matches!(
            counter.invoke("bump", &CallArgs::new(vec![json!("x")], Map::new())),
            Err(MethodError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn argument_given_twice_rejected() {
        let mut kwargs = Map::new();
        kwargs.insert("by".into(), json!(1));
        let args = CallArgs::new(vec![json!(1)], kwargs);
        assert!(matches!(
            args.get::<i64>(0, "by"),
            Err(MethodError::DuplicateArgument(_))
        ));
    }

    #[test]
    fn missing_required_argument() {
        let args = CallArgs::default();
        assert!(matches!(args.get::<i64>(0, "a"), Err(MethodError::MissingArgument(_))));
        assert!(args.is_empty());
    }
}
