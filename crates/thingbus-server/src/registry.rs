//! Object registry — names, method tables and per-object lock state.
//!
//! The registry is owned by the broker loop and only mutated there, so it
//! needs no locking of its own. The exception is each object's
//! [`ObjectLock`], which is shared with the worker that owns the object.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use thingbus_protocol::{ErrorKind, MethodDescriptor, SERVER_TARGET, is_reserved_client_name};
use thingbus_transport::PeerId;
use tracing::info;

use crate::shareable::SharedObject;

/// Identity of a caller, as assigned by the transport.
pub type CallerId = PeerId;

/// Why an object could not be added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("object `{0}` already exists, use a different name")]
    DuplicateName(String),
    #[error("object `{0}` exposes no shared methods")]
    NoSharedMethods(String),
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    #[error("object `{object}` exposes `{method}`, which is reserved for the client proxy")]
    ReservedMethod { object: String, method: String },
    #[error("object `{object}` lists method `{method}` more than once")]
    DuplicateMethod { object: String, method: String },
    #[error("broker is not running")]
    Stopped,
}

/// A registered object's name and method table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lock state
// ─────────────────────────────────────────────────────────────────────────────

/// The caller currently inside an object's critical section, if any.
#[derive(Debug, Default)]
pub struct ObjectLock {
    holder: Mutex<Option<CallerId>>,
}

/// The lock is held by a different caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHeld;

impl ObjectLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `caller`. Returns whether it was newly taken; taking
    /// it again as the current holder succeeds without change.
    pub fn try_acquire(&self, caller: &CallerId) -> Result<bool, LockHeld> {
        let mut holder = self.holder.lock();
        match holder.as_ref() {
            None => {
                *holder = Some(caller.clone());
                Ok(true)
            }
            Some(current) if current == caller => Ok(false),
            Some(_) => Err(LockHeld),
        }
    }

    /// Release the lock if `caller` holds it. Returns whether it was released.
    pub fn release(&self, caller: &CallerId) -> bool {
        let mut holder = self.holder.lock();
        if holder.as_ref() == Some(caller) {
            *holder = None;
            true
        } else {
            false
        }
    }

    pub fn holder(&self) -> Option<CallerId> {
        self.holder.lock().clone()
    }

    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn is_held_by(&self, caller: &CallerId) -> bool {
        self.holder.lock().as_ref() == Some(caller)
    }

    /// Held, and not by `caller`.
    pub fn is_held_by_other(&self, caller: &CallerId) -> bool {
        matches!(self.holder.lock().as_ref(), Some(current) if current != caller)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct ObjectEntry {
    descriptor: ObjectDescriptor,
    exposed: HashSet<String>,
    lock: Arc<ObjectLock>,
}

/// Name → method table and lock state for every shared object.
#[derive(Default)]
pub struct Registry {
    objects: HashMap<String, ObjectEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `object` could be registered as `name` without registering it.
    pub fn validate(
        &self,
        name: &str,
        object: &dyn SharedObject,
    ) -> Result<Vec<MethodDescriptor>, RegistrationError> {
        if name.is_empty() || name == SERVER_TARGET {
            return Err(RegistrationError::InvalidName(name.to_string()));
        }
        if self.objects.contains_key(name) {
            return Err(RegistrationError::DuplicateName(name.to_string()));
        }

        let methods = object.method_table();
        if methods.is_empty() {
            return Err(RegistrationError::NoSharedMethods(name.to_string()));
        }

        let mut seen = HashSet::new();
        for method in &methods {
            if is_reserved_client_name(&method.name) {
                return Err(RegistrationError::ReservedMethod {
                    object: name.to_string(),
                    method: method.name.clone(),
                });
            }
            if !seen.insert(method.name.as_str()) {
                return Err(RegistrationError::DuplicateMethod {
                    object: name.to_string(),
                    method: method.name.clone(),
                });
            }
        }

        Ok(methods)
    }

    /// Add `object` under `name`. An existing entry is never replaced.
    pub fn register(
        &mut self,
        name: &str,
        object: &dyn SharedObject,
    ) -> Result<ObjectDescriptor, RegistrationError> {
        let methods = self.validate(name, object)?;

        let descriptor = ObjectDescriptor {
            name: name.to_string(),
            methods,
        };
        let exposed = descriptor.methods.iter().map(|m| m.name.clone()).collect();
        self.objects.insert(
            name.to_string(),
            ObjectEntry {
                descriptor: descriptor.clone(),
                exposed,
                lock: Arc::new(ObjectLock::new()),
            },
        );

        info!("Registered object {name} ({} methods)", descriptor.methods.len());
        Ok(descriptor)
    }

    pub fn lookup(&self, name: &str) -> Result<&ObjectDescriptor, ErrorKind> {
        self.entry(name).map(|e| &e.descriptor)
    }

    pub fn methods_of(&self, name: &str) -> Result<&[MethodDescriptor], ErrorKind> {
        self.entry(name).map(|e| e.descriptor.methods.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Whether `method` is exposed by object `name`.
    pub fn exposes(&self, name: &str, method: &str) -> bool {
        self.objects
            .get(name)
            .is_some_and(|e| e.exposed.contains(method))
    }

    /// Shared lock state of object `name`, handed to its worker.
    pub fn lock_of(&self, name: &str) -> Result<Arc<ObjectLock>, ErrorKind> {
        self.entry(name).map(|e| e.lock.clone())
    }

    /// Take object `name`'s lock for `caller`. Returns whether it was newly taken.
    pub fn try_acquire(&self, name: &str, caller: &CallerId) -> Result<bool, ErrorKind> {
        self.entry(name)?
            .lock
            .try_acquire(caller)
            .map_err(|LockHeld| ErrorKind::LockHeld)
    }

    /// Release object `name`'s lock if `caller` holds it. A no-op otherwise,
    /// including for unknown names.
    pub fn release(&self, name: &str, caller: &CallerId) -> bool {
        self.objects
            .get(name)
            .is_some_and(|e| e.lock.release(caller))
    }

    /// Same as [`release`](Self::release); used when cleaning up after a caller.
    pub fn release_if_holder(&self, name: &str, caller: &CallerId) -> bool {
        self.release(name, caller)
    }

    /// Release every lock `caller` holds. Returns the affected object names.
    pub fn release_all_held_by(&self, caller: &CallerId) -> Vec<String> {
        let mut released: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, e)| e.lock.release(caller))
            .map(|(name, _)| name.clone())
            .collect();
        released.sort();
        released
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.objects.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&ObjectEntry, ErrorKind> {
        self.objects.get(name).ok_or(ErrorKind::NoSuchThing)
    }
}
