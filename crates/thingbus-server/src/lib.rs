//! Thingbus Server — shares local objects with remote callers.
//!
//! The [`Broker`] binds the public endpoint and owns the routing table. Each
//! shared object gets a worker that executes its calls one at a
//! time, so objects need not be thread-safe. Objects opt in through a static
//! method table ([`Shareable`]), and methods may take part in a per-object
//! critical section ([`LockEffect`]).

pub mod broker;
pub mod registry;
pub mod shareable;
pub mod task;
mod worker;

pub use broker::{Broker, BrokerConfig, BrokerError};
pub use registry::{CallerId, ObjectDescriptor, ObjectLock, RegistrationError, Registry};
pub use shareable::{
    CallArgs, Invoke, LockEffect, MethodError, Shareable, SharedMethod, SharedObject, to_value,
};
pub use task::{Task, TaskHandle};
