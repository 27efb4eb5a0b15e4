//! Per-object worker — executes calls against one shared object, one at a time.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thingbus_protocol::{Call, ErrorKind, Response, internal_address};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::{CallerId, ObjectLock};
use crate::shareable::{CallArgs, LockEffect, SharedObject};
use crate::task::Task;

/// A call forwarded by the broker: the requester and the raw request frame.
#[derive(Debug)]
pub(crate) struct Job {
    pub caller: CallerId,
    pub frame: String,
}

/// A worker's answer to a [`Job`], routed back to `caller` verbatim.
#[derive(Debug)]
pub(crate) struct WorkerReply {
    pub object: String,
    pub caller: CallerId,
    pub frame: String,
}

/// Owns one shared object and serializes every call against it.
pub(crate) struct Worker {
    name: String,
    address: String,
    /// Taken while a call runs on the blocking pool; `None` afterwards only if
    /// that execution was lost.
    object: Option<Box<dyn SharedObject>>,
    lock: Arc<ObjectLock>,
    jobs: mpsc::UnboundedReceiver<Job>,
    replies: mpsc::Sender<WorkerReply>,
    poll_interval: Duration,
    served: u64,
}

impl Worker {
    pub fn new(
        name: &str,
        object: Box<dyn SharedObject>,
        lock: Arc<ObjectLock>,
        jobs: mpsc::UnboundedReceiver<Job>,
        replies: mpsc::Sender<WorkerReply>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            address: internal_address(name),
            object: Some(object),
            lock,
            jobs,
            replies,
            poll_interval,
            served: 0,
        }
    }

    /// Run one forwarded call to completion and build its response.
    async fn execute(&mut self, caller: &CallerId, frame: &str) -> Response {
        let call = match Call::decode(frame) {
            Ok(call) => call,
            Err(e) => {
                warn!("Worker {} received invalid call: {e}", self.address);
                return Response::error(None, ErrorKind::InvalidRpc);
            }
        };

        if call.target != self.name {
            warn!("Worker {} received call for {}", self.address, call.target);
            return Response::error(Some(call.id), ErrorKind::NoSuchThing);
        }

        let effect = match self.object.as_ref().and_then(|o| o.lock_effect(&call.method)) {
            Some(effect) => effect,
            None => {
                warn!("Worker {} has no method {}", self.address, call.method);
                return Response::error(Some(call.id), ErrorKind::NoSuchMethod);
            }
        };

        let newly_acquired = match effect {
            LockEffect::None => false,
            LockEffect::Acquires => match self.lock.try_acquire(caller) {
                Ok(newly) => newly,
                Err(_) => {
                    debug!("{}.{} refused: lock held", self.name, call.method);
                    return Response::error(Some(call.id), ErrorKind::LockHeld);
                }
            },
            LockEffect::Requires => {
                if !self.lock.is_held_by(caller) {
                    debug!("{}.{} refused: caller does not hold the lock", self.name, call.method);
                    return Response::error(Some(call.id), ErrorKind::LockHeld);
                }
                false
            }
            LockEffect::Releases => {
                if self.lock.is_held_by_other(caller) {
                    debug!("{}.{} refused: lock held", self.name, call.method);
                    return Response::error(Some(call.id), ErrorKind::LockHeld);
                }
                false
            }
        };

        let method = call.method.clone();
        match self.invoke(method, CallArgs::new(call.args, call.kwargs)).await {
            Ok(value) => {
                if effect == LockEffect::Releases && self.lock.release(caller) {
                    debug!("{} lock released by {caller}", self.name);
                }
                if newly_acquired {
                    debug!("{} lock acquired by {caller}", self.name);
                }
                Response::success(call.id, value)
            }
            Err(detail) => {
                error!("Error executing {}.{}: {detail}", self.name, call.method);
                if newly_acquired {
                    self.lock.release(caller);
                }
                Response::error(Some(call.id), ErrorKind::MethodException)
            }
        }
    }

    /// Call `method` on the blocking pool. Errors and panics both come back as
    /// a description for the log.
    async fn invoke(&mut self, method: String, args: CallArgs) -> Result<Value, String> {
        let Some(mut object) = self.object.take() else {
            return Err(format!("object {} is no longer available", self.name));
        };

        let joined = tokio::task::spawn_blocking(move || {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| object.invoke(&method, &args)));
            (object, outcome)
        })
        .await;

        match joined {
            Ok((object, outcome)) => {
                self.object = Some(object);
                match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(format!("{e:#}")),
                    Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
                }
            }
            Err(e) => Err(format!("execution task failed: {e}")),
        }
    }
}

impl Task for Worker {
    fn name(&self) -> &str {
        &self.address
    }

    async fn setup(&mut self) {
        debug!("Worker {} started", self.address);
    }

    async fn step(&mut self, cancel: &CancellationToken) {
        let job = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.poll_interval) => return,
            job = self.jobs.recv() => job,
        };

        let Some(job) = job else {
            // The broker dropped our channel; nothing more will arrive.
            cancel.cancel();
            return;
        };

        let response = self.execute(&job.caller, &job.frame).await;
        self.served += 1;

        let frame = match response.encode() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Worker {} failed to encode response: {e}", self.address);
                match Response::error(response.id, ErrorKind::MethodException).encode() {
                    Ok(frame) => frame,
                    Err(_) => return,
                }
            }
        };

        let reply = WorkerReply {
            object: self.name.clone(),
            caller: job.caller,
            frame,
        };
        if self.replies.send(reply).await.is_err() {
            debug!("Worker {} reply dropped: broker gone", self.address);
        }
    }

    async fn teardown(&mut self) {
        info!("Worker {} stopped after {} calls", self.address, self.served);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
