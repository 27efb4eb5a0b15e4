//! Broker — binds the public endpoint and routes calls to per-object workers.
//!
//! All routing decisions happen on one task (the broker loop). New objects
//! are handed to that loop over a channel and added between polling cycles,
//! so a request is never routed to a half-registered object.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use thingbus_protocol::{
    Call, ErrorKind, GET_OBJECT_METHODS, RELEASE_LOCK_IF_ANY, Response, internal_address,
};
use thingbus_transport::{
    Endpoint, HealthProbe, RouterEndpoint, RouterEvent, TransportConfig, TransportError,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::{CallerId, ObjectDescriptor, RegistrationError, Registry};
use crate::shareable::{Shareable, SharedObject};
use crate::task::{self, Task, TaskHandle};
use crate::worker::{Job, Worker, WorkerReply};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Public endpoint to bind (port 0 for OS-assigned)
    pub endpoint: Endpoint,
    /// Upper bound on each wait in the broker and worker loops
    pub poll_interval: Duration,
    /// Maximum concurrent client connections
    pub max_connections: Option<usize>,
    /// Largest accepted request frame in bytes
    pub max_frame_bytes: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            endpoint: Endpoint::new(transport.hostname, transport.port),
            poll_interval: Duration::from_millis(10),
            max_connections: transport.max_connections,
            max_frame_bytes: transport.max_frame_bytes,
        }
    }
}

impl BrokerConfig {
    pub fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Requests from [`Broker`] handles to the broker loop.
enum Control {
    Register {
        name: String,
        object: Box<dyn SharedObject>,
        reply: oneshot::Sender<Result<ObjectDescriptor, RegistrationError>>,
    },
    ListObjects(oneshot::Sender<Vec<String>>),
}

/// Handle to a running broker.
pub struct Broker {
    control: Option<mpsc::UnboundedSender<Control>>,
    task: Option<TaskHandle>,
    cancel: CancellationToken,
    local_addr: SocketAddr,
}

impl Broker {
    /// Bind the public endpoint and start the broker loop.
    pub async fn start(config: BrokerConfig) -> Result<Self, BrokerError> {
        let object_count = Arc::new(AtomicUsize::new(0));
        let probe: HealthProbe = {
            let object_count = object_count.clone();
            Arc::new(move || json!({ "objects": object_count.load(Ordering::Relaxed) }))
        };

        let transport = TransportConfig {
            max_connections: config.max_connections,
            max_frame_bytes: config.max_frame_bytes,
            ..TransportConfig::from(&config.endpoint)
        };
        let (endpoint, events) = RouterEndpoint::bind(transport, Some(probe)).await?;
        let local_addr = endpoint.local_addr();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (replies_tx, replies_rx) = mpsc::channel(1024);

        let broker_loop = BrokerLoop {
            endpoint,
            events,
            control: control_rx,
            replies_tx,
            replies_rx,
            registry: Registry::new(),
            routes: HashMap::new(),
            poll_interval: config.poll_interval,
            object_count,
        };

        let cancel = CancellationToken::new();
        let task = task::spawn(broker_loop, cancel.clone());
        info!("Broker serving on tcp://{local_addr}");

        Ok(Self {
            control: Some(control_tx),
            task: Some(task),
            cancel,
            local_addr,
        })
    }

    /// Address the public endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Public endpoint for clients to connect to.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.local_addr.ip().to_string(), self.local_addr.port())
    }

    /// Share `object` under `name`.
    ///
    /// Returns once the object is visible to routing and discovery.
    pub async fn add_object<T: Shareable>(
        &self,
        name: impl Into<String>,
        object: T,
    ) -> Result<ObjectDescriptor, RegistrationError> {
        self.add_boxed(name, Box::new(object)).await
    }

    /// [`add_object`](Self::add_object) for an already type-erased object.
    pub async fn add_boxed(
        &self,
        name: impl Into<String>,
        object: Box<dyn SharedObject>,
    ) -> Result<ObjectDescriptor, RegistrationError> {
        let name = name.into();
        if object.method_table().is_empty() {
            return Err(RegistrationError::NoSharedMethods(name));
        }

        let control = self.control.as_ref().ok_or(RegistrationError::Stopped)?;
        let (reply, rx) = oneshot::channel();
        info!("Adding object {name}");
        control
            .send(Control::Register { name, object, reply })
            .map_err(|_| RegistrationError::Stopped)?;

        rx.await.unwrap_or(Err(RegistrationError::Stopped))
    }

    /// Names of all registered objects, sorted.
    pub async fn object_names(&self) -> Vec<String> {
        let Some(control) = self.control.as_ref() else {
            return Vec::new();
        };
        let (tx, rx) = oneshot::channel();
        if control.send(Control::ListObjects(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop accepting registrations, let every worker finish its in-flight
    /// call, then close the public endpoint.
    pub async fn stop(&mut self) {
        self.control = None;
        if let Some(task) = self.task.take() {
            task.stop().await;
            info!("Broker stopped");
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Broker loop
// ─────────────────────────────────────────────────────────────────────────────

/// Routing state for one registered object. Owned by the broker loop.
struct Route {
    address: String,
    dispatch: mpsc::UnboundedSender<Job>,
    worker: TaskHandle,
}

struct BrokerLoop {
    endpoint: RouterEndpoint,
    events: mpsc::Receiver<RouterEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    replies_tx: mpsc::Sender<WorkerReply>,
    replies_rx: mpsc::Receiver<WorkerReply>,
    registry: Registry,
    routes: HashMap<String, Route>,
    poll_interval: Duration,
    object_count: Arc<AtomicUsize>,
}

impl BrokerLoop {
    /// Apply every pending control request.
    fn drain_control(&mut self) {
        while let Ok(request) = self.control.try_recv() {
            match request {
                Control::Register { name, object, reply } => {
                    let result = self.register(&name, object);
                    if let Err(e) = &result {
                        warn!("Registration of {name} failed: {e}");
                    }
                    let _ = reply.send(result);
                }
                Control::ListObjects(reply) => {
                    let _ = reply.send(self.registry.names());
                }
            }
        }
    }

    /// Registry entry, worker and route are created together.
    fn register(
        &mut self,
        name: &str,
        object: Box<dyn SharedObject>,
    ) -> Result<ObjectDescriptor, RegistrationError> {
        let descriptor = self.registry.register(name, object.as_ref())?;
        let lock = self
            .registry
            .lock_of(name)
            .map_err(|_| RegistrationError::Stopped)?;

        let (dispatch, jobs) = mpsc::unbounded_channel();
        let worker = Worker::new(
            name,
            object,
            lock,
            jobs,
            self.replies_tx.clone(),
            self.poll_interval,
        );
        let worker = task::spawn(worker, CancellationToken::new());

        self.routes.insert(
            name.to_string(),
            Route {
                address: internal_address(name),
                dispatch,
                worker,
            },
        );
        self.object_count.store(self.registry.len(), Ordering::Relaxed);
        Ok(descriptor)
    }

    fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::Connected(peer) => debug!("Client connected: {peer}"),
            RouterEvent::Message { peer, frame } => self.route(peer, frame),
            RouterEvent::Disconnected(peer) => {
                for name in self.registry.release_all_held_by(&peer) {
                    info!("Released lock on {name} held by disconnected client {peer}");
                }
                debug!("Client disconnected: {peer}");
            }
        }
    }

    /// Route one inbound request. Every path either replies directly or
    /// forwards to exactly one worker.
    fn route(&mut self, peer: CallerId, frame: String) {
        let call = match Call::decode(&frame) {
            Ok(call) => call,
            Err(e) => {
                warn!("Received invalid call from {peer}: {e}");
                self.reply(&peer, Response::error(None, ErrorKind::InvalidRpc));
                return;
            }
        };

        if call.is_server_call() {
            let response = self.handle_server_call(&peer, &call);
            self.reply(&peer, response);
            return;
        }

        let Some(route) = self.routes.get(&call.target) else {
            warn!("Received call for unknown object: {}", call.target);
            self.reply(&peer, Response::error(Some(call.id), ErrorKind::NoSuchThing));
            return;
        };

        if !self.registry.exposes(&call.target, &call.method) {
            warn!("Received call for unknown method: {}.{}", call.target, call.method);
            self.reply(&peer, Response::error(Some(call.id), ErrorKind::NoSuchMethod));
            return;
        }

        debug!("Dispatching {}.{} to {}", call.target, call.method, route.address);
        let job = Job {
            caller: peer.clone(),
            frame,
        };
        if route.dispatch.send(job).is_err() {
            error!("Worker {} is gone; dropping call {}", route.address, call.id);
            self.reply(&peer, Response::error(Some(call.id), ErrorKind::MethodException));
        }
    }

    /// Calls addressed to `_server`, answered without involving a worker.
    fn handle_server_call(&self, peer: &CallerId, call: &Call) -> Response {
        match call.method.as_str() {
            GET_OBJECT_METHODS => {
                let Some(name) = call.object_name_arg() else {
                    warn!("{GET_OBJECT_METHODS} without an object name from {peer}");
                    return Response::error(Some(call.id), ErrorKind::InvalidRpc);
                };
                match self.registry.methods_of(name) {
                    Ok(methods) => match serde_json::to_value(methods) {
                        Ok(table) => Response::success(call.id, table),
                        Err(e) => {
                            error!("Failed to encode method table of {name}: {e}");
                            Response::error(Some(call.id), ErrorKind::MethodException)
                        }
                    },
                    Err(kind) => {
                        warn!("No such object: {name}");
                        Response::error(Some(call.id), kind)
                    }
                }
            }
            RELEASE_LOCK_IF_ANY => {
                if let Some(name) = call.object_name_arg() {
                    if self.registry.release_if_holder(name, peer) {
                        info!("Lock on {name} released by {peer}");
                    }
                }
                Response::success(call.id, Value::Null)
            }
            other => {
                warn!("Received call for unknown server method: {other}");
                Response::error(Some(call.id), ErrorKind::NoSuchMethod)
            }
        }
    }

    fn reply(&self, peer: &CallerId, response: Response) {
        match response.encode() {
            Ok(frame) => {
                self.endpoint.send(peer, frame);
            }
            Err(e) => error!("Failed to encode response for {peer}: {e}"),
        }
    }

    /// Pass a worker's reply on verbatim. If the requester is gone, any lock
    /// that reply may have granted it is released.
    fn forward_reply(&self, reply: WorkerReply) {
        if !self.endpoint.send(&reply.caller, reply.frame) {
            debug!("Requester {} gone before reply from {}", reply.caller, reply.object);
            if self.registry.release_if_holder(&reply.object, &reply.caller) {
                info!(
                    "Released lock on {} held by disconnected client {}",
                    reply.object, reply.caller
                );
            }
        }
    }
}

impl Task for BrokerLoop {
    fn name(&self) -> &str {
        "broker"
    }

    async fn step(&mut self, cancel: &CancellationToken) {
        self.drain_control();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            Some(reply) = self.replies_rx.recv() => self.forward_reply(reply),
            Some(event) = self.events.recv() => self.handle_event(event),
            _ = tokio::time::sleep(self.poll_interval) => {}
        }
    }

    async fn teardown(&mut self) {
        info!("Broker stopping ({} objects)", self.registry.len());

        self.control.close();
        while let Ok(request) = self.control.try_recv() {
            match request {
                Control::Register { reply, .. } => {
                    let _ = reply.send(Err(RegistrationError::Stopped));
                }
                Control::ListObjects(reply) => {
                    let _ = reply.send(self.registry.names());
                }
            }
        }

        for route in self.routes.values() {
            route.worker.cancel();
        }
        for (_, route) in self.routes.drain() {
            route.worker.join().await;
        }

        // Replies of calls that were in flight when the workers stopped.
        while let Ok(reply) = self.replies_rx.try_recv() {
            self.forward_reply(reply);
        }

        self.endpoint.stop().await;
    }
}
