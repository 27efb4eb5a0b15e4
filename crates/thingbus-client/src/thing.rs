//! The `Thing` proxy.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thingbus_protocol::{
    Args, Call, GET_OBJECT_METHODS, Kwargs, MethodDescriptor, RELEASE_LOCK_IF_ANY, ResponseError,
    SERVER_TARGET, decode_method_table, is_reserved_client_name, validate_response,
};
use thingbus_transport::{Endpoint, RequestSocket};
use tracing::{debug, info};

use crate::error::ClientError;

/// Client proxy configuration.
#[derive(Debug, Clone)]
pub struct ThingConfig {
    /// How long a call waits for its response (also bounds connecting)
    pub request_timeout: Duration,
}

impl Default for ThingConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
        }
    }
}

/// A remote object, or *thing*, whose methods can be called.
///
/// ```ignore
/// let mut calc = Thing::connect("calc", "tcp://127.0.0.1:6555", ThingConfig::default()).await?;
/// let sum = calc.call_args("add", vec![json!(2), json!(3)]).await?;
/// assert_eq!(sum, json!(5));
/// calc.close_this_thing().await?;
/// ```
pub struct Thing {
    name: String,
    socket: Option<RequestSocket>,
    config: ThingConfig,
    methods: Vec<MethodDescriptor>,
    next_id: u64,
}

impl Thing {
    /// Connect to the broker at `address` and fetch the method table of `name`.
    pub async fn connect(
        name: impl Into<String>,
        address: &str,
        config: ThingConfig,
    ) -> Result<Self, ClientError> {
        let endpoint: Endpoint = address.parse()?;
        Self::connect_to(name, &endpoint, config).await
    }

    pub async fn connect_to(
        name: impl Into<String>,
        endpoint: &Endpoint,
        config: ThingConfig,
    ) -> Result<Self, ClientError> {
        let name = name.into();
        info!("Connecting to thingbus server at {endpoint}...");

        let socket = tokio::time::timeout(config.request_timeout, RequestSocket::connect(endpoint))
            .await
            .map_err(|_| ClientError::Timeout)??;

        let mut thing = Self {
            name,
            socket: Some(socket),
            config,
            methods: Vec::new(),
            next_id: 1,
        };

        let name_arg = Value::from(thing.name.as_str());
        let table = thing
            .rpc(SERVER_TARGET, GET_OBJECT_METHODS, vec![name_arg], Kwargs::new())
            .await?;
        let methods = decode_method_table(table).map_err(|e| match e {
            ResponseError::Invalid(e) => ClientError::InvalidResponse(e),
            other => ClientError::Remote(other.kind()),
        })?;

        for method in &methods {
            if is_reserved_client_name(&method.name) {
                return Err(ClientError::ReservedName(method.name.clone()));
            }
            debug!("Adding method {method}");
        }

        thing.methods = methods;
        Ok(thing)
    }

    /// Name of the remote object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The remote object's methods, as fetched at connect time.
    pub fn available_methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    /// Call `method` on the remote object and return its result.
    pub async fn call(
        &mut self,
        method: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, ClientError> {
        let target = self.name.clone();
        self.rpc(&target, method, args, kwargs).await
    }

    /// [`call`](Self::call) with positional arguments only.
    pub async fn call_args(&mut self, method: &str, args: Args) -> Result<Value, ClientError> {
        self.call(method, args, Kwargs::new()).await
    }

    /// [`call`](Self::call), decoding the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<T, ClientError> {
        let value = self.call(method, args, kwargs).await?;
        serde_json::from_value(value).map_err(ClientError::ResultType)
    }

    /// Release any lock this connection holds on the object, then close the
    /// connection. Closing twice is an error.
    pub async fn close_this_thing(&mut self) -> Result<(), ClientError> {
        if self.socket.is_none() {
            return Err(ClientError::AlreadyClosed);
        }

        info!("Closing connection to thingbus server");
        let name = Value::from(self.name.as_str());
        let released = self
            .rpc(SERVER_TARGET, RELEASE_LOCK_IF_ANY, vec![name], Kwargs::new())
            .await;

        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close().await {
                debug!("Error while closing connection: {e}");
            }
        }

        released.map(|_| ())
    }

    /// Send one call and wait for its response until the request timeout.
    ///
    /// Responses to earlier, timed-out calls are skipped; they never count as
    /// the answer to this one.
    async fn rpc(
        &mut self,
        target: &str,
        method: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Value, ClientError> {
        let socket = self.socket.as_mut().ok_or(ClientError::Closed)?;

        let id = self.next_id;
        self.next_id += 1;

        let frame = Call::new(id, target, method, args, kwargs)
            .encode()
            .map_err(ClientError::Encode)?;
        socket.send(frame).await?;

        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, socket.recv())
                .await
                .map_err(|_| ClientError::Timeout)??;

            match validate_response(&frame, id) {
                Ok(value) => return Ok(value),
                Err(ResponseError::Stale { got, .. }) => {
                    debug!("Discarding late response to request {got}");
                }
                Err(ResponseError::Remote(kind)) => return Err(ClientError::Remote(kind)),
                Err(ResponseError::Invalid(e)) => return Err(ClientError::InvalidResponse(e)),
            }
        }
    }
}
