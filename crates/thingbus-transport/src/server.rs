//! Router endpoint using Axum WebSockets.
//!
//! Each accepted connection is assigned a [`PeerId`]. Inbound text frames are
//! handed to the owner of the endpoint as [`RouterEvent::Message`] tagged with
//! that identity, and [`RouterEndpoint::send`] routes a frame back to a single
//! peer. Connects and disconnects are reported as events too, so the owner can
//! clean up per-peer state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Identity of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that happened on the router endpoint.
#[derive(Debug)]
pub enum RouterEvent {
    Connected(PeerId),
    Message { peer: PeerId, frame: String },
    Disconnected(PeerId),
}

/// Extra fields merged into the `/health` report.
pub type HealthProbe = Arc<dyn Fn() -> serde_json::Value + Send + Sync>;

/// Router endpoint configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Largest accepted frame in bytes
    pub max_frame_bytes: usize,
    /// Capacity of the inbound event queue
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 6555,
            hostname: "127.0.0.1".into(),
            max_connections: Some(64),
            max_frame_bytes: 16 * 1024 * 1024,
            event_buffer: 1024,
        }
    }
}

impl From<&Endpoint> for TransportConfig {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            port: endpoint.port,
            hostname: endpoint.host.clone(),
            ..Self::default()
        }
    }
}

type PeerTable = DashMap<PeerId, mpsc::UnboundedSender<String>>;

/// Shared state for the endpoint's connection handlers.
struct AppState {
    config: TransportConfig,
    peers: Arc<PeerTable>,
    events: mpsc::Sender<RouterEvent>,
    client_count: AtomicUsize,
    probe: Option<HealthProbe>,
}

/// The public endpoint of a broker.
pub struct RouterEndpoint {
    peers: Arc<PeerTable>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
}

impl RouterEndpoint {
    /// Bind the endpoint. Returns the endpoint and the stream of its events.
    pub async fn bind(
        config: TransportConfig,
        probe: Option<HealthProbe>,
    ) -> Result<(Self, mpsc::Receiver<RouterEvent>), TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let peers = Arc::new(PeerTable::new());

        let addr = Endpoint::new(config.hostname.clone(), config.port).bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let state = Arc::new(AppState {
            config,
            peers: peers.clone(),
            events: events_tx,
            client_count: AtomicUsize::new(0),
            probe,
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        info!("Router endpoint listening on ws://{local_addr}/ws");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok((
            Self {
                peers,
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
                local_addr,
            },
            events_rx,
        ))
    }

    /// Route a frame to one peer. Returns false if the peer is gone; the frame
    /// is dropped in that case.
    pub fn send(&self, peer: &PeerId, frame: String) -> bool {
        match self.peers.get(peer) {
            Some(tx) => tx.send(frame).is_ok(),
            None => {
                debug!("Dropping frame for disconnected peer {peer}");
                false
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close every connection and stop accepting new ones.
    pub async fn stop(&mut self) {
        // Dropping the outbound senders ends each connection's loop.
        self.peers.clear();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Router endpoint stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.max_message_size(state.config.max_frame_bytes)
        .on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut report = json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
    });
    if let (Some(probe), Some(fields)) = (&state.probe, report.as_object_mut()) {
        if let serde_json::Value::Object(extra) = probe() {
            fields.extend(extra);
        }
    }
    Json(report)
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    state.client_count.fetch_add(1, Ordering::Relaxed);

    let peer = PeerId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    state.peers.insert(peer.clone(), outbound_tx);
    debug!("Peer connected: {peer}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    if state.events.send(RouterEvent::Connected(peer.clone())).await.is_ok() {
        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                        // Not part of the protocol; let the owner reject it.
                        Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_tx.send(Message::Pong(data)).await;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Peer closed: {peer}");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for {peer}: {e}");
                            break;
                        }
                        _ => continue,
                    };

                    let event = RouterEvent::Message { peer: peer.clone(), frame };
                    if state.events.send(event).await.is_err() {
                        debug!("Event receiver gone, closing {peer}");
                        break;
                    }
                }

                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                                warn!("Failed to send to {peer}: {e}");
                                break;
                            }
                        }
                        // Endpoint is stopping.
                        None => {
                            let _ = ws_tx.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    state.peers.remove(&peer);
    let _ = state.events.send(RouterEvent::Disconnected(peer.clone())).await;
    state.client_count.fetch_sub(1, Ordering::Relaxed);
    debug!(
        "Peer disconnected: {peer} (total: {})",
        state.client_count.load(Ordering::Relaxed)
    );
}
