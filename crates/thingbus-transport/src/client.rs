//! Request socket — the client side of a router endpoint.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::Message,
};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// A single connection to a broker's public endpoint.
///
/// Sends text frames and receives the frames the broker routes back to this
/// connection's identity.
pub struct RequestSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    endpoint: Endpoint,
}

impl RequestSocket {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let (stream, _) = connect_async(endpoint.ws_url()).await?;
        debug!("Connected to {endpoint}");
        Ok(Self {
            stream,
            endpoint: endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    /// Wait for the next text frame. Control frames are skipped.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no frame.
    pub async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Send a close frame and wait for the connection to shut down.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
