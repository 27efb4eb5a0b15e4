//! Public endpoint addresses.

use std::str::FromStr;

use crate::error::TransportError;

/// Address of a broker's public endpoint.
///
/// Accepts `tcp://host:port`, `ws://host:port` or bare `host:port`. IPv6 hosts
/// are written in brackets (`tcp://[::1]:6555`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for binding a listener.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// WebSocket URL a client connects to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.bind_addr())
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        let rest = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("ws://"))
            .unwrap_or(s);
        let rest = rest.trim_end_matches("/ws").trim_end_matches('/');

        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp://{}", self.bind_addr())
    }
}
