//! Transport layer for Taleroom.
//!
//! Every client holds exactly one physical connection to the engine and
//! multiplexes all of its rooms over it. This crate only moves frames;
//! it knows nothing about rooms or events.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Identifies one physical client connection.
///
/// A player id can move between connections (reconnects); the engine
/// uses this id to tell a live connection apart from a stale one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts incoming client connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client and completes its upgrade.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address the listener is bound to.
    fn local_addr(&self) -> std::io::Result<std::net::SocketAddr>;
}

/// One bidirectional client connection.
///
/// `send` and `recv` may be awaited concurrently from the same task
/// (for example in two `tokio::select!` branches); implementations keep
/// the read and write halves independent.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame. `Ok(None)` means the peer closed cleanly.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a frame that may be dropped under pressure.
    ///
    /// Transports without an unreliable lane fall back to `send`.
    async fn send_unreliable(&self, data: &[u8]) -> Result<(), Self::Error> {
        self.send(data).await
    }

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
