//! `TaleroomServer` builder and server loop.
//!
//! This is the entry point for running a Taleroom server. It ties
//! together all the layers: transport → protocol → engine → rooms.

use std::sync::Arc;

use taleroom_protocol::{Codec, JsonCodec};
use taleroom_room::{Catalog, ContentSource};
use taleroom_transport::{Transport, WebSocketTransport};
use tokio::time::MissedTickBehavior;

use crate::handler::handle_connection;
use crate::{Engine, EngineConfig, TaleroomError};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) engine: Arc<Engine>,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Taleroom server.
///
/// # Example
///
/// ```rust,no_run
/// use taleroom::prelude::*;
///
/// # async fn run() -> Result<(), TaleroomError> {
/// let server = TaleroomServer::builder()
///     .bind("0.0.0.0:8080")
///     .content(Catalog::default())
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TaleroomServerBuilder {
    bind_addr: String,
    config: EngineConfig,
    content: Arc<dyn ContentSource>,
}

impl TaleroomServerBuilder {
    /// Creates a new builder with default settings and no content.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: EngineConfig::default(),
            content: Arc::new(Catalog::default()),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where rooms get characters, questions and story from.
    pub fn content(mut self, content: impl ContentSource) -> Self {
        self.content = Arc::new(content);
        self
    }

    /// Binds the listener.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`, which is what browser
    /// clients speak.
    ///
    /// Fails before binding if the room settings are out of range.
    pub async fn build(self) -> Result<TaleroomServer<JsonCodec>, TaleroomError> {
        self.config.room.validate()?;
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let engine = Arc::new(Engine::new(self.config, self.content));
        Ok(TaleroomServer {
            transport,
            state: Arc::new(ServerState {
                engine,
                codec: JsonCodec,
            }),
        })
    }
}

impl Default for TaleroomServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Taleroom server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TaleroomServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl TaleroomServer<JsonCodec> {
    pub fn builder() -> TaleroomServerBuilder {
        TaleroomServerBuilder::new()
    }
}

impl<C: Codec> TaleroomServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The engine behind this server, for out-of-band room management.
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.state.engine)
    }

    /// Runs the accept loop and the periodic reaper.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(mut self) -> Result<(), TaleroomError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Taleroom server running");

        let reaper = tokio::spawn(reap_forever(Arc::clone(&self.state.engine)));
        // The reaper lives exactly as long as the accept loop.
        let _reaper = AbortOnDrop(reaper);

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn reap_forever(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(engine.config().reap_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let reaped = engine.reap_empty_rooms().await;
        for code in reaped {
            tracing::info!(room = %code, "reaped empty room");
        }
    }
}
