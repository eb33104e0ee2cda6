//! # Taleroom
//!
//! Real-time room synchronization for small multiplayer story and quiz
//! games: up to four players per room, one authoritative actor per room,
//! events fanned out over a single WebSocket per client.
//!
//! ```text
//! WebSocket ─→ handler ─→ Engine ─→ RoomHandle ─→ room actor
//!     ↑                                              │
//!     └──────────────── RoomOutbound ←───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taleroom::prelude::*;
//!
//! # async fn run() -> Result<(), TaleroomError> {
//! taleroom::init_tracing();
//! let server = TaleroomServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod engine;
mod error;
mod handler;
mod server;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::TaleroomError;
pub use server::{TaleroomServer, TaleroomServerBuilder};

pub use taleroom_protocol as protocol;
pub use taleroom_room as room;

/// Installs a `tracing` subscriber filtered by `RUST_LOG` (default
/// `info`). Does nothing if one is already installed.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use crate::{Engine, EngineConfig, TaleroomError, TaleroomServer, TaleroomServerBuilder};
    pub use taleroom_protocol::{
        ClientEvent, Envelope, ErrorKind, GameMode, PlayerId, RoomCode, RoomSnapshot, ServerEvent,
    };
    pub use taleroom_room::{
        Catalog, ContentSource, Question, RegistryConfig, RoomConfig, RoomInfo, StoryCheckpoint,
    };
}
