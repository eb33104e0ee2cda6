//! Server-wide settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taleroom_room::{duration_ms, RegistryConfig, RoomConfig};
use taleroom_session::SessionConfig;

/// Everything the server needs besides its bind address and content.
///
/// Every field has a default, so a config file only names what it
/// changes:
///
/// ```json
/// { "room": { "buzzer_window_ms": 3000 }, "idle_timeout_ms": 20000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub room: RoomConfig,
    pub registry: RegistryConfig,
    /// How often empty rooms and stale sessions are swept.
    #[serde(rename = "reap_interval_ms", with = "duration_ms")]
    pub reap_interval: Duration,
    /// A new connection must say `hello` within this window.
    #[serde(rename = "hello_timeout_ms", with = "duration_ms")]
    pub hello_timeout: Duration,
    /// A connection that sends nothing (not even a heartbeat) for this
    /// long is dropped.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl EngineConfig {
    /// Player ids outlive their connection exactly as long as room
    /// memberships do.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            reconnect_grace: self.room.reconnect_grace,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            registry: RegistryConfig::default(),
            reap_interval: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
        }
    }
}
