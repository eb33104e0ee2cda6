//! Session data: one record per player id.

use std::collections::BTreeSet;
use std::time::Duration;

use taleroom_protocol::{PlayerId, RoomCode};
use taleroom_transport::ConnectionId;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a released player id keeps its room memberships.
    pub reconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
        }
    }
}

/// ```text
///   Connected ──(release)──→ Disconnected ──(grace elapses)──→ Expired
///       ↑                         │
///       └─────────(claim)─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected { since: Instant },
    Expired,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    pub name: String,
    /// The connection that currently speaks for this player.
    pub connection: Option<ConnectionId>,
    pub state: SessionState,
    /// Rooms this player id is a member of.
    pub rooms: BTreeSet<RoomCode>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected)
    }
}
