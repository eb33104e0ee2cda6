//! The session registry.
//!
//! `SessionManager` is a plain struct; the server wraps it in a mutex
//! and only holds that lock for single, non-blocking calls.

use std::collections::HashMap;

use taleroom_protocol::{PlayerId, RoomCode};
use taleroom_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Outcome of [`SessionManager::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// The connection that spoke for this player until now.
    pub displaced: Option<ConnectionId>,
    /// The player id already had a live or in-grace session.
    pub resumed: bool,
}

pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    /// Binds `connection` to `player_id`. The most recent claim always
    /// wins.
    pub fn claim(&mut self, player_id: PlayerId, name: String, connection: ConnectionId) -> Claim {
        if let Some(session) = self.sessions.get_mut(&player_id) {
            if session.state != SessionState::Expired {
                let displaced = session.connection.filter(|c| *c != connection);
                session.connection = Some(connection);
                session.state = SessionState::Connected;
                session.name = name;
                if let Some(old) = displaced {
                    tracing::info!(%player_id, %old, new = %connection, "connection replaced");
                } else {
                    tracing::info!(%player_id, %connection, "session resumed");
                }
                return Claim {
                    displaced,
                    resumed: true,
                };
            }
        }

        self.sessions.insert(
            player_id.clone(),
            Session {
                player_id: player_id.clone(),
                name,
                connection: Some(connection),
                state: SessionState::Connected,
                rooms: Default::default(),
            },
        );
        tracing::info!(%player_id, %connection, "session created");
        Claim {
            displaced: None,
            resumed: false,
        }
    }

    /// Unbinds `connection` from `player_id` and starts the grace clock.
    ///
    /// Returns `Ok(false)` without touching anything when `connection`
    /// was already replaced.
    pub fn release(
        &mut self,
        player_id: &PlayerId,
        connection: ConnectionId,
    ) -> Result<bool, SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;

        if session.connection != Some(connection) {
            tracing::debug!(%player_id, %connection, "stale connection released, ignoring");
            return Ok(false);
        }
        session.connection = None;
        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%player_id, %connection, "player disconnected, grace period started");
        Ok(true)
    }

    pub fn is_current(&self, player_id: &PlayerId, connection: ConnectionId) -> bool {
        self.sessions
            .get(player_id)
            .is_some_and(|s| s.connection == Some(connection))
    }

    /// Fails with [`SessionError::Replaced`] if `connection` is not the
    /// player's current connection.
    pub fn ensure_current(
        &self,
        player_id: &PlayerId,
        connection: ConnectionId,
    ) -> Result<(), SessionError> {
        match self.sessions.get(player_id) {
            None => Err(SessionError::NotFound(player_id.clone())),
            Some(s) if s.connection == Some(connection) => Ok(()),
            Some(_) => Err(SessionError::Replaced {
                player: player_id.clone(),
                connection,
            }),
        }
    }

    pub fn join_room(&mut self, player_id: &PlayerId, room: RoomCode) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.rooms.insert(room);
        Ok(())
    }

    pub fn leave_room(&mut self, player_id: &PlayerId, room: &RoomCode) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.rooms.remove(room);
        Ok(())
    }

    /// Rooms the player is a member of, in code order.
    pub fn rooms(&self, player_id: &PlayerId) -> Vec<RoomCode> {
        self.sessions
            .get(player_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Expires sessions that stayed disconnected past the grace period
    /// and returns their ids.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();
        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() >= grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id.clone());
                    tracing::info!(player_id = %session.player_id, "session expired");
                }
            }
        }
        expired.sort();
        expired
    }

    /// Drops expired sessions. Kept separate from
    /// [`expire_stale`](Self::expire_stale) so callers can react to the
    /// expiry first.
    pub fn cleanup_expired(&mut self) {
        self.sessions
            .retain(|_, s| !matches!(s.state, SessionState::Expired));
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
