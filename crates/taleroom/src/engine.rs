//! The engine façade: rooms and player identities behind one API.
//!
//! Connection handlers and embedders both talk to [`Engine`]. It keeps the
//! room registry and the session registry behind `tokio::sync::Mutex`es
//! that are held for single map operations only; everything that touches
//! a room goes through a cloned [`RoomHandle`] after the lock is dropped,
//! so unrelated rooms never wait on each other.

use std::sync::Arc;

use taleroom_protocol::{GameMode, PlayerId, RoomCode, RoomSnapshot};
use taleroom_room::{
    close_empty_rooms, ContentSource, PlayerSender, RoomHandle, RoomInfo, RoomRegistry, RoomRequest,
};
use taleroom_session::{Claim, SessionManager};
use taleroom_transport::ConnectionId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{EngineConfig, TaleroomError};

pub struct Engine {
    rooms: Mutex<RoomRegistry>,
    sessions: Mutex<SessionManager>,
    config: EngineConfig,
    started: Instant,
}

impl Engine {
    pub fn new(config: EngineConfig, content: Arc<dyn ContentSource>) -> Self {
        Self {
            rooms: Mutex::new(RoomRegistry::new(
                config.room.clone(),
                config.registry.clone(),
                content,
            )),
            sessions: Mutex::new(SessionManager::new(config.session())),
            config,
            started: Instant::now(),
        }
    }

    /// Swaps the registry's random code source, for deterministic codes.
    pub async fn set_code_generator(&self, generate: impl FnMut() -> String + Send + 'static) {
        self.rooms.lock().await.set_code_generator(generate);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Milliseconds since the engine started; the clock of every
    /// outbound envelope.
    pub fn server_time(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Binds `connection` to `player`. The most recent connection wins.
    pub async fn connect(&self, player: PlayerId, name: String, connection: ConnectionId) -> Claim {
        self.sessions.lock().await.claim(player, name, connection)
    }

    /// The connection is gone: release the player id and start the grace
    /// period in every room it joined. Rooms ignore connections that
    /// were already replaced.
    pub async fn disconnect(&self, player: &PlayerId, connection: ConnectionId) {
        let rooms = {
            let mut sessions = self.sessions.lock().await;
            match sessions.release(player, connection) {
                Ok(true) => {}
                Ok(false) => tracing::debug!(%player, %connection, "connection already replaced"),
                Err(e) => tracing::debug!(%player, %connection, error = %e, "release failed"),
            }
            sessions.rooms(player)
        };
        for code in rooms {
            if let Ok(handle) = self.find_room(&code).await {
                let _ = handle.disconnect(player.clone(), connection).await;
            }
        }
    }

    /// Creates a room and joins `host` as its first member and host.
    pub async fn create_room(
        &self,
        mode: GameMode,
        capacity: Option<u8>,
        host: PlayerId,
        name: String,
        connection: ConnectionId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, TaleroomError> {
        self.sessions.lock().await.ensure_current(&host, connection)?;
        let handle = self.rooms.lock().await.create_room(mode, capacity)?;
        match handle.join(host.clone(), name, connection, sender).await {
            Ok(snapshot) => {
                self.sessions.lock().await.join_room(&host, handle.code().clone())?;
                Ok(snapshot)
            }
            Err(e) => {
                // Nobody could ever join it: don't leave an empty room behind.
                let _ = handle.shutdown("host could not join").await;
                self.rooms.lock().await.remove(handle.code());
                Err(e.into())
            }
        }
    }

    pub async fn join_room(
        &self,
        code: &RoomCode,
        player: PlayerId,
        name: String,
        connection: ConnectionId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, TaleroomError> {
        self.sessions.lock().await.ensure_current(&player, connection)?;
        let handle = self.find_room(code).await?;
        let snapshot = handle.join(player.clone(), name, connection, sender).await?;
        self.sessions.lock().await.join_room(&player, code.clone())?;
        Ok(snapshot)
    }

    /// Leaves for good, skipping the grace period.
    pub async fn leave_room(
        &self,
        code: &RoomCode,
        player: &PlayerId,
        connection: ConnectionId,
    ) -> Result<(), TaleroomError> {
        self.sessions.lock().await.ensure_current(player, connection)?;
        let handle = self.find_room(code).await?;
        handle.leave(player.clone(), connection).await?;
        self.sessions.lock().await.leave_room(player, code)?;
        Ok(())
    }

    /// Routes one player action to its room.
    pub async fn request(
        &self,
        code: &RoomCode,
        player: &PlayerId,
        connection: ConnectionId,
        request: RoomRequest,
    ) -> Result<(), TaleroomError> {
        self.sessions.lock().await.ensure_current(player, connection)?;
        let handle = self.find_room(code).await?;
        handle.request(player.clone(), connection, request).await?;
        Ok(())
    }

    pub async fn find_room(&self, code: &RoomCode) -> Result<RoomHandle, TaleroomError> {
        Ok(self.rooms.lock().await.find(code)?)
    }

    pub async fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, TaleroomError> {
        let handle = self.find_room(code).await?;
        Ok(handle.info().await?)
    }

    pub async fn room_snapshot(&self, code: &RoomCode) -> Result<RoomSnapshot, TaleroomError> {
        let handle = self.find_room(code).await?;
        Ok(handle.snapshot().await?)
    }

    /// Closes rooms nobody is in any more and forgets player ids whose
    /// grace ran out. Returns the closed rooms' codes.
    pub async fn reap_empty_rooms(&self) -> Vec<RoomCode> {
        let handles = self.rooms.lock().await.handles();
        let reaped = close_empty_rooms(handles, self.config.registry.empty_room_grace).await;
        {
            let mut rooms = self.rooms.lock().await;
            for code in &reaped {
                rooms.remove(code);
            }
        }

        let mut sessions = self.sessions.lock().await;
        let expired = sessions.expire_stale();
        sessions.cleanup_expired();
        if !reaped.is_empty() || !expired.is_empty() {
            tracing::info!(rooms = reaped.len(), sessions = expired.len(), "reaped");
        }
        reaped
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.room_count()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
