//! Room registry: creates and finds rooms. Empty rooms are closed by
//! [`close_empty_rooms`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use taleroom_protocol::{GameMode, RoomCode, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

use crate::config::MAX_CAPACITY;
use crate::content::ContentSource;
use crate::room::spawn_room;
use crate::{RegistryConfig, RoomConfig, RoomError, RoomHandle};

/// Produces candidate room codes. Invalid candidates count as collisions.
pub type CodeGenerator = Box<dyn FnMut() -> String + Send>;

/// A uniformly random code over `A-Z0-9`.
pub fn random_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Shuts down every room among `handles` that
/// [`should_reap`](crate::RoomInfo::should_reap) accepts, and returns their
/// codes in order. A room that no longer answers is closed too.
///
/// Takes cloned handles so callers can run it without holding whatever
/// guards their registry. Dropping the closed codes from the registry is
/// left to the caller.
pub async fn close_empty_rooms(handles: Vec<RoomHandle>, grace: Duration) -> Vec<RoomCode> {
    let mut closed = Vec::new();
    for handle in handles {
        let reap = match handle.info().await {
            Ok(info) => info.should_reap(grace),
            Err(_) => true,
        };
        if reap {
            let _ = handle.shutdown("room is empty").await;
            closed.push(handle.code().clone());
        }
    }
    closed.sort();
    closed
}

/// Owns the code → room mapping.
///
/// The registry only stores handles. It never touches room state, so
/// callers can wrap it in a mutex held for lookups alone and do all
/// per-room work on a cloned [`RoomHandle`].
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, RoomHandle>,
    room_config: RoomConfig,
    config: RegistryConfig,
    content: Arc<dyn ContentSource>,
    generate_code: CodeGenerator,
}

impl RoomRegistry {
    pub fn new(
        room_config: RoomConfig,
        config: RegistryConfig,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            room_config,
            config,
            content,
            generate_code: Box::new(random_room_code),
        }
    }

    /// Replaces the random code source.
    pub fn with_code_generator(mut self, generate: impl FnMut() -> String + Send + 'static) -> Self {
        self.set_code_generator(generate);
        self
    }

    pub fn set_code_generator(&mut self, generate: impl FnMut() -> String + Send + 'static) {
        self.generate_code = Box::new(generate);
    }

    /// Spawns an empty room under a fresh code.
    ///
    /// Codes are drawn until one is not in use, up to
    /// `RegistryConfig::code_attempts` draws.
    pub fn create_room(
        &mut self,
        mode: GameMode,
        capacity: Option<u8>,
    ) -> Result<RoomHandle, RoomError> {
        let capacity = capacity.unwrap_or(self.room_config.default_capacity);
        if !(1..=MAX_CAPACITY).contains(&capacity) {
            return Err(RoomError::Validation(format!(
                "capacity must be between 1 and {MAX_CAPACITY}, got {capacity}"
            )));
        }

        let attempts = self.config.code_attempts;
        let code = (0..attempts)
            .filter_map(|_| RoomCode::parse(&(self.generate_code)()).ok())
            .find(|code| !self.rooms.contains_key(code))
            .ok_or_else(|| {
                tracing::error!(attempts, rooms = self.rooms.len(), "room code space exhausted");
                RoomError::CodeExhausted(attempts)
            })?;

        let handle = spawn_room(
            code.clone(),
            mode,
            capacity,
            self.room_config.clone(),
            Arc::clone(&self.content),
        );
        self.rooms.insert(code.clone(), handle.clone());
        tracing::info!(room = %code, %mode, capacity, "room created");
        Ok(handle)
    }

    pub fn find(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(code)
            .filter(|h| !h.is_closed())
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Forgets a room. The actor keeps running until told to shut down
    /// or until its last handle is dropped.
    pub fn remove(&mut self, code: &RoomCode) -> Option<RoomHandle> {
        let handle = self.rooms.remove(code);
        if handle.is_some() {
            tracing::info!(room = %code, "room removed from registry");
        }
        handle
    }

    /// Cloned handles to all rooms, for work that must not hold the
    /// registry.
    pub fn handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().cloned().collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Catalog;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(
            RoomConfig::default(),
            RegistryConfig::default(),
            Arc::new(Catalog::default()),
        )
    }

    #[test]
    fn test_random_code_shape() {
        for _ in 0..100 {
            let code = random_room_code();
            assert!(RoomCode::parse(&code).is_ok(), "{code}");
        }
    }

    #[tokio::test]
    async fn test_create_room_returns_unique_codes() {
        let mut reg = registry();
        let a = reg.create_room(GameMode::SharedLobby, None).unwrap();
        let b = reg.create_room(GameMode::SharedLobby, None).unwrap();
        assert_ne!(a.code(), b.code());
        assert_eq!(reg.room_count(), 2);
        assert!(reg.find(a.code()).is_ok());
    }

    #[tokio::test]
    async fn test_collisions_are_retried() {
        let mut draws = vec!["AAAAAA", "AAAAAA", "bad", "BBBBBB"].into_iter();
        let mut reg = registry()
            .with_code_generator(move || draws.next().unwrap_or("ZZZZZZ").to_owned());
        let first = reg.create_room(GameMode::BuzzerQuiz, None).unwrap();
        let second = reg.create_room(GameMode::BuzzerQuiz, None).unwrap();
        assert_eq!(first.code().as_str(), "AAAAAA");
        assert_eq!(second.code().as_str(), "BBBBBB");
    }

    #[tokio::test]
    async fn test_code_exhaustion_is_reported() {
        let mut reg = registry().with_code_generator(|| "SAMEIE".to_owned());
        reg.create_room(GameMode::SharedLobby, None).unwrap();
        let err = reg.create_room(GameMode::SharedLobby, None).unwrap_err();
        assert_eq!(err, RoomError::CodeExhausted(64));
        assert!(err.kind().is_fatal());
        assert_eq!(reg.room_count(), 1);
    }

    #[tokio::test]
    async fn test_capacity_bounds() {
        let mut reg = registry();
        assert!(matches!(reg.create_room(GameMode::SharedLobby, Some(0)), Err(RoomError::Validation(_))));
        assert!(matches!(reg.create_room(GameMode::SharedLobby, Some(5)), Err(RoomError::Validation(_))));
        assert!(reg.create_room(GameMode::SharedLobby, Some(1)).is_ok());
    }

    #[tokio::test]
    async fn test_find_unknown_room() {
        let reg = registry();
        let code = RoomCode::parse("NOPE00").unwrap();
        assert_eq!(reg.find(&code).unwrap_err(), RoomError::NotFound(code));
    }
}
