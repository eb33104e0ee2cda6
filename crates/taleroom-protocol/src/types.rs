//! Identity newtypes, enums shared by events and snapshots, and the
//! [`Envelope`] every frame travels in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Version clients must announce in `hello`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Longest player id accepted, in bytes.
pub const MAX_PLAYER_ID_LEN: usize = 64;

/// Room codes are exactly this many characters.
pub const ROOM_CODE_LEN: usize = 6;

/// Characters a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A player's identity, generated by the client and stable across
/// reconnects within a session.
///
/// Serialized as a bare string. Deserialization goes through
/// [`PlayerId::new`], so an empty or oversized id never reaches the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolError::Invalid("player id must not be empty".into()));
        }
        if raw.len() > MAX_PLAYER_ID_LEN {
            return Err(ProtocolError::Invalid(format!(
                "player id longer than {MAX_PLAYER_ID_LEN} bytes"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(ProtocolError::Invalid(
                "player id contains control characters".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlayerId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A joinable room's short code: six characters of `A-Z0-9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parses a code typed by a person: surrounding whitespace is
    /// trimmed and letters are upper-cased before validation.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != ROOM_CODE_LEN || !code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)) {
            return Err(ProtocolError::Invalid(format!(
                "room code must be {ROOM_CODE_LEN} characters of A-Z or 0-9, got {raw:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomCode {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a character in a mode's catalog, e.g. `wizard_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CharacterId(String);

impl CharacterId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ProtocolError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ProtocolError::Invalid("character id must not be empty".into()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CharacterId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CharacterId> for String {
    fn from(id: CharacterId) -> Self {
        id.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// What kind of game a room hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    TurnBasedStory,
    TurnBasedQuiz,
    BuzzerQuiz,
    SharedLobby,
}

impl GameMode {
    /// Modes where exactly one player owns each decision.
    pub fn is_turn_based(self) -> bool {
        matches!(self, Self::TurnBasedStory | Self::TurnBasedQuiz)
    }

    /// Modes that walk a question list.
    pub fn uses_questions(self) -> bool {
        matches!(self, Self::TurnBasedQuiz | Self::BuzzerQuiz)
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TurnBasedStory => "turn-based-story",
            Self::TurnBasedQuiz => "turn-based-quiz",
            Self::BuzzerQuiz => "buzzer-quiz",
            Self::SharedLobby => "shared-lobby",
        })
    }
}

/// The lifecycle state of a room.
///
/// ```text
/// Waiting ──start──→ InProgress ⇄ Paused
///    ↑                   │
///    └──return-to-lobby── Finished
///
/// any state ──last player removed / torn down──→ Abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomState {
    Waiting,
    InProgress,
    Paused,
    Finished,
    Abandoned,
}

impl RoomState {
    /// New player ids may only join while waiting.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// A GameSession exists and is not over yet.
    pub fn is_active(self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }

    pub fn can_transition_to(self, target: Self) -> bool {
        use RoomState::*;
        matches!(
            (self, target),
            (Waiting, InProgress)
                | (InProgress, Paused)
                | (Paused, InProgress)
                | (InProgress, Finished)
                | (Paused, Finished)
                | (Finished, Waiting)
        ) || (target == Abandoned && self != Abandoned)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Abandoned => "abandoned",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Per-question buzzer state.
///
/// ```text
/// Open ──first press──→ Locked ──answer──→ Resolved ──next-question──→ Open
///                         │
///                         └──window expires──→ Open
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuzzerPhase {
    Open,
    Locked,
    Resolved,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Who inside a room receives an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    All,
    Player(PlayerId),
    /// Everyone but the player who caused the event (movement relays).
    AllExcept(PlayerId),
}

impl Recipient {
    pub fn includes(&self, player: &PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(p) => p == player,
            Self::AllExcept(p) => p != player,
        }
    }
}

/// Delivery guarantee requested for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    /// Superseded by the next frame of the same kind; may be dropped.
    Unreliable,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Every frame on the wire.
///
/// `room` multiplexes one connection across all the rooms it has joined:
/// room-scoped client requests name their room, and every room event
/// names its source. Clients may omit `seq`, `timestamp` and `channel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub seq: u64,
    /// Milliseconds since the sender's epoch (server: process start).
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomCode>,
    pub event: T,
}

impl<T> Envelope<T> {
    /// A reliable, room-less envelope with zeroed counters.
    pub fn new(event: T) -> Self {
        Self {
            seq: 0,
            timestamp: 0,
            channel: Channel::ReliableOrdered,
            room: None,
            event,
        }
    }

    pub fn in_room(mut self, room: RoomCode) -> Self {
        self.room = Some(room);
        self
    }
}
