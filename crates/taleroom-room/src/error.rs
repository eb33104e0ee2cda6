//! Error types for the room layer.

use taleroom_protocol::{CharacterId, ErrorKind, PlayerId, RoomCode};

/// Every way a room request can be refused.
///
/// A refused request leaves the room exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Malformed or out-of-range request fields.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("room {0} not found")]
    NotFound(RoomCode),

    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// New player ids may only join while the room is waiting.
    #[error("room {0} already started its game")]
    GameAlreadyInProgress(RoomCode),

    #[error("character {0} is already taken")]
    CharacterUnavailable(CharacterId),

    #[error("it is not {0}'s turn")]
    NotYourTurn(PlayerId),

    /// Another player holds the answer floor.
    #[error("the buzzer is already held")]
    BuzzerAlreadyHeld,

    #[error("the answer window is closed")]
    AnswerWindowClosed,

    #[error("player {0} is not the host")]
    NotHost(PlayerId),

    #[error("player {0} is not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// The room is in a state that doesn't allow this operation.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),

    /// The request came from a connection that no longer speaks for
    /// the player.
    #[error("a newer connection took over player {0}")]
    SessionReplaced(PlayerId),

    #[error("no free room code after {0} attempts")]
    CodeExhausted(u32),

    /// The room's command channel is closed; the actor is gone.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// The wire classification sent back to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) | Self::Unavailable(_) => ErrorKind::RoomNotFound,
            Self::RoomFull(_) => ErrorKind::RoomFull,
            Self::GameAlreadyInProgress(_) => ErrorKind::GameAlreadyInProgress,
            Self::CharacterUnavailable(_) => ErrorKind::CharacterUnavailable,
            Self::NotYourTurn(_) => ErrorKind::NotYourTurn,
            Self::BuzzerAlreadyHeld => ErrorKind::BuzzerAlreadyHeld,
            Self::AnswerWindowClosed => ErrorKind::AnswerWindowClosed,
            Self::NotHost(_) => ErrorKind::NotHost,
            Self::NotInRoom(..) | Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::SessionReplaced(_) => ErrorKind::SessionReplaced,
            Self::CodeExhausted(_) => ErrorKind::RoomCodeExhausted,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
