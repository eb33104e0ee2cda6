//! The event catalog: what clients send, what the engine announces.
//!
//! Both enums are internally tagged with kebab-case names, so a buzzer
//! press on the wire is `{"type":"press-buzzer"}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::{Facing, PlayerSummary, PositionUpdate, RoomSnapshot, SessionSnapshot, StoryEntry};
use crate::types::{CharacterId, GameMode, PlayerId, RoomCode};

/// A player's pick in a turn-based game: an option index, or free text
/// (story mode only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Option(usize),
    Text(String),
}

/// Client → engine.
///
/// Room-scoped events (everything after `join-room` except `heartbeat`
/// and `goodbye`) must name their room in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// First frame of every connection.
    Hello {
        version: u32,
        player_id: PlayerId,
        name: String,
    },
    CreateRoom {
        mode: GameMode,
        #[serde(default)]
        capacity: Option<u8>,
    },
    JoinRoom {
        room_code: RoomCode,
        /// Overrides the `hello` name inside this room.
        #[serde(default)]
        name: Option<String>,
    },
    /// Leave for good; no grace period.
    LeaveRoom,
    SelectCharacter {
        character: CharacterId,
    },
    ReleaseCharacter,
    StartGame,
    SubmitChoice {
        /// Question or checkpoint the client believes is current. A
        /// mismatch is rejected instead of being applied to the wrong item.
        #[serde(default)]
        item_id: Option<String>,
        selection: Selection,
    },
    PressBuzzer,
    SubmitBuzzerAnswer {
        option: usize,
    },
    NextQuestion,
    ReturnToLobby,
    PlayerMovement {
        x: f32,
        y: f32,
        #[serde(default)]
        facing: Facing,
        #[serde(default)]
        action: String,
    },
    RequestSnapshot,
    Heartbeat {
        client_time: u64,
    },
    Goodbye {
        #[serde(default)]
        reason: String,
    },
}

impl ClientEvent {
    /// Events that act on one room and therefore need `Envelope::room`.
    pub fn is_room_scoped(&self) -> bool {
        !matches!(
            self,
            Self::Hello { .. }
                | Self::CreateRoom { .. }
                | Self::JoinRoom { .. }
                | Self::Heartbeat { .. }
                | Self::Goodbye { .. }
        )
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    RoomNotFound,
    RoomFull,
    GameAlreadyInProgress,
    CharacterUnavailable,
    NotYourTurn,
    BuzzerAlreadyHeld,
    AnswerWindowClosed,
    NotHost,
    InvalidState,
    /// A newer connection claimed this player id.
    SessionReplaced,
    RoomCodeExhausted,
    Internal,
}

impl ErrorKind {
    /// Fatal errors tear the room down instead of rejecting one request.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::RoomCodeExhausted | Self::Internal)
    }
}

/// Engine → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Welcome {
        player_id: PlayerId,
        server_time: u64,
        protocol_version: u32,
    },
    /// Sent only to the joining connection.
    RoomJoined {
        snapshot: RoomSnapshot,
    },
    RoomSnapshot {
        snapshot: RoomSnapshot,
    },
    PlayerJoined {
        player: PlayerSummary,
    },
    PlayerDisconnected {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    HostChanged {
        player_id: PlayerId,
    },
    CharacterSelected {
        player_id: PlayerId,
        character: CharacterId,
    },
    CharacterReleased {
        player_id: PlayerId,
        character: CharacterId,
    },
    GameStarted {
        session: SessionSnapshot,
    },
    TurnChanged {
        player_id: Option<PlayerId>,
        turn_index: Option<usize>,
    },
    ChoiceCommitted {
        entry: StoryEntry,
    },
    QuestionGraded {
        player_id: PlayerId,
        question_index: usize,
        option: Option<usize>,
        correct: bool,
        scores: BTreeMap<PlayerId, i64>,
    },
    GamePaused,
    GameResumed {
        turn_player: Option<PlayerId>,
    },
    BuzzerLocked {
        player_id: PlayerId,
        window_ms: u64,
    },
    BuzzerResolved {
        player_id: PlayerId,
        option: usize,
        correct: bool,
        scores: BTreeMap<PlayerId, i64>,
    },
    BuzzerTimeout {
        player_id: PlayerId,
    },
    QuestionAdvanced {
        question_index: usize,
        item_id: Option<String>,
    },
    GameFinished {
        winner: Option<PlayerId>,
        scores: BTreeMap<PlayerId, i64>,
    },
    ReturnedToLobby,
    PlayerMovement {
        update: PositionUpdate,
    },
    /// Stop drawing this player now rather than waiting for staleness.
    PlayerDespawned {
        player_id: PlayerId,
    },
    /// This connection no longer speaks for its player in this room.
    SessionReplaced,
    /// Terminal: the room is gone.
    RoomClosed {
        reason: String,
    },
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_tags_are_kebab_case() {
        let json = serde_json::to_value(ClientEvent::SubmitBuzzerAnswer { option: 2 }).unwrap();
        assert_eq!(json["type"], "submit-buzzer-answer");
        assert_eq!(json["option"], 2);

        let ev: ClientEvent = serde_json::from_str(r#"{"type":"press-buzzer"}"#).unwrap();
        assert_eq!(ev, ClientEvent::PressBuzzer);
    }

    #[test]
    fn test_join_room_normalizes_code() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"join-room","room_code":"ab12cd"}"#).unwrap();
        match ev {
            ClientEvent::JoinRoom { room_code, name } => {
                assert_eq!(room_code.as_str(), "AB12CD");
                assert!(name.is_none());
            }
            other => panic!("expected JoinRoom, got {other:?}"),
        }
    }

    #[test]
    fn test_hello_with_empty_player_id_is_rejected() {
        let res = serde_json::from_str::<ClientEvent>(
            r#"{"type":"hello","version":1,"player_id":"","name":"x"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_selection_is_untagged() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"submit-choice","selection":1}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::SubmitChoice { item_id: None, selection: Selection::Option(1) }
        );
        let ev: ClientEvent = serde_json::from_str(
            r#"{"type":"submit-choice","item_id":"cave","selection":"open the door"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ClientEvent::SubmitChoice {
                item_id: Some("cave".into()),
                selection: Selection::Text("open the door".into())
            }
        );
    }

    #[test]
    fn test_movement_defaults() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"type":"player-movement","x":1.5,"y":2}"#).unwrap();
        assert_eq!(
            ev,
            ClientEvent::PlayerMovement { x: 1.5, y: 2.0, facing: Facing::Down, action: String::new() }
        );
    }

    #[test]
    fn test_room_scoped_events() {
        assert!(ClientEvent::PressBuzzer.is_room_scoped());
        assert!(ClientEvent::LeaveRoom.is_room_scoped());
        assert!(!ClientEvent::Heartbeat { client_time: 0 }.is_room_scoped());
        assert!(!ClientEvent::CreateRoom { mode: GameMode::SharedLobby, capacity: None }.is_room_scoped());
    }

    #[test]
    fn test_server_event_unit_variant_shape() {
        let json = serde_json::to_value(ServerEvent::GamePaused).unwrap();
        assert_eq!(json, serde_json::json!({"type": "game-paused"}));
    }

    #[test]
    fn test_error_kind_fatality() {
        assert!(ErrorKind::RoomCodeExhausted.is_fatal());
        assert!(ErrorKind::Internal.is_fatal());
        assert!(!ErrorKind::BuzzerAlreadyHeld.is_fatal());
        assert_eq!(
            serde_json::to_string(&ErrorKind::GameAlreadyInProgress).unwrap(),
            "\"game-already-in-progress\""
        );
    }
}
