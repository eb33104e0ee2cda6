//! Full-state snapshots and the movement relay payload.
//!
//! A [`RoomSnapshot`] is self-contained: a client that receives one can
//! rebuild the room and its session without any earlier event. Maps are
//! `BTreeMap`s so the same state always serializes to the same bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    BuzzerPhase, CharacterId, ConnectionStatus, GameMode, PlayerId, RoomCode, RoomState,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub status: ConnectionStatus,
    pub character: Option<CharacterId>,
    pub score: i64,
    /// Position in the room's join order (0 = first ever joiner).
    pub join_order: u64,
}

/// One committed decision of a turn-based game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEntry {
    /// Checkpoint (story) or question (quiz) id the decision answered.
    pub item_id: String,
    pub player: PlayerId,
    pub text: String,
    pub consequence: Option<String>,
    /// The turn deadline ran out and the engine recorded this entry.
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuzzerSnapshot {
    pub phase: BuzzerPhase,
    pub holder: Option<PlayerId>,
    /// Time left in the answer window when the snapshot was taken.
    pub remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub turn_player: Option<PlayerId>,
    /// Index of `turn_player` in the connected players, join order.
    pub turn_index: Option<usize>,
    pub buzzer: Option<BuzzerSnapshot>,
    pub question_index: usize,
    /// Id of the question or checkpoint currently in play.
    pub current_item: Option<String>,
    pub scores: BTreeMap<PlayerId, i64>,
    pub wrong_answers: BTreeMap<PlayerId, u32>,
    pub story_progress: Vec<StoryEntry>,
    pub winner: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub mode: GameMode,
    pub capacity: u8,
    pub state: RoomState,
    /// Bumped on every state change; lets clients ignore stale snapshots.
    pub version: u64,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub last_activity: u64,
    /// In join order.
    pub players: Vec<PlayerSummary>,
    pub characters: BTreeMap<CharacterId, PlayerId>,
    pub available_characters: Vec<CharacterId>,
    pub session: Option<SessionSnapshot>,
    /// Last relayed position of every connected player.
    pub positions: Vec<PositionUpdate>,
}

impl RoomSnapshot {
    pub fn player(&self, id: &PlayerId) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn host(&self) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.is_host)
    }
}

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A relayed movement sample.
///
/// Receivers interpolate from `from` (or their own last sample) to
/// (`x`, `y`) over `interval_ms`, and drop any relay whose `seq` is not
/// newer than the last one they applied for that player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub player: PlayerId,
    pub x: f32,
    pub y: f32,
    pub facing: Facing,
    pub action: String,
    /// Per-player relay counter, starts at 1.
    pub seq: u64,
    /// Server receipt time, unix milliseconds.
    pub received_at: u64,
    /// Relay cadence of the room.
    pub interval_ms: u32,
    /// The previously relayed point for this player.
    pub from: Option<Point>,
}
