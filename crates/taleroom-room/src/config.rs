//! Room and registry configuration.
//!
//! Durations are stored as milliseconds on disk so a JSON config reads
//! `"buzzer_window_ms": 2000` rather than serde's `{secs, nanos}` shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use taleroom_tick::TickConfig;

use crate::RoomError;

/// Largest room capacity accepted.
pub const MAX_CAPACITY: u8 = 4;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings every room is spawned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Capacity used when `create-room` does not name one.
    pub default_capacity: u8,

    /// How long a disconnected player keeps their seat.
    #[serde(rename = "reconnect_grace_ms", with = "duration_ms")]
    pub reconnect_grace: Duration,

    /// Time the turn holder has before the turn is forfeited.
    #[serde(rename = "turn_deadline_ms", with = "duration_ms")]
    pub turn_deadline: Duration,

    /// When `false` the turn deadline is never armed and a turn only
    /// moves on a submitted choice or the holder's removal.
    pub auto_progress: bool,

    /// Answer window after a successful buzz.
    #[serde(rename = "buzzer_window_ms", with = "duration_ms")]
    pub buzzer_window: Duration,

    /// Movement relay cadence, 1 to [`TickConfig::MAX_RATE_HZ`].
    pub position_rate_hz: u32,

    /// Longest `action` label accepted with a movement sample.
    pub max_action_len: usize,

    /// Longest free-text story choice accepted.
    pub max_choice_len: usize,

    /// Bounded command queue per room.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            default_capacity: MAX_CAPACITY,
            reconnect_grace: Duration::from_secs(30),
            turn_deadline: Duration::from_secs(300),
            auto_progress: true,
            buzzer_window: Duration::from_secs(2),
            position_rate_hz: 20,
            max_action_len: 32,
            max_choice_len: 280,
            channel_size: 64,
        }
    }
}

impl RoomConfig {
    /// Rejects settings a room cannot run with.
    pub fn validate(&self) -> Result<(), RoomError> {
        if !(1..=TickConfig::MAX_RATE_HZ).contains(&self.position_rate_hz) {
            return Err(RoomError::Validation(format!(
                "position_rate_hz must be between 1 and {}, got {}",
                TickConfig::MAX_RATE_HZ,
                self.position_rate_hz
            )));
        }
        if !(1..=MAX_CAPACITY).contains(&self.default_capacity) {
            return Err(RoomError::Validation(format!(
                "default_capacity must be between 1 and {MAX_CAPACITY}, got {}",
                self.default_capacity
            )));
        }
        if self.channel_size == 0 {
            return Err(RoomError::Validation("channel_size must be at least 1".into()));
        }
        Ok(())
    }

    /// The relay rate a room actually runs at: `position_rate_hz`
    /// clamped into the range the tick clock supports.
    pub fn relay_rate_hz(&self) -> u32 {
        self.position_rate_hz.clamp(1, TickConfig::MAX_RATE_HZ)
    }

    /// Time between two relay flushes at [`relay_rate_hz`](Self::relay_rate_hz).
    pub fn relay_interval(&self) -> Duration {
        TickConfig::with_rate(self.relay_rate_hz())
            .interval()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// A room with nobody connected for this long is reaped.
    #[serde(rename = "empty_room_grace_ms", with = "duration_ms")]
    pub empty_room_grace: Duration,

    /// Room code draws before creation gives up.
    pub code_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            empty_room_grace: Duration::from_secs(60),
            code_attempts: 64,
        }
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
