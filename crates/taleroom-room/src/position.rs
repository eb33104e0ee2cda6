//! Movement relay for the shared 2D world.
//!
//! Samples are not validated for plausibility. The latest sample per
//! player waits in `pending` until the room's relay tick flushes it to
//! everyone else; samples arriving between two ticks overwrite each
//! other, which caps each player at one relay per tick.

use std::collections::BTreeMap;
use std::time::Duration;

use taleroom_protocol::{Facing, PlayerId, Point, PositionUpdate, Recipient, RoomState, ServerEvent};

use crate::model::{unix_millis, Room};
use crate::RoomError;

#[derive(Debug, Clone)]
struct Sample {
    x: f32,
    y: f32,
    facing: Facing,
    action: String,
    received_at: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PositionSync {
    interval_ms: u32,
    pending: BTreeMap<PlayerId, Sample>,
    /// Last relayed update per player.
    relayed: BTreeMap<PlayerId, PositionUpdate>,
}

impl PositionSync {
    /// `interval` is the relay clock's period, advertised to receivers.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval_ms: u32::try_from(interval.as_millis()).unwrap_or(u32::MAX),
            ..Self::default()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Turns pending samples into relays, in player id order.
    pub fn flush(&mut self) -> Vec<PositionUpdate> {
        let pending = std::mem::take(&mut self.pending);
        let mut out = Vec::with_capacity(pending.len());
        for (player, sample) in pending {
            let previous = self.relayed.get(&player);
            let update = PositionUpdate {
                seq: previous.map_or(1, |p| p.seq + 1),
                from: previous.map(|p| Point { x: p.x, y: p.y }),
                player: player.clone(),
                x: sample.x,
                y: sample.y,
                facing: sample.facing,
                action: sample.action,
                received_at: sample.received_at,
                interval_ms: self.interval_ms,
            };
            self.relayed.insert(player, update.clone());
            out.push(update);
        }
        out
    }

    /// Drops everything known about a player. Their `seq` restarts at 1.
    pub fn forget(&mut self, player: &PlayerId) {
        self.pending.remove(player);
        self.relayed.remove(player);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.relayed.clear();
    }

    pub fn latest(&self) -> impl Iterator<Item = &PositionUpdate> {
        self.relayed.values()
    }
}

impl Room {
    pub(crate) fn submit_movement(
        &mut self,
        by: &PlayerId,
        x: f32,
        y: f32,
        facing: Facing,
        action: String,
    ) -> Result<(), RoomError> {
        if self.state == RoomState::Abandoned {
            return Err(RoomError::InvalidState("room is closed".into()));
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(RoomError::Validation("coordinates must be finite".into()));
        }
        if action.chars().count() > self.config.max_action_len {
            return Err(RoomError::Validation(format!(
                "action longer than {} characters",
                self.config.max_action_len
            )));
        }
        let received_at = unix_millis();
        self.positions.pending.insert(
            by.clone(),
            Sample { x, y, facing, action, received_at },
        );
        self.last_activity = received_at;
        Ok(())
    }

    /// Relays pending samples to everyone but their sender. Returns the
    /// number relayed.
    pub(crate) fn flush_positions(&mut self) -> usize {
        let updates = self.positions.flush();
        let count = updates.len();
        for update in updates {
            let sender = update.player.clone();
            self.emit_unreliable(Recipient::AllExcept(sender), ServerEvent::PlayerMovement { update });
        }
        count
    }
}
