//! Joining, leaving, disconnecting and host migration.

use taleroom_protocol::{ConnectionStatus, PlayerId, Recipient, RoomState, ServerEvent};
use taleroom_transport::ConnectionId;

use crate::model::{Player, Room, TimerKey};
use crate::RoomError;

/// Longest display name accepted, in characters.
pub const MAX_NAME_LEN: usize = 32;

/// How a successful join was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new member.
    Joined,
    /// A disconnected member came back within the grace period.
    Reconnected,
    /// A connected member's connection was taken over by a newer one.
    Replaced { previous: ConnectionId },
    /// The same connection joined again; nothing changed.
    AlreadyJoined,
}

impl Room {
    pub(crate) fn join(
        &mut self,
        id: PlayerId,
        name: &str,
        connection: ConnectionId,
    ) -> Result<JoinOutcome, RoomError> {
        if self.state == RoomState::Abandoned {
            return Err(RoomError::NotFound(self.code.clone()));
        }
        let name = validate_name(name)?;

        if let Some(player) = self.player_mut(&id) {
            if player.is_connected() {
                if player.connection == connection {
                    return Ok(JoinOutcome::AlreadyJoined);
                }
                let previous = std::mem::replace(&mut player.connection, connection);
                tracing::info!(room = %self.code, player = %id, %previous, %connection, "connection replaced");
                self.touch();
                return Ok(JoinOutcome::Replaced { previous });
            }
            player.connection = connection;
            player.status = ConnectionStatus::Connected;
            self.reconnected(id);
            return Ok(JoinOutcome::Reconnected);
        }

        if !self.state.is_joinable() {
            return Err(RoomError::GameAlreadyInProgress(self.code.clone()));
        }
        if self.players.len() >= usize::from(self.capacity) {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        let player = Player {
            id: id.clone(),
            name,
            is_host: self.players.is_empty(),
            status: ConnectionStatus::Connected,
            character: None,
            join_seq: self.take_join_seq(),
            connection,
        };
        let summary = self.summary(&player);
        tracing::info!(
            room = %self.code,
            player = %id,
            host = player.is_host,
            players = self.players.len() + 1,
            "player joined"
        );
        self.players.push(player);
        self.emit(Recipient::AllExcept(id), ServerEvent::PlayerJoined { player: summary });
        self.refresh_empty_since();
        self.touch();
        Ok(JoinOutcome::Joined)
    }

    fn reconnected(&mut self, id: PlayerId) {
        self.timers.cancel(&TimerKey::Grace(id.clone()));
        tracing::info!(room = %self.code, player = %id, "player reconnected");
        self.emit(
            Recipient::AllExcept(id.clone()),
            ServerEvent::PlayerReconnected { player_id: id },
        );
        self.refresh_empty_since();
        self.settle_host();
        if self.state == RoomState::Paused {
            self.resume();
        }
        self.touch();
    }

    /// The player's connection dropped. Starts the grace period.
    ///
    /// Returns `false` if `connection` no longer speaks for the player,
    /// in which case nothing changes.
    pub(crate) fn disconnect(&mut self, id: &PlayerId, connection: ConnectionId) -> bool {
        let grace = self.config.reconnect_grace;
        let Some(player) = self.player_mut(id) else {
            return false;
        };
        if !player.is_connected() || player.connection != connection {
            return false;
        }
        player.status = ConnectionStatus::Disconnected;

        self.timers.arm(TimerKey::Grace(id.clone()), grace);
        self.positions.forget(id);
        tracing::info!(room = %self.code, player = %id, grace_ms = grace.as_millis() as u64, "player disconnected");
        self.emit(
            Recipient::AllExcept(id.clone()),
            ServerEvent::PlayerDisconnected { player_id: id.clone() },
        );
        self.emit(
            Recipient::AllExcept(id.clone()),
            ServerEvent::PlayerDespawned { player_id: id.clone() },
        );
        self.refresh_empty_since();
        self.settle_host();
        if self.state == RoomState::InProgress && self.mode.is_turn_based() {
            let held_turn = self
                .session
                .as_ref()
                .is_some_and(|s| s.turn.as_ref() == Some(id));
            if self.connected_count() == 0 {
                self.pause();
            } else if held_turn {
                // The player keeps their place in the rotation, not the turn.
                self.timers.cancel(&TimerKey::TurnDeadline);
                self.advance_turn();
            }
        }
        self.touch();
        true
    }

    /// The grace period of `id` ran out.
    pub(crate) fn on_grace_expired(&mut self, id: &PlayerId) {
        match self.player(id) {
            Some(p) if !p.is_connected() => {
                tracing::info!(room = %self.code, player = %id, "grace period elapsed");
                // Membership was just checked.
                let _ = self.remove_player(id);
            }
            _ => tracing::warn!(room = %self.code, player = %id, "grace timer fired for a connected or unknown player"),
        }
    }

    /// Removes a member for good: releases their character, hands over
    /// host and turn, and reopens a buzzer they were holding.
    pub(crate) fn remove_player(&mut self, id: &PlayerId) -> Result<(), RoomError> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| RoomError::NotInRoom(id.clone(), self.code.clone()))?;
        let player = self.players.remove(idx);

        self.timers.cancel(&TimerKey::Grace(id.clone()));
        self.positions.forget(id);
        if player.is_connected() {
            self.emit(
                Recipient::AllExcept(id.clone()),
                ServerEvent::PlayerDespawned { player_id: id.clone() },
            );
        }
        if let Some(character) = &player.character {
            self.characters.remove(character);
            self.emit(
                Recipient::All,
                ServerEvent::CharacterReleased { player_id: id.clone(), character: character.clone() },
            );
        }
        self.emit(Recipient::All, ServerEvent::PlayerLeft { player_id: id.clone() });
        tracing::info!(room = %self.code, player = %id, players = self.players.len(), "player removed");

        if self.players.is_empty() {
            self.abandon();
            self.refresh_empty_since();
            self.touch();
            return Ok(());
        }

        if self.away_host.as_ref() == Some(id) {
            self.away_host = None;
        }
        self.settle_host();
        if self.state.is_active() {
            self.release_game_roles(&player);
        }
        self.refresh_empty_since();
        self.touch();
        Ok(())
    }

    fn release_game_roles(&mut self, removed: &Player) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.forget(&removed.id);
        let held_turn = session.turn.as_ref() == Some(&removed.id);
        let held_buzzer = session
            .buzzer
            .as_ref()
            .is_some_and(|b| b.holder.as_ref() == Some(&removed.id));

        if held_turn {
            session.turn = None;
            self.timers.cancel(&TimerKey::TurnDeadline);
            self.advance_turn();
        } else if self.state == RoomState::InProgress
            && self.mode.is_turn_based()
            && self.connected_count() == 0
        {
            self.pause();
        }
        if held_buzzer {
            self.reopen_buzzer();
        }
    }

    /// Keeps the host role on a connected player whenever anyone is
    /// connected. A host who dropped gets the role back on returning
    /// within grace; with nobody left to take over, the role stays put.
    pub(crate) fn settle_host(&mut self) {
        let current = self.players.iter().position(|p| p.is_host);
        let returning = self
            .away_host
            .as_ref()
            .and_then(|away| self.players.iter().position(|p| &p.id == away && p.is_connected()));
        let target = match (returning, current) {
            (Some(idx), _) => {
                self.away_host = None;
                idx
            }
            (None, Some(idx)) if self.players[idx].is_connected() => return,
            (None, _) => match self.players.iter().position(Player::is_connected) {
                Some(idx) => idx,
                None if current.is_none() && !self.players.is_empty() => 0,
                None => return,
            },
        };
        if current == Some(target) {
            return;
        }

        if let Some(idx) = current {
            let previous = &mut self.players[idx];
            previous.is_host = false;
            if returning.is_none() && !previous.is_connected() {
                let previous = previous.id.clone();
                self.away_host.get_or_insert(previous);
            }
        }
        let new_host = &mut self.players[target];
        new_host.is_host = true;
        let id = new_host.id.clone();
        tracing::info!(room = %self.code, host = %id, "host changed");
        self.emit(Recipient::All, ServerEvent::HostChanged { player_id: id });
    }

    /// Marks the room dead. Terminal.
    pub(crate) fn abandon(&mut self) {
        if self.state != RoomState::Abandoned {
            self.set_state(RoomState::Abandoned);
        }
        self.timers.clear();
        self.positions.clear();
        if let Some(session) = self.session.as_mut() {
            session.turn = None;
        }
    }
}

fn validate_name(name: &str) -> Result<String, RoomError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RoomError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RoomError::Validation(format!(
            "name longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}
