//! Room actor: an isolated Tokio task that owns one room.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. Commands are applied one at a time in arrival
//! order, interleaved with the room's own deadlines and its movement
//! relay tick. Nothing outside the task ever touches room state.

use std::sync::Arc;

use taleroom_protocol::{
    CharacterId, Facing, GameMode, PlayerId, RoomCode, RoomSnapshot, RoomState, Selection,
    ServerEvent,
};
use taleroom_tick::{Expired, TickScheduler};
use taleroom_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

use crate::content::ContentSource;
use crate::events::{EventBus, PlayerSender};
use crate::membership::JoinOutcome;
use crate::model::{Room, TimerKey};
use crate::{RoomConfig, RoomError};

/// A player action routed to a room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomRequest {
    SelectCharacter(CharacterId),
    ReleaseCharacter,
    StartGame,
    SubmitChoice {
        item_id: Option<String>,
        selection: Selection,
    },
    PressBuzzer,
    SubmitBuzzerAnswer(usize),
    NextQuestion,
    ReturnToLobby,
    Move {
        x: f32,
        y: f32,
        facing: Facing,
        action: String,
    },
    /// Re-send the full snapshot to the requester.
    RequestSnapshot,
}

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in some variants is a "reply channel": the
/// caller sends a command and waits for the response on that channel.
enum RoomCommand {
    Join {
        player: PlayerId,
        name: String,
        connection: ConnectionId,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },
    /// Explicit leave: removed at once.
    Leave {
        player: PlayerId,
        connection: ConnectionId,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// The connection dropped: starts the grace period.
    Disconnect {
        player: PlayerId,
        connection: ConnectionId,
    },
    Request {
        player: PlayerId,
        connection: ConnectionId,
        request: RoomRequest,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Info {
        reply: oneshot::Sender<RoomInfo>,
    },
    Shutdown {
        reason: String,
    },
}

/// Room metadata, cheap to produce, used for listing and reaping.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub code: RoomCode,
    pub mode: GameMode,
    pub state: RoomState,
    pub version: u64,
    pub player_count: usize,
    pub connected_count: usize,
    pub capacity: u8,
    /// Since when nobody has been connected.
    pub empty_since: Option<Instant>,
}

impl RoomInfo {
    /// Abandoned, or nobody connected for at least `grace`.
    pub fn should_reap(&self, grace: Duration) -> bool {
        self.state == RoomState::Abandoned
            || self.empty_since.is_some_and(|since| since.elapsed() >= grace)
    }
}

/// Handle to a running room actor. Used to send commands to it.
///
/// This is cheap to clone: it's just an `mpsc::Sender` wrapper. The
/// registry holds one of these per room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Joins (or rejoins) `player` through `connection`. Room events for
    /// this player are delivered to `sender`, starting with `room-joined`.
    pub async fn join(
        &self,
        player: PlayerId,
        name: impl Into<String>,
        connection: ConnectionId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            player,
            name: name.into(),
            connection,
            sender,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn leave(&self, player: PlayerId, connection: ConnectionId) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Leave { player, connection, reply }).await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    /// Fire-and-forget: a stale `connection` is ignored by the room.
    pub async fn disconnect(&self, player: PlayerId, connection: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnect { player, connection }).await
    }

    pub async fn request(
        &self,
        player: PlayerId,
        connection: ConnectionId,
        request: RoomRequest,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Request {
            player,
            connection,
            request,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Info { reply }).await?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Tells the room to close. Every subscriber gets `room-closed`.
    pub async fn shutdown(&self, reason: impl Into<String>) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown { reason: reason.into() }).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.code.clone())
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    bus: EventBus,
    relay: TickScheduler,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until shutdown, a fatal error, or every
    /// handle is dropped.
    async fn run(mut self) {
        tracing::info!(room = %self.room.code, mode = %self.room.mode, "room actor started");

        loop {
            tokio::select! {
                // Deadlines that are already due win over requests that
                // arrive at the same instant.
                biased;

                expired = self.room.timers.next_expired() => {
                    self.on_timer(expired);
                }
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                _ = self.relay.wait_for_tick() => {
                    self.room.flush_positions();
                    self.dispatch();
                    self.relay.record_tick_end();
                    if !self.room.positions.has_pending() {
                        self.relay.pause();
                    }
                }
            }

            self.dispatch();
            if let Err(violation) = self.room.audit() {
                tracing::error!(room = %self.room.code, %violation, "room invariant violated, closing room");
                self.room.abandon();
                self.bus.close("internal error");
                break;
            }
        }

        tracing::info!(room = %self.room.code, "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player,
                name,
                connection,
                sender,
                reply,
            } => {
                let result = self.handle_join(player, &name, connection, sender);
                self.dispatch();
                let _ = reply.send(result);
            }
            RoomCommand::Leave {
                player,
                connection,
                reply,
            } => {
                let authorized = self.room.authorize(&player, connection).map(|_| ());
                let result = authorized.and_then(|()| self.room.remove_player(&player));
                if result.is_ok() {
                    self.bus.unsubscribe(&player, connection);
                }
                self.dispatch();
                let _ = reply.send(result);
            }
            RoomCommand::Disconnect { player, connection } => {
                if !self.room.disconnect(&player, connection) {
                    tracing::debug!(room = %self.room.code, %player, %connection, "stale disconnect ignored");
                }
                self.bus.unsubscribe(&player, connection);
            }
            RoomCommand::Request {
                player,
                connection,
                request,
                reply,
            } => {
                let result = self.handle_request(&player, connection, request);
                if let Err(e) = &result {
                    tracing::debug!(room = %self.room.code, %player, error = %e, "request rejected");
                }
                self.dispatch();
                let _ = reply.send(result);
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.room.snapshot());
            }
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.room.info());
            }
            RoomCommand::Shutdown { reason } => {
                tracing::info!(room = %self.room.code, %reason, "room shutting down");
                self.room.abandon();
                self.dispatch();
                self.bus.close(&reason);
                return false;
            }
        }
        true
    }

    fn handle_join(
        &mut self,
        player: PlayerId,
        name: &str,
        connection: ConnectionId,
        sender: PlayerSender,
    ) -> Result<RoomSnapshot, RoomError> {
        let outcome = self.room.join(player.clone(), name, connection)?;
        if let JoinOutcome::Replaced { previous } = outcome {
            tracing::debug!(room = %self.room.code, %player, %previous, "evicting replaced connection");
            self.bus.evict(&player);
        }
        // Everyone else hears about the join first; the joiner gets the
        // resulting state in one snapshot.
        self.dispatch();
        self.bus.subscribe(player.clone(), connection, sender);
        tracing::debug!(room = %self.room.code, %player, ?outcome, subscribers = self.bus.len(), "joined");
        let snapshot = self.room.snapshot();
        self.bus.send_to(&player, ServerEvent::RoomJoined { snapshot: snapshot.clone() });
        Ok(snapshot)
    }

    fn handle_request(
        &mut self,
        player: &PlayerId,
        connection: ConnectionId,
        request: RoomRequest,
    ) -> Result<(), RoomError> {
        self.room.authorize(player, connection)?;
        let room = &mut self.room;
        match request {
            RoomRequest::SelectCharacter(character) => room.select_character(player, character),
            RoomRequest::ReleaseCharacter => room.release_character(player),
            RoomRequest::StartGame => room.start_game(player),
            RoomRequest::SubmitChoice { item_id, selection } => {
                room.submit_choice(player, item_id, selection)
            }
            RoomRequest::PressBuzzer => room.press_buzzer(player),
            RoomRequest::SubmitBuzzerAnswer(option) => room.submit_buzzer_answer(player, option),
            RoomRequest::NextQuestion => room.next_question(player),
            RoomRequest::ReturnToLobby => room.return_to_lobby(player),
            RoomRequest::Move { x, y, facing, action } => {
                room.submit_movement(player, x, y, facing, action)?;
                if self.relay.is_paused() {
                    self.relay.resume();
                }
                Ok(())
            }
            RoomRequest::RequestSnapshot => {
                let snapshot = room.snapshot();
                self.bus.send_to(player, ServerEvent::RoomSnapshot { snapshot });
                Ok(())
            }
        }
    }

    fn on_timer(&mut self, expired: Expired<TimerKey>) {
        tracing::trace!(room = %self.room.code, key = ?expired.key, generation = expired.generation, "deadline fired");
        match expired.key {
            TimerKey::TurnDeadline => self.room.on_turn_deadline(),
            TimerKey::BuzzerWindow => self.room.on_buzzer_window_expired(),
            TimerKey::Grace(player) => self.room.on_grace_expired(&player),
        }
    }

    /// Delivers everything the last operation queued. Runs before any
    /// reply is sent, so a caller sees the events its request caused as
    /// soon as the reply arrives.
    fn dispatch(&mut self) {
        for out in self.room.take_outbox() {
            self.bus.publish(&out.to, out.channel, out.event);
        }
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `config.channel_size` controls backpressure: if the channel fills up,
/// senders wait (bounded channel).
pub(crate) fn spawn_room(
    code: RoomCode,
    mode: GameMode,
    capacity: u8,
    config: RoomConfig,
    content: Arc<dyn ContentSource>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size.max(1));

    let mut relay = TickScheduler::with_rate(config.relay_rate_hz());
    relay.pause();
    let actor = RoomActor {
        bus: EventBus::new(code.clone()),
        room: Room::new(code.clone(), mode, capacity, config, content),
        relay,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
