//! Room state owned by one actor.
//!
//! Everything here is synchronous. Operations validate first and mutate
//! second, so a rejected request never leaves a half-applied change.
//! Events produced by a mutation are queued in an outbox that the actor
//! drains onto the event bus once the operation returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use taleroom_protocol::{
    BuzzerPhase, BuzzerSnapshot, Channel, CharacterId, ConnectionStatus, GameMode, PlayerId,
    PlayerSummary, Recipient, RoomCode, RoomSnapshot, RoomState, ServerEvent, SessionSnapshot,
    StoryEntry,
};
use taleroom_tick::DeadlineTimers;
use taleroom_transport::ConnectionId;
use tokio::time::Instant;

use crate::content::{ContentSource, Question, StoryCheckpoint};
use crate::position::PositionSync;
use crate::{RoomConfig, RoomError, RoomInfo};

/// The deadlines a room can have running.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TimerKey {
    TurnDeadline,
    BuzzerWindow,
    Grace(PlayerId),
}

/// A queued event and who should get it.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    pub to: Recipient,
    pub channel: Channel,
    pub event: ServerEvent,
}

#[derive(Debug, Clone)]
pub(crate) struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub status: ConnectionStatus,
    pub character: Option<CharacterId>,
    /// Monotonic per room; defines join order.
    pub join_seq: u64,
    /// The connection that speaks for this player in this room.
    pub connection: ConnectionId,
}

impl Player {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Buzzer {
    pub phase: BuzzerPhase,
    pub holder: Option<PlayerId>,
}

impl Buzzer {
    pub fn open() -> Self {
        Self {
            phase: BuzzerPhase::Open,
            holder: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GameSession {
    pub mode: GameMode,
    pub turn: Option<PlayerId>,
    /// `join_seq` of the current or most recent turn holder.
    pub turn_cursor: Option<u64>,
    pub buzzer: Option<Buzzer>,
    pub question_index: usize,
    pub questions: Vec<Question>,
    pub story: Vec<StoryCheckpoint>,
    pub scores: BTreeMap<PlayerId, i64>,
    pub wrong_answers: BTreeMap<PlayerId, u32>,
    pub story_progress: Vec<StoryEntry>,
    pub winner: Option<PlayerId>,
    /// Bumped on every point awarded.
    awards: u64,
    /// Award counter value when each player last scored.
    last_award: HashMap<PlayerId, u64>,
}

impl GameSession {
    pub fn new(
        mode: GameMode,
        questions: Vec<Question>,
        story: Vec<StoryCheckpoint>,
        players: impl IntoIterator<Item = PlayerId>,
    ) -> Self {
        Self {
            mode,
            turn: None,
            turn_cursor: None,
            buzzer: (mode == GameMode::BuzzerQuiz).then(Buzzer::open),
            question_index: 0,
            questions,
            story,
            scores: players.into_iter().map(|p| (p, 0)).collect(),
            wrong_answers: BTreeMap::new(),
            story_progress: Vec::new(),
            winner: None,
            awards: 0,
            last_award: HashMap::new(),
        }
    }

    /// Number of questions or checkpoints this session walks.
    pub fn item_count(&self) -> usize {
        match self.mode {
            GameMode::TurnBasedStory => self.story.len(),
            GameMode::TurnBasedQuiz | GameMode::BuzzerQuiz => self.questions.len(),
            GameMode::SharedLobby => 0,
        }
    }

    pub fn current_item_id(&self) -> Option<String> {
        match self.mode {
            GameMode::TurnBasedStory => self.story.get(self.question_index).map(|c| c.id.clone()),
            GameMode::TurnBasedQuiz | GameMode::BuzzerQuiz => {
                self.current_question().map(|q| q.id.clone())
            }
            GameMode::SharedLobby => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.question_index)
    }

    pub fn award(&mut self, player: &PlayerId) {
        self.awards += 1;
        *self.scores.entry(player.clone()).or_insert(0) += 1;
        self.last_award.insert(player.clone(), self.awards);
    }

    pub fn record_wrong(&mut self, player: &PlayerId) {
        *self.wrong_answers.entry(player.clone()).or_insert(0) += 1;
    }

    pub fn forget(&mut self, player: &PlayerId) {
        self.scores.remove(player);
        self.wrong_answers.remove(player);
        self.last_award.remove(player);
    }

    /// Highest score wins; a tie goes to whoever reached that score
    /// first, then to the earlier joiner.
    pub fn leader(&self, players: &[Player]) -> Option<PlayerId> {
        let rank = |p: &Player| {
            let score = self.scores.get(&p.id).copied().unwrap_or(0);
            let reached = self.last_award.get(&p.id).copied().unwrap_or(0);
            (score, std::cmp::Reverse(reached), std::cmp::Reverse(p.join_seq))
        };
        players.iter().max_by_key(|p| rank(p)).map(|p| p.id.clone())
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub(crate) struct Room {
    pub code: RoomCode,
    pub mode: GameMode,
    pub capacity: u8,
    pub state: RoomState,
    pub version: u64,
    pub created_at: u64,
    pub last_activity: u64,
    /// In join order.
    pub players: Vec<Player>,
    pub characters: BTreeMap<CharacterId, PlayerId>,
    /// The mode's fixed character catalog.
    pub catalog: Vec<CharacterId>,
    pub session: Option<GameSession>,
    pub positions: PositionSync,
    pub timers: DeadlineTimers<TimerKey>,
    pub config: RoomConfig,
    pub content: Arc<dyn ContentSource>,
    /// Set while nobody is connected.
    pub empty_since: Option<Instant>,
    /// Host who dropped and handed the role on; gets it back on return.
    pub away_host: Option<PlayerId>,
    next_join_seq: u64,
    outbox: Vec<Outgoing>,
}

impl Room {
    pub fn new(
        code: RoomCode,
        mode: GameMode,
        capacity: u8,
        config: RoomConfig,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        let now = unix_millis();
        Self {
            catalog: content.characters(mode),
            positions: PositionSync::new(config.relay_interval()),
            code,
            mode,
            capacity,
            state: RoomState::Waiting,
            version: 0,
            created_at: now,
            last_activity: now,
            players: Vec::new(),
            characters: BTreeMap::new(),
            session: None,
            timers: DeadlineTimers::new(),
            config,
            content,
            empty_since: Some(Instant::now()),
            away_host: None,
            next_join_seq: 0,
            outbox: Vec::new(),
        }
    }

    pub fn index_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| &p.id == id)
    }

    /// Connected players in join order.
    pub fn connected(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected().count()
    }

    /// The sole player always owns the turn.
    pub fn is_single_player(&self) -> bool {
        self.capacity == 1
    }

    pub fn take_join_seq(&mut self) -> u64 {
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        seq
    }

    /// Checks that `connection` currently speaks for `player` here.
    pub fn authorize(&self, player: &PlayerId, connection: ConnectionId) -> Result<&Player, RoomError> {
        let p = self
            .player(player)
            .ok_or_else(|| RoomError::NotInRoom(player.clone(), self.code.clone()))?;
        if p.connection != connection {
            return Err(RoomError::SessionReplaced(player.clone()));
        }
        Ok(p)
    }

    pub fn require_host(&self, player: &PlayerId) -> Result<(), RoomError> {
        match self.player(player) {
            Some(p) if p.is_host => Ok(()),
            _ => Err(RoomError::NotHost(player.clone())),
        }
    }

    pub fn emit(&mut self, to: Recipient, event: ServerEvent) {
        self.outbox.push(Outgoing {
            to,
            channel: Channel::ReliableOrdered,
            event,
        });
    }

    pub fn emit_unreliable(&mut self, to: Recipient, event: ServerEvent) {
        self.outbox.push(Outgoing {
            to,
            channel: Channel::Unreliable,
            event,
        });
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Marks a state change.
    pub fn touch(&mut self) {
        self.version += 1;
        self.last_activity = unix_millis();
    }

    pub fn set_state(&mut self, target: RoomState) {
        if !self.state.can_transition_to(target) {
            tracing::warn!(room = %self.code, from = %self.state, to = %target, "unexpected room transition");
        }
        tracing::info!(room = %self.code, from = %self.state, to = %target, "room state changed");
        self.state = target;
    }

    pub fn refresh_empty_since(&mut self) {
        if self.connected_count() == 0 {
            self.empty_since.get_or_insert_with(Instant::now);
        } else {
            self.empty_since = None;
        }
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn summary(&self, player: &Player) -> PlayerSummary {
        PlayerSummary {
            id: player.id.clone(),
            name: player.name.clone(),
            is_host: player.is_host,
            status: player.status,
            character: player.character.clone(),
            score: self
                .session
                .as_ref()
                .and_then(|s| s.scores.get(&player.id).copied())
                .unwrap_or(0),
            join_order: player.join_seq,
        }
    }

    pub fn session_snapshot(&self) -> Option<SessionSnapshot> {
        let session = self.session.as_ref()?;
        let turn_index = session
            .turn
            .as_ref()
            .and_then(|t| self.connected().position(|p| &p.id == t));
        let buzzer = session.buzzer.as_ref().map(|b| BuzzerSnapshot {
            phase: b.phase,
            holder: b.holder.clone(),
            remaining_ms: self
                .timers
                .remaining(&TimerKey::BuzzerWindow)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        });
        Some(SessionSnapshot {
            turn_player: session.turn.clone(),
            turn_index,
            buzzer,
            question_index: session.question_index,
            current_item: session.current_item_id(),
            scores: session.scores.clone(),
            wrong_answers: session.wrong_answers.clone(),
            story_progress: session.story_progress.clone(),
            winner: session.winner.clone(),
        })
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            mode: self.mode,
            capacity: self.capacity,
            state: self.state,
            version: self.version,
            created_at: self.created_at,
            last_activity: self.last_activity,
            players: self.players.iter().map(|p| self.summary(p)).collect(),
            characters: self.characters.clone(),
            available_characters: self.available_characters(),
            session: self.session_snapshot(),
            positions: self.positions.latest().cloned().collect(),
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            code: self.code.clone(),
            mode: self.mode,
            state: self.state,
            version: self.version,
            player_count: self.players.len(),
            connected_count: self.connected_count(),
            capacity: self.capacity,
            empty_since: self.empty_since,
        }
    }

    /// Checks the invariants every operation must preserve.
    pub fn audit(&self) -> Result<(), String> {
        if self.players.len() > usize::from(self.capacity) {
            return Err(format!(
                "{} players in a room of capacity {}",
                self.players.len(),
                self.capacity
            ));
        }

        let hosts = self.players.iter().filter(|p| p.is_host).count();
        if hosts > 1 || (hosts == 0 && !self.players.is_empty()) {
            return Err(format!("{hosts} hosts among {} players", self.players.len()));
        }
        if let Some(host) = self.players.iter().find(|p| p.is_host) {
            if !host.is_connected() && self.connected_count() > 0 {
                return Err(format!("host {} is disconnected while others are connected", host.id));
            }
        }

        for (character, owner) in &self.characters {
            match self.player(owner) {
                Some(p) if p.character.as_ref() == Some(character) => {}
                _ => return Err(format!("character {character} mapped to {owner} who does not hold it")),
            }
        }
        for p in &self.players {
            if let Some(c) = &p.character {
                if self.characters.get(c) != Some(&p.id) {
                    return Err(format!("{} holds {c} but the map disagrees", p.id));
                }
            }
        }

        if let Some(session) = &self.session {
            if let Some(turn) = &session.turn {
                match self.player(turn) {
                    None => return Err(format!("turn held by non-member {turn}")),
                    Some(p) if !p.is_connected() => {
                        return Err(format!("turn held by disconnected {turn}"));
                    }
                    Some(_) => {}
                }
            }
            if let Some(buzzer) = &session.buzzer {
                let locked = buzzer.phase == BuzzerPhase::Locked;
                if locked != buzzer.holder.is_some() {
                    return Err(format!("buzzer {:?} with holder {:?}", buzzer.phase, buzzer.holder));
                }
                if let Some(holder) = &buzzer.holder {
                    if self.player(holder).is_none() {
                        return Err(format!("buzzer held by non-member {holder}"));
                    }
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
