//! Fixtures shared by the unit tests.

use std::sync::Arc;

use taleroom_protocol::{CharacterId, GameMode, PlayerId, RoomCode, ServerEvent};
use taleroom_transport::ConnectionId;

use crate::content::{Catalog, Question, StoryCheckpoint};
use crate::model::Room;
use crate::RoomConfig;

pub(crate) fn pid(s: &str) -> PlayerId {
    PlayerId::new(s).unwrap()
}

pub(crate) fn conn(n: u64) -> ConnectionId {
    ConnectionId::new(n)
}

pub(crate) fn character(s: &str) -> CharacterId {
    CharacterId::new(s).unwrap()
}

fn question(id: &str, options: &[&str], correct: usize) -> Question {
    Question {
        id: id.into(),
        prompt: format!("prompt of {id}"),
        options: options.iter().map(|o| o.to_string()).collect(),
        correct,
    }
}

fn checkpoint(id: &str) -> StoryCheckpoint {
    StoryCheckpoint {
        id: id.into(),
        prompt: format!("You reach the {id}."),
        choices: vec!["Climb the wall".into(), "Pick the lock".into()],
        consequences: vec!["You climb over.".into(), "The lock clicks open.".into()],
    }
}

/// Three questions (correct options 1, 1, 2), four checkpoints and four
/// characters for every mode.
pub(crate) fn catalog() -> Catalog {
    let characters: Vec<CharacterId> = ["wizard_1", "knight_1", "rogue_1", "bard_1"]
        .into_iter()
        .map(character)
        .collect();
    Catalog {
        characters: [
            GameMode::TurnBasedStory,
            GameMode::TurnBasedQuiz,
            GameMode::BuzzerQuiz,
            GameMode::SharedLobby,
        ]
        .into_iter()
        .map(|m| (m, characters.clone()))
        .collect(),
        questions: vec![
            question("q1", &["3", "4"], 1),
            question("q2", &["Paris", "Rome", "Oslo"], 1),
            question("q3", &["red", "green", "blue"], 2),
        ],
        story: ["gate", "courtyard", "tower", "throne"].into_iter().map(checkpoint).collect(),
    }
}

pub(crate) fn room_with_all(mode: GameMode, capacity: u8, config: RoomConfig, content: Catalog) -> Room {
    Room::new(RoomCode::parse("TEST01").unwrap(), mode, capacity, config, Arc::new(content))
}

pub(crate) fn room(mode: GameMode, capacity: u8) -> Room {
    room_with_all(mode, capacity, RoomConfig::default(), catalog())
}

pub(crate) fn room_with_config(mode: GameMode, capacity: u8, config: RoomConfig) -> Room {
    room_with_all(mode, capacity, config, catalog())
}

pub(crate) fn room_with_content(mode: GameMode, capacity: u8, content: Catalog) -> Room {
    room_with_all(mode, capacity, RoomConfig::default(), content)
}

/// Drains the outbox, keeping only the events.
pub(crate) fn events(room: &mut Room) -> Vec<ServerEvent> {
    room.take_outbox().into_iter().map(|o| o.event).collect()
}
