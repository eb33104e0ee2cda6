//! Static game content: characters, questions and story checkpoints.
//!
//! The engine never owns content. It asks a [`ContentSource`] when a room
//! is created (characters) and when a game starts (questions, story), and
//! keeps what it got for the lifetime of that room or session.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use taleroom_protocol::{CharacterId, GameMode};

use crate::RoomError;

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct: usize,
}

impl Question {
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct
    }
}

/// A story decision point.
///
/// `consequences[i]` narrates what follows `choices[i]`. Free-text
/// choices draw a random consequence from the same pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryCheckpoint {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub consequences: Vec<String>,
}

/// Where rooms get their content from.
pub trait ContentSource: Send + Sync + 'static {
    /// The fixed character catalog of a mode, in display order.
    fn characters(&self, mode: GameMode) -> Vec<CharacterId>;

    /// Questions for the quiz modes, in play order.
    fn questions(&self, mode: GameMode) -> Vec<Question>;

    /// Checkpoints of the story mode, in play order.
    fn story(&self) -> Vec<StoryCheckpoint>;
}

/// In-memory content, usually loaded from JSON.
///
/// ```json
/// {
///   "characters": { "buzzer-quiz": ["wizard_1", "knight_1"] },
///   "questions": [{ "id": "q1", "prompt": "2+2?", "options": ["3", "4"], "correct": 1 }],
///   "story": [{ "id": "gate", "prompt": "A locked gate.", "choices": ["Climb"], "consequences": ["You slip."] }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub characters: HashMap<GameMode, Vec<CharacterId>>,
    pub questions: Vec<Question>,
    pub story: Vec<StoryCheckpoint>,
}

impl Catalog {
    /// Rejects content the engine could not play.
    pub fn validate(&self) -> Result<(), RoomError> {
        for q in &self.questions {
            if q.options.is_empty() {
                return Err(RoomError::Validation(format!("question {} has no options", q.id)));
            }
            if q.correct >= q.options.len() {
                return Err(RoomError::Validation(format!(
                    "question {} marks option {} correct but has {} options",
                    q.id,
                    q.correct,
                    q.options.len()
                )));
            }
        }
        for (mode, characters) in &self.characters {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = characters.iter().find(|c| !seen.insert(*c)) {
                return Err(RoomError::Validation(format!(
                    "character {dup} listed twice for {mode}"
                )));
            }
        }
        Ok(())
    }
}

impl ContentSource for Catalog {
    fn characters(&self, mode: GameMode) -> Vec<CharacterId> {
        self.characters.get(&mode).cloned().unwrap_or_default()
    }

    fn questions(&self, _mode: GameMode) -> Vec<Question> {
        self.questions.clone()
    }

    fn story(&self) -> Vec<StoryCheckpoint> {
        self.story.clone()
    }
}
