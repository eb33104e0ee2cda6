//! Turn ownership for the story and quiz turn modes.
//!
//! The turn walks the connected players in join order, wrapping after the
//! last. A turn ends on a submitted choice, on the turn deadline, or when
//! its holder is removed.

use rand::Rng;
use taleroom_protocol::{
    GameMode, PlayerId, Recipient, RoomState, Selection, ServerEvent, StoryEntry,
};

use crate::model::{Room, TimerKey};
use crate::RoomError;

impl Room {
    /// Picks the first connected player who joined after `after` (or the
    /// first connected player when none did, or when `after` is `None`)
    /// and arms the turn deadline. Emits nothing.
    pub(crate) fn give_turn(&mut self, after: Option<u64>) -> Option<(PlayerId, usize)> {
        let connected: Vec<(PlayerId, u64)> =
            self.connected().map(|p| (p.id.clone(), p.join_seq)).collect();
        let index = after
            .and_then(|after| connected.iter().position(|(_, seq)| *seq > after))
            .unwrap_or(0);
        let (player, seq) = connected.get(index).cloned()?;

        let session = self.session.as_mut()?;
        session.turn = Some(player.clone());
        session.turn_cursor = Some(seq);
        if self.config.auto_progress {
            self.timers.arm(TimerKey::TurnDeadline, self.config.turn_deadline);
        }
        tracing::debug!(room = %self.code, %player, index, "turn assigned");
        Some((player, index))
    }

    /// [`give_turn`](Self::give_turn) and announce it.
    pub(crate) fn assign_turn(&mut self, after: Option<u64>) -> Option<PlayerId> {
        let (player, index) = self.give_turn(after)?;
        self.emit(
            Recipient::All,
            ServerEvent::TurnChanged { player_id: Some(player.clone()), turn_index: Some(index) },
        );
        Some(player)
    }

    /// Moves the turn to the next connected player after the current (or
    /// last) holder. With nobody connected the game pauses.
    pub(crate) fn advance_turn(&mut self) {
        if self.state != RoomState::InProgress {
            return;
        }
        let cursor = self.session.as_ref().and_then(|s| s.turn_cursor);
        if self.connected_count() == 0 {
            self.pause();
            return;
        }
        self.assign_turn(cursor);
    }

    pub(crate) fn submit_choice(
        &mut self,
        by: &PlayerId,
        item_id: Option<String>,
        selection: Selection,
    ) -> Result<(), RoomError> {
        if !self.mode.is_turn_based() {
            return Err(RoomError::InvalidState(format!("{} has no turns", self.mode)));
        }
        if self.state != RoomState::InProgress {
            return Err(RoomError::InvalidState(format!("game is {}", self.state)));
        }
        let single_player = self.is_single_player();
        let max_len = self.config.max_choice_len;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RoomError::InvalidState("no game session".into()))?;
        if !single_player && session.turn.as_ref() != Some(by) {
            return Err(RoomError::NotYourTurn(by.clone()));
        }
        let current = session.current_item_id();
        if let Some(claimed) = &item_id {
            if current.as_ref() != Some(claimed) {
                return Err(RoomError::Validation(format!(
                    "{claimed} is not the current item"
                )));
            }
        }

        match self.mode {
            GameMode::TurnBasedQuiz => {
                let Selection::Option(option) = selection else {
                    return Err(RoomError::Validation("quiz answers are option indexes".into()));
                };
                let question = session
                    .current_question()
                    .ok_or_else(|| RoomError::InvalidState("no question in play".into()))?;
                if option >= question.options.len() {
                    return Err(RoomError::Validation(format!("option {option} out of range")));
                }
                let correct = question.is_correct(option);
                self.grade_turn(by, Some(option), correct);
            }
            GameMode::TurnBasedStory => {
                let checkpoint = session
                    .story
                    .get(session.question_index)
                    .ok_or_else(|| RoomError::InvalidState("no checkpoint in play".into()))?;
                let (text, consequence) = match selection {
                    Selection::Option(i) => {
                        let text = checkpoint.choices.get(i).cloned().ok_or_else(|| {
                            RoomError::Validation(format!("choice {i} out of range"))
                        })?;
                        (text, checkpoint.consequences.get(i).cloned())
                    }
                    Selection::Text(text) => {
                        let text = text.trim().to_owned();
                        if text.is_empty() {
                            return Err(RoomError::Validation("choice text must not be empty".into()));
                        }
                        if text.chars().count() > max_len {
                            return Err(RoomError::Validation(format!(
                                "choice longer than {max_len} characters"
                            )));
                        }
                        let pool = &checkpoint.consequences;
                        let consequence = (!pool.is_empty())
                            .then(|| pool[rand::rng().random_range(0..pool.len())].clone());
                        (text, consequence)
                    }
                };
                let entry = StoryEntry {
                    item_id: checkpoint.id.clone(),
                    player: by.clone(),
                    text,
                    consequence,
                    timed_out: false,
                };
                self.commit_entry(entry);
            }
            other => return Err(RoomError::InvalidState(format!("{other} has no turns"))),
        }

        self.touch();
        self.end_turn();
        Ok(())
    }

    /// The turn holder ran out of time.
    pub(crate) fn on_turn_deadline(&mut self) {
        if self.state != RoomState::InProgress {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(holder) = session.turn.clone() else {
            return;
        };
        tracing::info!(room = %self.code, player = %holder, "turn timed out");

        match self.mode {
            GameMode::TurnBasedQuiz => self.grade_turn(&holder, None, false),
            GameMode::TurnBasedStory => {
                let item_id = session.current_item_id().unwrap_or_default();
                self.commit_entry(StoryEntry {
                    item_id,
                    player: holder,
                    text: String::new(),
                    consequence: None,
                    timed_out: true,
                });
            }
            _ => return,
        }
        self.touch();
        self.end_turn();
    }

    fn grade_turn(&mut self, player: &PlayerId, option: Option<usize>, correct: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if correct {
            session.award(player);
        } else if option.is_some() {
            session.record_wrong(player);
        }
        let event = ServerEvent::QuestionGraded {
            player_id: player.clone(),
            question_index: session.question_index,
            option,
            correct,
            scores: session.scores.clone(),
        };
        self.emit(Recipient::All, event);
    }

    fn commit_entry(&mut self, entry: StoryEntry) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.story_progress.push(entry.clone());
        self.emit(Recipient::All, ServerEvent::ChoiceCommitted { entry });
    }

    /// Moves to the next item, finishing the game after the last one,
    /// otherwise passes the turn on.
    fn end_turn(&mut self) {
        self.timers.cancel(&TimerKey::TurnDeadline);
        if self.advance_item() {
            self.finish_game();
        } else {
            self.advance_turn();
        }
    }

    /// Steps to the next question or checkpoint. Returns `true` when the
    /// list is exhausted.
    pub(crate) fn advance_item(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        session.question_index += 1;
        if session.question_index >= session.item_count() {
            return true;
        }
        let event = ServerEvent::QuestionAdvanced {
            question_index: session.question_index,
            item_id: session.current_item_id(),
        };
        self.emit(Recipient::All, event);
        false
    }
}
