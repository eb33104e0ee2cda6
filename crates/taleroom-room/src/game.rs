//! Game session lifecycle: start, pause, resume, finish, back to lobby.

use taleroom_protocol::{GameMode, PlayerId, Recipient, RoomState, ServerEvent};

use crate::model::{GameSession, Room, TimerKey};
use crate::RoomError;

impl Room {
    pub(crate) fn start_game(&mut self, by: &PlayerId) -> Result<(), RoomError> {
        self.require_host(by)?;
        match self.state {
            RoomState::Waiting => {}
            RoomState::InProgress | RoomState::Paused => {
                return Err(RoomError::GameAlreadyInProgress(self.code.clone()));
            }
            other => return Err(RoomError::InvalidState(format!("cannot start a game while {other}"))),
        }
        if self.connected_count() == 0 {
            return Err(RoomError::InvalidState("nobody is connected".into()));
        }

        let questions = if self.mode.uses_questions() {
            self.content.questions(self.mode)
        } else {
            Vec::new()
        };
        let story = if self.mode == GameMode::TurnBasedStory {
            self.content.story()
        } else {
            Vec::new()
        };
        if self.mode.uses_questions() && questions.is_empty() {
            return Err(RoomError::InvalidState("no questions loaded".into()));
        }
        if self.mode == GameMode::TurnBasedStory && story.is_empty() {
            return Err(RoomError::InvalidState("no story loaded".into()));
        }

        self.session = Some(GameSession::new(
            self.mode,
            questions,
            story,
            self.players.iter().map(|p| p.id.clone()),
        ));
        self.set_state(RoomState::InProgress);
        let first_turn = if self.mode.is_turn_based() {
            self.give_turn(None)
        } else {
            None
        };
        if let Some(session) = self.session_snapshot() {
            self.emit(Recipient::All, ServerEvent::GameStarted { session });
        }
        if let Some((player, index)) = first_turn {
            self.emit(
                Recipient::All,
                ServerEvent::TurnChanged { player_id: Some(player), turn_index: Some(index) },
            );
        }
        self.touch();
        Ok(())
    }

    pub(crate) fn return_to_lobby(&mut self, by: &PlayerId) -> Result<(), RoomError> {
        self.require_host(by)?;
        if self.state != RoomState::Finished {
            return Err(RoomError::InvalidState(format!(
                "can only return to the lobby from a finished game, room is {}",
                self.state
            )));
        }
        self.session = None;
        self.timers.cancel(&TimerKey::TurnDeadline);
        self.timers.cancel(&TimerKey::BuzzerWindow);
        self.set_state(RoomState::Waiting);
        self.emit(Recipient::All, ServerEvent::ReturnedToLobby);
        self.touch();
        Ok(())
    }

    /// Ends the session and announces the winner.
    pub(crate) fn finish_game(&mut self) {
        self.timers.cancel(&TimerKey::TurnDeadline);
        self.timers.cancel(&TimerKey::BuzzerWindow);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.turn = None;
        if let Some(buzzer) = session.buzzer.as_mut() {
            buzzer.holder = None;
        }
        let winner = if session.mode.uses_questions() {
            session.leader(&self.players)
        } else {
            None
        };
        session.winner = winner.clone();
        let scores = session.scores.clone();
        self.set_state(RoomState::Finished);
        tracing::info!(room = %self.code, winner = ?winner, "game finished");
        self.emit(Recipient::All, ServerEvent::GameFinished { winner, scores });
    }

    /// Nobody is connected to take a turn.
    pub(crate) fn pause(&mut self) {
        if self.state != RoomState::InProgress {
            return;
        }
        self.timers.cancel(&TimerKey::TurnDeadline);
        if let Some(session) = self.session.as_mut() {
            session.turn = None;
        }
        self.set_state(RoomState::Paused);
        self.emit(Recipient::All, ServerEvent::GamePaused);
    }

    /// Gives the turn back to the player who last held it, or the next
    /// connected player after them.
    pub(crate) fn resume(&mut self) {
        if self.state != RoomState::Paused {
            return;
        }
        let cursor = self.session.as_ref().and_then(|s| s.turn_cursor);
        self.set_state(RoomState::InProgress);
        let turn_player = if self.mode.is_turn_based() {
            self.assign_turn(cursor.and_then(|c| c.checked_sub(1)))
        } else {
            None
        };
        self.emit(Recipient::All, ServerEvent::GameResumed { turn_player });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Catalog;
    use crate::testing::{character, conn, events, pid, room, room_with_content};

    #[tokio::test]
    async fn test_only_host_starts() {
        let mut r = room(GameMode::BuzzerQuiz, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.join(pid("b"), "Bo", conn(2)).unwrap();
        assert_eq!(r.start_game(&pid("b")).unwrap_err(), RoomError::NotHost(pid("b")));
        assert_eq!(r.state, RoomState::Waiting);

        r.start_game(&pid("a")).unwrap();
        assert_eq!(r.state, RoomState::InProgress);
        assert!(matches!(
            r.start_game(&pid("a")),
            Err(RoomError::GameAlreadyInProgress(_))
        ));
    }

    #[tokio::test]
    async fn test_start_initializes_scores_and_first_turn() {
        let mut r = room(GameMode::TurnBasedQuiz, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.join(pid("b"), "Bo", conn(2)).unwrap();
        r.take_outbox();
        r.start_game(&pid("a")).unwrap();

        let session = r.session.as_ref().unwrap();
        assert_eq!(session.turn, Some(pid("a")));
        assert_eq!(session.scores.values().copied().collect::<Vec<_>>(), vec![0, 0]);
        assert!(r.timers.is_armed(&TimerKey::TurnDeadline));

        let sent = events(&mut r);
        assert!(matches!(sent[0], ServerEvent::GameStarted { .. }));
        assert_eq!(
            sent[1],
            ServerEvent::TurnChanged { player_id: Some(pid("a")), turn_index: Some(0) }
        );
    }

    #[tokio::test]
    async fn test_start_without_content_is_invalid() {
        let mut r = room_with_content(GameMode::TurnBasedStory, 2, Catalog::default());
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        assert!(matches!(r.start_game(&pid("a")), Err(RoomError::InvalidState(_))));
        assert!(r.session.is_none());
    }

    #[tokio::test]
    async fn test_shared_lobby_starts_without_turns() {
        let mut r = room(GameMode::SharedLobby, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.start_game(&pid("a")).unwrap();
        let session = r.session.as_ref().unwrap();
        assert!(session.turn.is_none());
        assert!(session.buzzer.is_none());
    }

    #[tokio::test]
    async fn test_return_to_lobby_keeps_characters() {
        let mut r = room(GameMode::BuzzerQuiz, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.select_character(&pid("a"), character("wizard_1")).unwrap();
        assert!(matches!(r.return_to_lobby(&pid("a")), Err(RoomError::InvalidState(_))));

        r.start_game(&pid("a")).unwrap();
        r.finish_game();
        r.return_to_lobby(&pid("a")).unwrap();
        assert_eq!(r.state, RoomState::Waiting);
        assert!(r.session.is_none());
        assert_eq!(r.characters.len(), 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume_hand_turn_back() {
        let mut r = room(GameMode::TurnBasedStory, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.join(pid("b"), "Bo", conn(2)).unwrap();
        r.start_game(&pid("a")).unwrap();

        r.disconnect(&pid("b"), conn(2));
        assert_eq!(r.state, RoomState::InProgress);
        r.disconnect(&pid("a"), conn(1));
        assert_eq!(r.state, RoomState::Paused);
        assert!(r.session.as_ref().unwrap().turn.is_none());
        assert!(!r.timers.is_armed(&TimerKey::TurnDeadline));

        r.take_outbox();
        r.join(pid("a"), "Ana", conn(3)).unwrap();
        assert_eq!(r.state, RoomState::InProgress);
        assert_eq!(r.session.as_ref().unwrap().turn, Some(pid("a")));
        assert!(events(&mut r).contains(&ServerEvent::GameResumed { turn_player: Some(pid("a")) }));
    }

    #[tokio::test]
    async fn test_resume_skips_to_next_when_last_holder_absent() {
        let mut r = room(GameMode::TurnBasedStory, 4);
        r.join(pid("a"), "Ana", conn(1)).unwrap();
        r.join(pid("b"), "Bo", conn(2)).unwrap();
        r.start_game(&pid("a")).unwrap();
        r.disconnect(&pid("b"), conn(2));
        r.disconnect(&pid("a"), conn(1));

        r.join(pid("b"), "Bo", conn(3)).unwrap();
        assert_eq!(r.session.as_ref().unwrap().turn, Some(pid("b")));
    }
}
