//! First-responder arbitration for the buzzer quiz.
//!
//! ```text
//! Open ──first press──→ Locked ──answer──→ Resolved ──next-question──→ Open
//!                         │
//!                         └──window expires / holder removed──→ Open
//! ```
//!
//! "First" means first processed by the room actor. Presses that lose
//! are refused and leave no trace; they are not queued.

use taleroom_protocol::{BuzzerPhase, GameMode, PlayerId, Recipient, RoomState, ServerEvent};

use crate::model::{Buzzer, Room, TimerKey};
use crate::RoomError;

impl Room {
    fn buzzer(&self) -> Result<&Buzzer, RoomError> {
        if self.mode != GameMode::BuzzerQuiz {
            return Err(RoomError::InvalidState(format!("{} has no buzzer", self.mode)));
        }
        if self.state != RoomState::InProgress {
            return Err(RoomError::InvalidState(format!("game is {}", self.state)));
        }
        self.session
            .as_ref()
            .and_then(|s| s.buzzer.as_ref())
            .ok_or_else(|| RoomError::InvalidState("no buzzer in play".into()))
    }

    fn buzzer_mut(&mut self) -> Option<&mut Buzzer> {
        self.session.as_mut().and_then(|s| s.buzzer.as_mut())
    }

    pub(crate) fn press_buzzer(&mut self, by: &PlayerId) -> Result<(), RoomError> {
        match self.buzzer()?.phase {
            BuzzerPhase::Open => {}
            BuzzerPhase::Locked => return Err(RoomError::BuzzerAlreadyHeld),
            BuzzerPhase::Resolved => return Err(RoomError::AnswerWindowClosed),
        }
        let window = self.config.buzzer_window;
        if let Some(buzzer) = self.buzzer_mut() {
            buzzer.phase = BuzzerPhase::Locked;
            buzzer.holder = Some(by.clone());
        }
        self.timers.arm(TimerKey::BuzzerWindow, window);
        tracing::debug!(room = %self.code, player = %by, "buzzer locked");
        self.emit(
            Recipient::All,
            ServerEvent::BuzzerLocked {
                player_id: by.clone(),
                window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
            },
        );
        self.touch();
        Ok(())
    }

    pub(crate) fn submit_buzzer_answer(&mut self, by: &PlayerId, option: usize) -> Result<(), RoomError> {
        let buzzer = self.buzzer()?;
        match (&buzzer.phase, &buzzer.holder) {
            (BuzzerPhase::Locked, Some(holder)) if holder == by => {}
            (BuzzerPhase::Locked, _) => return Err(RoomError::BuzzerAlreadyHeld),
            _ => return Err(RoomError::AnswerWindowClosed),
        }
        // The window may have run out while this request was queued
        // behind others; the timer has not been processed yet.
        let open = self
            .timers
            .remaining(&TimerKey::BuzzerWindow)
            .is_some_and(|left| !left.is_zero());
        if !open {
            return Err(RoomError::AnswerWindowClosed);
        }
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RoomError::InvalidState("no game session".into()))?;
        let question = session
            .current_question()
            .ok_or_else(|| RoomError::InvalidState("no question in play".into()))?;
        if option >= question.options.len() {
            return Err(RoomError::Validation(format!("option {option} out of range")));
        }
        let correct = question.is_correct(option);

        if correct {
            session.award(by);
        } else {
            session.record_wrong(by);
        }
        if let Some(buzzer) = session.buzzer.as_mut() {
            buzzer.phase = BuzzerPhase::Resolved;
            buzzer.holder = None;
        }
        let scores = session.scores.clone();
        self.timers.cancel(&TimerKey::BuzzerWindow);
        tracing::debug!(room = %self.code, player = %by, correct, "buzzer answer graded");
        self.emit(
            Recipient::All,
            ServerEvent::BuzzerResolved { player_id: by.clone(), option, correct, scores },
        );
        self.touch();
        Ok(())
    }

    /// The answer window ran out with no answer: reopen the floor with
    /// no penalty.
    pub(crate) fn on_buzzer_window_expired(&mut self) {
        let holder = match self.buzzer_mut() {
            Some(b) if b.phase == BuzzerPhase::Locked => b.holder.clone(),
            _ => return,
        };
        if let Some(holder) = holder {
            tracing::debug!(room = %self.code, player = %holder, "buzzer window expired");
        }
        self.reopen_buzzer();
        self.touch();
    }

    /// Back to `Open`, announcing the holder's lost window.
    pub(crate) fn reopen_buzzer(&mut self) {
        self.timers.cancel(&TimerKey::BuzzerWindow);
        let Some(buzzer) = self.buzzer_mut() else {
            return;
        };
        if buzzer.phase != BuzzerPhase::Locked {
            return;
        }
        buzzer.phase = BuzzerPhase::Open;
        if let Some(holder) = buzzer.holder.take() {
            self.emit(Recipient::All, ServerEvent::BuzzerTimeout { player_id: holder });
        }
    }

    /// Host only, and only once the current question is resolved.
    pub(crate) fn next_question(&mut self, by: &PlayerId) -> Result<(), RoomError> {
        self.require_host(by)?;
        if self.buzzer()?.phase != BuzzerPhase::Resolved {
            return Err(RoomError::InvalidState("current question is not resolved".into()));
        }
        if self.advance_item() {
            self.finish_game();
        } else if let Some(buzzer) = self.buzzer_mut() {
            buzzer.phase = BuzzerPhase::Open;
        }
        self.touch();
        Ok(())
    }
}
