//! Exclusive character assignment.
//!
//! Requests reach a room one at a time, so "who got the slot first" is
//! simply whichever request the actor processed first. A later request
//! for a taken slot is refused, never applied over the holder.

use taleroom_protocol::{CharacterId, PlayerId, Recipient, ServerEvent};

use crate::model::Room;
use crate::RoomError;

impl Room {
    pub(crate) fn select_character(
        &mut self,
        by: &PlayerId,
        character: CharacterId,
    ) -> Result<(), RoomError> {
        if !self.catalog.contains(&character) {
            return Err(RoomError::Validation(format!(
                "{character} is not a character of {}",
                self.mode
            )));
        }
        let idx = self
            .index_of(by)
            .ok_or_else(|| RoomError::NotInRoom(by.clone(), self.code.clone()))?;
        // Disconnected players inside their grace period keep their slot.
        match self.characters.get(&character) {
            Some(owner) if owner == by => return Ok(()),
            Some(_) => return Err(RoomError::CharacterUnavailable(character)),
            None => {}
        }

        if let Some(old) = self.players[idx].character.replace(character.clone()) {
            self.characters.remove(&old);
            self.emit(
                Recipient::All,
                ServerEvent::CharacterReleased { player_id: by.clone(), character: old },
            );
        }
        self.characters.insert(character.clone(), by.clone());
        tracing::debug!(room = %self.code, player = %by, %character, "character selected");
        self.emit(
            Recipient::All,
            ServerEvent::CharacterSelected { player_id: by.clone(), character },
        );
        self.touch();
        Ok(())
    }

    pub(crate) fn release_character(&mut self, by: &PlayerId) -> Result<(), RoomError> {
        let idx = self
            .index_of(by)
            .ok_or_else(|| RoomError::NotInRoom(by.clone(), self.code.clone()))?;
        let character = self.players[idx]
            .character
            .take()
            .ok_or_else(|| RoomError::InvalidState("no character selected".into()))?;
        self.characters.remove(&character);
        self.emit(
            Recipient::All,
            ServerEvent::CharacterReleased { player_id: by.clone(), character },
        );
        self.touch();
        Ok(())
    }

    /// Catalog characters nobody holds, in catalog order.
    pub(crate) fn available_characters(&self) -> Vec<CharacterId> {
        self.catalog
            .iter()
            .filter(|c| !self.characters.contains_key(*c))
            .cloned()
            .collect()
    }
}
