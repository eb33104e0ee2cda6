//! Wire protocol for Taleroom.
//!
//! - **Identity** ([`PlayerId`], [`RoomCode`], [`CharacterId`]):
//!   validated newtypes that serialize as bare strings.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`ErrorKind`]): the
//!   catalog of everything a client may ask and everything the engine
//!   may announce.
//! - **Snapshots** ([`RoomSnapshot`] and friends): the full state a
//!   client needs to rebuild a room without replaying history.
//! - **Framing** ([`Envelope`], [`Codec`], [`JsonCodec`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientEvent>) → Room engine
//! ```

mod codec;
mod error;
mod events;
mod snapshot;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, ErrorKind, Selection, ServerEvent};
pub use snapshot::{
    BuzzerSnapshot, Facing, PlayerSummary, Point, PositionUpdate, RoomSnapshot, SessionSnapshot,
    StoryEntry,
};
pub use types::{
    BuzzerPhase, Channel, CharacterId, ConnectionStatus, Envelope, GameMode, PlayerId, Recipient,
    RoomCode, RoomState, MAX_PLAYER_ID_LEN, PROTOCOL_VERSION, ROOM_CODE_ALPHABET, ROOM_CODE_LEN,
};
