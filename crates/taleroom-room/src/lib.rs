//! The Taleroom engine.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! players, its game session and its timers, and applies every request
//! strictly one at a time in arrival order. That single writer is what
//! makes "first buzz wins" and "one player per character" well defined
//! without any further locking.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates and finds rooms; [`close_empty_rooms`] reaps them
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomRequest`]: the player actions a room understands
//! - [`RoomOutbound`]: what a room delivers to a connection
//! - [`ContentSource`] / [`Catalog`]: characters, questions and story
//! - [`RoomConfig`] / [`RegistryConfig`]: timings and limits
//!
//! # Inside a room
//!
//! | Concern | Module |
//! |---|---|
//! | join, leave, grace, host migration | `membership` |
//! | exclusive characters | `characters` |
//! | start, pause, finish, lobby | `game` |
//! | turn ownership | `turns` |
//! | buzzer arbitration | `buzzer` |
//! | movement relay | `position` |
//! | fan-out to connections | `events` |

mod buzzer;
mod characters;
mod config;
mod content;
mod error;
mod events;
mod game;
mod manager;
mod membership;
mod model;
mod position;
mod room;
mod turns;

#[cfg(test)]
mod testing;

pub use config::{duration_ms, RegistryConfig, RoomConfig, MAX_CAPACITY};
pub use content::{Catalog, ContentSource, Question, StoryCheckpoint};
pub use error::RoomError;
pub use events::{PlayerSender, RoomOutbound};
pub use manager::{close_empty_rooms, random_room_code, CodeGenerator, RoomRegistry};
pub use membership::{JoinOutcome, MAX_NAME_LEN};
pub use room::{RoomHandle, RoomInfo, RoomRequest};
