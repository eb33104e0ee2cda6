//! Scheduling primitives for a room actor.
//!
//! A room has exactly two sources of work that are not triggered by a
//! client request:
//!
//! - [`TickScheduler`]: a fixed-rate clock. The position broadcaster
//!   flushes coalesced movement once per tick and parks the clock when
//!   nothing is pending.
//! - [`DeadlineTimers`]: every one-shot deadline the room owns (turn
//!   clock, buzzer answer window, reconnect grace per player), keyed so
//!   that re-arming or cancelling always acts on the one timer that
//!   guards a given piece of state.
//!
//! Both pend forever when idle, so they sit next to the command channel
//! in the actor's `tokio::select!`:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* apply request */ }
//!         expired = timers.next_expired() => { /* apply timeout */ }
//!         _ = flush.wait_for_tick() => { /* relay positions */ }
//!     }
//! }
//! ```

mod scheduler;
mod timers;

pub use scheduler::{TickConfig, TickInfo, TickScheduler};
pub use timers::{DeadlineTimers, Expired};
