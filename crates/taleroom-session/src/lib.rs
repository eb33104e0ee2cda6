//! Connection identity for Taleroom.
//!
//! Players bring their own ids. What this crate decides is which
//! physical connection currently speaks for an id:
//!
//! 1. **Claiming**: a `hello` binds a connection to a player id. If the
//!    id was bound elsewhere, the newer connection wins and the older
//!    one is reported back so it can be invalidated.
//! 2. **Releasing**: when a connection goes away it unbinds the id,
//!    but only if it is still the current one, so a stale socket closing
//!    late never disconnects its replacement.
//! 3. **Grace**: a released id keeps its room memberships until the
//!    reconnect grace runs out.
//!
//! ```text
//! Room engine (above)  ← told which connection is live for a player
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Transport (below)    ← provides ConnectionId
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::{Claim, SessionManager};
pub use session::{Session, SessionConfig, SessionState};
