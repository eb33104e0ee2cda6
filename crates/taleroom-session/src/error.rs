//! Error types for the session layer.

use taleroom_protocol::PlayerId;
use taleroom_transport::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the player (never claimed, or cleaned up).
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The connection no longer speaks for the player.
    #[error("{connection} was replaced as the connection for player {player}")]
    Replaced {
        player: PlayerId,
        connection: ConnectionId,
    },
}
