//! Unified error type for the Taleroom server.

use taleroom_protocol::{ErrorKind, ProtocolError};
use taleroom_room::RoomError;
use taleroom_session::SessionError;
use taleroom_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TaleroomError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The client did not open with a valid `hello`.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl TaleroomError {
    /// The wire kind reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Room(e) => e.kind(),
            Self::Session(SessionError::Replaced { .. }) => ErrorKind::SessionReplaced,
            Self::Session(SessionError::NotFound(_)) => ErrorKind::InvalidState,
            Self::Protocol(_) | Self::Handshake(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use taleroom_protocol::{PlayerId, RoomCode};
    use taleroom_transport::ConnectionId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: TaleroomError = TransportError::ConnectionClosed("gone".into()).into();
        assert!(matches!(err, TaleroomError::Transport(_)));
        assert!(err.to_string().contains("gone"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_room_errors_keep_their_kind() {
        let code = RoomCode::parse("AB12CD").unwrap();
        let err: TaleroomError = RoomError::RoomFull(code).into();
        assert_eq!(err.kind(), ErrorKind::RoomFull);
        assert_eq!(err.to_string(), RoomError::RoomFull(RoomCode::parse("AB12CD").unwrap()).to_string());
    }

    #[test]
    fn test_replaced_session_maps_to_session_replaced() {
        let err: TaleroomError = SessionError::Replaced {
            player: PlayerId::new("ana").unwrap(),
            connection: ConnectionId::new(3),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::SessionReplaced);
    }

    #[test]
    fn test_handshake_failure_is_validation() {
        assert_eq!(TaleroomError::Handshake("no hello".into()).kind(), ErrorKind::Validation);
    }
}
