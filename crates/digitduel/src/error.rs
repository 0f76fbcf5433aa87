//! Unified error type for the Digit Duel server.

use digitduel_protocol::ProtocolError;
use digitduel_room::RoomError;
use digitduel_session::SessionError;
use digitduel_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum DigitDuelError {
    /// Connection, send, or receive failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode, or handshake protocol failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or session bookkeeping failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use digitduel_protocol::RoomId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wrapped: DigitDuelError = err.into();
        assert!(matches!(wrapped, DigitDuelError::Transport(_)));
        assert!(wrapped.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let wrapped: DigitDuelError = err.into();
        assert!(matches!(wrapped, DigitDuelError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let wrapped: DigitDuelError = err.into();
        assert!(matches!(wrapped, DigitDuelError::Session(_)));
    }

    #[test]
    fn test_from_room_error_keeps_message() {
        let err = RoomError::NotFound(RoomId::new("K7QX2M"));
        let wrapped: DigitDuelError = err.into();
        assert!(matches!(wrapped, DigitDuelError::Room(_)));
        assert_eq!(wrapped.to_string(), "room K7QX2M not found");
    }
}
