//! Error types for the room layer.

use digitduel_protocol::{ErrorKind, Phase, RoomId, UserId};

/// Errors returned by room and registry operations.
///
/// None of these end the room; each one is answered on the caller's
/// acknowledgment and the room carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// A secret or guess is not exactly five digits.
    #[error("invalid code: {0}")]
    Validation(String),

    /// The operation is not allowed in the room's current phase.
    #[error("cannot {action} while room {room_id} is {phase}")]
    State {
        room_id: RoomId,
        phase: Phase,
        action: &'static str,
    },

    /// A guess arrived from the player who does not hold the turn.
    #[error("not your turn in room {0}")]
    Turn(RoomId),

    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// Both seats are taken.
    #[error("room {0} is full")]
    Capacity(RoomId),

    /// The server already hosts as many rooms as it is configured for.
    #[error("server room limit reached")]
    ServerFull,

    /// The identity already holds a seat in this room.
    #[error("player {0} already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    /// The identity already submitted a secret in this room.
    #[error("secret already submitted by {0} in room {1}")]
    SecretAlreadySet(UserId, RoomId),

    /// The identity holds no seat in this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(UserId, RoomId),

    /// The room's actor is gone or shutting down.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The room hit an internal fault while handling the command.
    #[error("internal error in room {0}")]
    Internal(RoomId),
}

impl RoomError {
    /// Wire category for the acknowledgment.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::State { .. } => ErrorKind::State,
            Self::Turn(_) => ErrorKind::Turn,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Capacity(_) | Self::ServerFull => ErrorKind::Capacity,
            Self::AlreadyInRoom(..) | Self::SecretAlreadySet(..) => ErrorKind::Duplicate,
            Self::NotInRoom(..) => ErrorKind::NotInRoom,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
