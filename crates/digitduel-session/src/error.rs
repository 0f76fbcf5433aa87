//! Error types for the session layer.

use digitduel_protocol::UserId;

/// Errors that can occur while authenticating or tracking sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The authenticator rejected the handshake token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given identity.
    #[error("no session for user {0}")]
    NotFound(UserId),
}
