//! The session manager: which connection is current for each identity.
//!
//! A user may hold seats in several rooms at once, but only one live
//! connection. When they reconnect (a new handshake with the same identity)
//! the newer connection wins. A superseded connection that closes later is
//! recognised by its [`ConnectionId`] and ignored.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap` with no locking of its own; the
//! server wraps it in a `tokio::sync::Mutex` and only holds the lock for
//! the duration of a single call.

use std::collections::HashMap;

use digitduel_protocol::{Identity, UserId};
use digitduel_transport::ConnectionId;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Outcome of [`SessionManager::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// A still-open connection that this attachment superseded.
    pub replaced: Option<ConnectionId>,
}

/// Tracks every identity that is connected or recently disconnected.
///
/// ```text
/// attach() ──→ [Connected] ──detach()──→ [Disconnected] ──attach()──→ [Connected]
///                                               │
///                                    expire_stale() (after grace)
///                                               ▼
///                                          [Expired] ──→ cleanup_expired()
/// ```
pub struct SessionManager {
    sessions: HashMap<UserId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Binds `connection` as the identity's current connection.
    ///
    /// Never fails: a second device or a reconnect simply takes over.
    pub fn attach(&mut self, identity: Identity, connection: ConnectionId) -> Attachment {
        let user_id = identity.user_id.clone();
        let state = SessionState::Connected { connection };

        let replaced = match self.sessions.get_mut(&user_id) {
            Some(session) => {
                let previous = session.connection();
                session.identity = identity;
                session.state = state;
                previous
            }
            None => {
                self.sessions.insert(user_id.clone(), Session { identity, state });
                None
            }
        };

        tracing::info!(%user_id, %connection, replaced = ?replaced, "session attached");
        Attachment { replaced }
    }

    /// Marks the identity disconnected if `connection` is still its current one.
    ///
    /// Returns `Ok(true)` when the session transitioned, `Ok(false)` when
    /// `connection` had already been superseded (nothing changes).
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if the identity has no session.
    pub fn detach(
        &mut self,
        user_id: &UserId,
        connection: ConnectionId,
    ) -> Result<bool, SessionError> {
        let session = self
            .sessions
            .get_mut(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.clone()))?;

        if session.connection() != Some(connection) {
            tracing::debug!(%user_id, %connection, "stale connection closed, session untouched");
            return Ok(false);
        }

        session.state = SessionState::Disconnected {
            since: Instant::now(),
        };
        tracing::info!(%user_id, %connection, "session detached, grace period started");
        Ok(true)
    }

    /// Expires every session that has been disconnected longer than the grace period.
    ///
    /// Returns the identities that were expired.
    pub fn expire_stale(&mut self) -> Vec<UserId> {
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();

        for (user_id, session) in self.sessions.iter_mut() {
            if let SessionState::Disconnected { since } = session.state {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    expired.push(user_id.clone());
                    tracing::info!(%user_id, "session expired (grace period elapsed)");
                }
            }
        }

        expired
    }

    /// Drops expired sessions from memory.
    ///
    /// Kept separate from [`expire_stale`](Self::expire_stale) so callers can
    /// act on the expired list before the records disappear.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !matches!(session.state, SessionState::Expired));
        before - self.sessions.len()
    }

    /// Number of tracked sessions in any state.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
