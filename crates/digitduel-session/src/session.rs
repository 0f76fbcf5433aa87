//! Session types: the server's record of one identity's connection.

use std::time::Duration;

use digitduel_protocol::Identity;
use digitduel_transport::ConnectionId;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing for server-level session bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a disconnected identity is remembered before the sweep
    /// removes it.
    ///
    /// Default: 30 seconds, matching the room grace window.
    pub reconnect_grace: Duration,

    /// How often the server sweeps expired sessions.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// ```text
///   Connected ──(detach)──→ Disconnected ──(grace elapsed)──→ Expired
///       ↑                        │
///       └───────(attach)─────────┘
/// ```
///
/// Uses Tokio's `Instant` so tests can drive the clock with `time::pause`.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// The identity has a live connection.
    Connected { connection: ConnectionId },

    /// The last connection dropped at `since`.
    Disconnected { since: Instant },

    /// Grace elapsed; the next sweep removes the session.
    Expired,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub state: SessionState,
}

impl Session {
    /// The live connection, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self.state {
            SessionState::Connected { connection } => Some(connection),
            _ => None,
        }
    }
}
