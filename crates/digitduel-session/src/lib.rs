//! Caller identity and connection sessions for Digit Duel.
//!
//! 1. **Authentication** — Digit Duel does not issue or verify identities.
//!    The [`Authenticator`] trait is the seam where an external provider
//!    turns a handshake token into a verified [`Identity`](digitduel_protocol::Identity).
//! 2. **Session tracking** — [`SessionManager`] knows which connection is
//!    current for every identity, and when an identity went away.
//!
//! # How it fits in the stack
//!
//! ```text
//! Room layer (above)     ← per-room seats, grace windows, forfeits
//!     ↕
//! Session layer (this)   ← identity → current connection
//!     ↕
//! Protocol / Transport   ← Identity, ConnectionId
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, TrustedTokenAuthenticator};
pub use error::SessionError;
pub use manager::{Attachment, SessionManager};
pub use session::{Session, SessionConfig, SessionState};
