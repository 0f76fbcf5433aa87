//! The Digit Duel game engine.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! seats, secrets, guess history, and reconnect timers.
//!
//! # Key types
//!
//! - [`SessionRegistry`] creates rooms, looks them up by id, routes operations
//! - [`RoomHandle`] sends commands to a running room actor
//! - [`RoomDirectory`] the lobby view, pushed to watching clients
//! - [`feedback`] scores a guess against a secret
//! - [`RoomConfig`] grace window, idle timeout, room limits

mod config;
mod directory;
mod error;
pub mod feedback;
mod presence;
mod registry;
mod room;
mod supervisor;

pub use config::RoomConfig;
pub use directory::RoomDirectory;
pub use error::RoomError;
pub use feedback::{Code, Score, Verdict};
pub use registry::SessionRegistry;
pub use room::{ConnectionHandle, EventSender, RoomHandle, RoomSummary};
