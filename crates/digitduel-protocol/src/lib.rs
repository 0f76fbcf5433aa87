//! Wire protocol for Digit Duel.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Types** ([`Envelope`], [`Request`], [`Ack`], [`ServerEvent`], ...) —
//!   the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those structures are
//!   turned into bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! The protocol layer knows nothing about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session / Room (identity, game state)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Ack, AckData, CODE_LENGTH, EndReason, Envelope, ErrorKind, Feedback, GameMode,
    GuessRecord, Identity, MAX_PLAYERS, Payload, Phase, PlayerView, Request,
    RoomId, RoomListEntry, RoomListing, RoomSnapshot, ServerEvent, SystemMessage,
    UserId, WireError,
};
