//! # Digit Duel
//!
//! Server for a turn-based, two-player number-deduction game. Each player
//! holds a secret five-digit code; players take turns guessing the
//! opponent's code and get a clue back for every guess.
//!
//! This crate ties the layers together:
//!
//! ```text
//! Transport (WebSocket) → Protocol (Envelope) → Session (identity) → Room (game)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use digitduel::prelude::*;
//!
//! # async fn run() -> Result<(), DigitDuelError> {
//! let server = DigitDuelServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(TrustedTokenAuthenticator)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::DigitDuelError;
pub use server::{DigitDuelServer, DigitDuelServerBuilder, PROTOCOL_VERSION, ServerConfig};

/// Everything needed to run a server or talk to one.
pub mod prelude {
    pub use crate::{
        DigitDuelError, DigitDuelServer, DigitDuelServerBuilder, PROTOCOL_VERSION, ServerConfig,
    };
    pub use digitduel_protocol::{
        Ack, AckData, Codec, EndReason, Envelope, ErrorKind, Feedback, GameMode, GuessRecord,
        Identity, JsonCodec, Payload, Phase, PlayerView, ProtocolError, Request, RoomId,
        RoomListEntry, RoomListing, RoomSnapshot, ServerEvent, SystemMessage, UserId, WireError,
    };
    pub use digitduel_room::{RoomConfig, RoomError, SessionRegistry};
    pub use digitduel_session::{
        Authenticator, SessionConfig, SessionError, TrustedTokenAuthenticator,
    };
    pub use digitduel_transport::TransportError;
}
