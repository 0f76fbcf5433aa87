//! Core protocol types for Digit Duel's wire format.
//!
//! Everything in this module is serialized to JSON and sent over a
//! connection. Names follow the client SDK's camelCase convention; tagged
//! enums carry their variant in a `"type"` field.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of digits in a secret or a guess.
pub const CODE_LENGTH: usize = 5;

/// Occupant slots per room.
pub const MAX_PLAYERS: usize = 2;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque, externally verified user identifier.
///
/// The engine never inspects the contents. It is whatever the
/// authentication collaborator handed back for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short room code handed out at creation and typed in by the joiner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verified caller: stable id plus the name shown to opponents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Game vocabulary
// ---------------------------------------------------------------------------

/// Clue style, fixed when the room is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Clues report exact, misplaced and out-of-place counts.
    #[default]
    Standard,
    /// Clues report only how many digits are correct, wherever they sit.
    Hard,
}

/// Room lifecycle phase.
///
/// ```text
/// waiting ──(2nd join)──→ setup ──(both secrets)──→ playing ──(solved / forfeit)──→ finished
///    ↑                      │
///    └──────(leave)─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Setup,
    Playing,
    Finished,
}

impl Phase {
    /// Only waiting rooms show up in the "available" listing.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether an opponent's absence can cost the game.
    pub fn is_contested(self) -> bool {
        matches!(self, Self::Setup | Self::Playing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Setup => "setup",
            Self::Playing => "playing",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// The clue returned for a guess. Its shape depends on the room's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Feedback {
    Standard {
        exact: u8,
        misplaced: u8,
        out_of_place: u8,
    },
    Hard {
        total_correct: u8,
    },
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// The winner guessed the opponent's secret.
    Solved,
    /// The opponent left or failed to come back within the grace window.
    Forfeit,
}

/// One accepted guess as recorded in the room's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessRecord {
    pub guess: String,
    pub feedback: Feedback,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub player_id: UserId,
}

// ---------------------------------------------------------------------------
// Room views
// ---------------------------------------------------------------------------

/// An occupant as other clients see them. Secrets never leave the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub user_id: UserId,
    pub display_name: String,
    pub connected: bool,
    pub has_secret: bool,
    pub is_host: bool,
}

/// Everything a client needs to redraw a room after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub mode: GameMode,
    pub phase: Phase,
    pub host_id: Option<UserId>,
    pub host_name: Option<String>,
    pub players: Vec<PlayerView>,
    pub max_players: usize,
    pub current_turn: Option<UserId>,
    pub winner: Option<UserId>,
    /// Both players' guesses in the order the room accepted them.
    pub guesses: Vec<GuessRecord>,
}

/// A room as it appears in a lobby listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListEntry {
    pub room_id: RoomId,
    pub host_name: String,
    pub mode: GameMode,
    pub players: usize,
    pub max_players: usize,
}

/// The caller's personal lobby view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    /// Rooms where the caller sits in the host slot.
    pub hosted: Vec<RoomListEntry>,
    /// Rooms where the caller sits in the guest slot.
    pub joined: Vec<RoomListEntry>,
    /// Waiting rooms the caller could join. Never contains the caller's own rooms.
    pub available: Vec<RoomListEntry>,
}

// ---------------------------------------------------------------------------
// Requests (client → server)
// ---------------------------------------------------------------------------

/// A command from an authenticated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    CreateRoom {
        #[serde(default)]
        mode: GameMode,
    },
    JoinRoom {
        room_id: RoomId,
    },
    SubmitSecret {
        room_id: RoomId,
        value: String,
    },
    SubmitGuess {
        room_id: RoomId,
        value: String,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    CheckRoomStatus {
        room_id: RoomId,
    },
    ListAvailableRooms,
    ListMyRooms,
    GetSnapshot {
        room_id: RoomId,
    },
    /// Start or stop receiving `roomListing` pushes.
    WatchRooms {
        enabled: bool,
    },
    /// Best-effort typing indicator. Never acknowledged.
    Typing {
        room_id: RoomId,
        is_typing: bool,
        #[serde(default)]
        current_input: String,
    },
}

impl Request {
    /// Whether the server answers this request with an [`Ack`].
    pub fn expects_ack(&self) -> bool {
        !matches!(self, Self::Typing { .. })
    }
}

// ---------------------------------------------------------------------------
// Acknowledgments (server → client, one per request)
// ---------------------------------------------------------------------------

/// Error category reported in a failed acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed secret or guess.
    Validation,
    /// Operation not allowed in the room's current phase.
    State,
    /// Not the caller's turn.
    Turn,
    /// Unknown room.
    NotFound,
    /// Room already has two occupants, or the server is at its room cap.
    Capacity,
    /// Secret or seat already registered for this identity.
    Duplicate,
    /// Caller does not occupy the room.
    NotInRoom,
    /// The room is shutting down.
    Unavailable,
    /// The room hit an internal fault while processing the request.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Typed result data carried by a successful acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AckData {
    RoomCreated {
        room_id: RoomId,
    },
    RoomJoined {
        room_id: RoomId,
        host_name: String,
        players: usize,
        max_players: usize,
    },
    GuessAccepted {
        feedback: Feedback,
    },
    RoomStatus {
        is_ready: bool,
    },
    RoomList {
        rooms: Vec<RoomListEntry>,
    },
    MyRooms {
        listing: RoomListing,
    },
    Snapshot {
        snapshot: RoomSnapshot,
    },
}

/// The `{success, error?, data?}` reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AckData>,
}

impl Ack {
    /// A success with no payload (`submitSecret`, `leaveRoom`, ...).
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    pub fn with_data(data: AckData) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(WireError {
                kind,
                message: message.into(),
            }),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Push events (server → client)
// ---------------------------------------------------------------------------

/// A server-initiated notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Both seats are filled; secrets may now be submitted.
    RoomReady {
        room_id: RoomId,
    },
    /// Both secrets are in; `current_turn` guesses first.
    GameStarted {
        room_id: RoomId,
        current_turn: UserId,
    },
    GuessSubmitted {
        room_id: RoomId,
        guess: GuessRecord,
    },
    GameEnded {
        room_id: RoomId,
        winner: UserId,
        reason: EndReason,
    },
    PlayerJoined {
        room_id: RoomId,
        player_id: UserId,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: UserId,
    },
    /// The opponent's connection dropped. Informational: the grace window is running.
    PlayerDisconnected {
        room_id: RoomId,
        player_id: UserId,
    },
    PlayerReconnected {
        room_id: RoomId,
        player_id: UserId,
    },
    TypingUpdate {
        room_id: RoomId,
        is_typing: bool,
        current_input: String,
    },
    /// Full room state, pushed to a client that just reattached.
    RoomSnapshot {
        snapshot: RoomSnapshot,
    },
    /// Updated lobby view for a client watching the directory.
    RoomListing {
        listing: RoomListing,
    },
}

// ---------------------------------------------------------------------------
// SystemMessage — connection plumbing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SystemMessage {
    /// Client → Server, first frame. `token` is passed to the authenticator.
    Handshake { version: u32, token: Option<String> },

    /// Server → Client: the identity attached to this connection.
    HandshakeAck {
        user_id: UserId,
        display_name: String,
        server_time: u64,
    },

    /// Either direction: orderly goodbye.
    Disconnect { reason: String },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Server → Client: connection-level failure. HTTP-style `code`
    /// (400 bad request, 401 unauthorized).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Payload {
    System(SystemMessage),
    /// Client → Server command; `id` is echoed in the matching [`Ack`].
    Request { id: u64, request: Request },
    Ack { id: u64, ack: Ack },
    Event(ServerEvent),
}

/// The top-level frame. Every message on the wire is an `Envelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,
    /// Sender's wall clock, in milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
