//! Room configuration.

use std::time::Duration;

/// Settings shared by the registry and every room it spawns.
///
/// Override individual fields with struct-update syntax:
///
/// ```rust
/// use std::time::Duration;
/// use digitduel_room::RoomConfig;
///
/// let config = RoomConfig {
///     reconnect_grace: Duration::from_secs(45),
///     ..RoomConfig::default()
/// };
/// assert_eq!(config.max_rooms, 10_000);
/// ```
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long a dropped occupant may take to reconnect before forfeiting.
    pub reconnect_grace: Duration,

    /// A room with no accepted command for this long is destroyed.
    pub idle_timeout: Duration,

    /// How long a finished room stays around so clients can read the result.
    pub finished_retention: Duration,

    /// Bounded command queue per room actor.
    pub command_buffer: usize,

    /// Upper bound on live rooms. `create` fails with a capacity error beyond it.
    pub max_rooms: usize,

    /// Length of generated room codes.
    pub room_code_length: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30 * 60),
            finished_retention: Duration::from_secs(60),
            command_buffer: 64,
            max_rooms: 10_000,
            room_code_length: 6,
        }
    }
}
