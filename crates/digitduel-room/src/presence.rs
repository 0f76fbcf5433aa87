//! Typing indicator relay.
//!
//! Presence updates are ephemeral: they are never acknowledged, never stored,
//! and never change game state. The room forwards them to the other occupant
//! only.

use digitduel_protocol::{CODE_LENGTH, RoomId, ServerEvent};

/// Builds the event forwarded to the opponent.
///
/// The in-progress input is trimmed to the code length so a client cannot
/// use the relay as a free-form chat channel.
pub(crate) fn typing_update(room_id: &RoomId, is_typing: bool, current_input: &str) -> ServerEvent {
    let current_input = if is_typing {
        current_input.chars().take(CODE_LENGTH).collect()
    } else {
        String::new()
    };
    ServerEvent::TypingUpdate {
        room_id: room_id.clone(),
        is_typing,
        current_input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_of(event: ServerEvent) -> (bool, String) {
        match event {
            ServerEvent::TypingUpdate { is_typing, current_input, .. } => (is_typing, current_input),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_typing_update_passes_short_input_through() {
        let event = typing_update(&RoomId::new("R"), true, "123");
        assert_eq!(input_of(event), (true, "123".to_string()));
    }

    #[test]
    fn test_typing_update_truncates_long_input() {
        let event = typing_update(&RoomId::new("R"), true, "1234567890");
        assert_eq!(input_of(event).1, "12345");
    }

    #[test]
    fn test_typing_update_stopped_clears_input() {
        let event = typing_update(&RoomId::new("R"), false, "123");
        assert_eq!(input_of(event), (false, String::new()));
    }
}
