//! Room configuration.

use quizhall_tick::TickConfig;

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Configuration shared by every room the manager creates.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum members allowed in a room.
    pub max_members: usize,

    /// Countdown used for each question.
    pub clock: TickConfig,

    /// Bound of each room actor's command channel. Senders wait when it
    /// is full.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_members: 4,
            clock: TickConfig::default(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.max_members, 4);
        assert_eq!(config.channel_size, 64);
        assert_eq!(config.clock.ticks, 10);
        assert_eq!(config.clock.interval, Duration::from_secs(1));
    }
}
