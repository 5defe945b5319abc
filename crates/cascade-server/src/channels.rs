//! Renet channels and connection settings.

use std::time::Duration;

use renet::{ChannelConfig, ConnectionConfig, SendType};

use crate::protocol::ServerMessage;

pub mod channel_id {
    /// Room traffic and game state, in order.
    pub const COMMANDS: u8 = 0;
    /// Ping/pong.
    pub const HEARTBEAT: u8 = 1;
}

const COMMAND_MEMORY: usize = 5 * 1024 * 1024;
const HEARTBEAT_MEMORY: usize = 64 * 1024;
const BYTES_PER_TICK: u64 = 60_000;

pub fn create_channel_configs() -> Vec<ChannelConfig> {
    vec![
        ChannelConfig {
            channel_id: channel_id::COMMANDS,
            max_memory_usage_bytes: COMMAND_MEMORY,
            send_type: SendType::ReliableOrdered {
                resend_time: Duration::from_millis(300),
            },
        },
        ChannelConfig {
            channel_id: channel_id::HEARTBEAT,
            max_memory_usage_bytes: HEARTBEAT_MEMORY,
            send_type: SendType::Unreliable,
        },
    ]
}

/// Same channel layout in both directions.
pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        available_bytes_per_tick: BYTES_PER_TICK,
        server_channels_config: create_channel_configs(),
        client_channels_config: create_channel_configs(),
    }
}

/// Pongs go out unreliably; everything else must arrive.
pub fn channel_for(message: &ServerMessage) -> u8 {
    match message {
        ServerMessage::Pong { .. } => channel_id::HEARTBEAT,
        _ => channel_id::COMMANDS,
    }
}
