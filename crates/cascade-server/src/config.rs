//! Server configuration

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use cascade_protocol::{Board, BoardError, PLAYER_COLORS, ROOM_CODE_MAX_LEN, ROOM_CODE_MIN_LEN};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Maximum simultaneous connections across all rooms
    pub max_clients: usize,
    /// Board height for new games
    pub board_rows: u32,
    /// Board width for new games
    pub board_columns: u32,
    /// Minimum roster size to start a game
    pub min_players: usize,
    /// Maximum roster size per room
    pub max_players: usize,
    /// Grace period before a dropped player forfeits
    pub disconnect_grace_secs: u64,
    /// Lifetime of a room nobody has joined
    pub empty_room_ttl_secs: u64,
    /// Length of generated room codes
    pub room_code_length: usize,
    /// Messages allowed per client per window
    pub rate_limit_messages: u32,
    pub rate_limit_window_ms: u64,
    pub tick_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_clients: 64,
            board_rows: 8,
            board_columns: 16,
            min_players: 2,
            max_players: PLAYER_COLORS.len(),
            disconnect_grace_secs: 30,
            empty_room_ttl_secs: 120,
            room_code_length: 6,
            rate_limit_messages: 60,
            rate_limit_window_ms: 1000,
            tick_interval_ms: 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("min_players must be at least 2 and at most max_players ({min} > {max})")]
    PlayerLimits { min: usize, max: usize },
    #[error("max_players cannot exceed the {palette} palette colours")]
    TooManyPlayers { palette: usize },
    #[error("room_code_length must be between {min} and {max}, got {found}")]
    RoomCodeLength { min: usize, max: usize, found: usize },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

impl ServerConfig {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Board::new(self.board_rows, self.board_columns)?;
        if self.min_players < 2 || self.min_players > self.max_players {
            return Err(ConfigError::PlayerLimits {
                min: self.min_players,
                max: self.max_players,
            });
        }
        if self.max_players > PLAYER_COLORS.len() {
            return Err(ConfigError::TooManyPlayers {
                palette: PLAYER_COLORS.len(),
            });
        }
        if !(ROOM_CODE_MIN_LEN..=ROOM_CODE_MAX_LEN).contains(&self.room_code_length) {
            return Err(ConfigError::RoomCodeLength {
                min: ROOM_CODE_MIN_LEN,
                max: ROOM_CODE_MAX_LEN,
                found: self.room_code_length,
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Zero {
                field: "max_clients",
            });
        }
        if self.rate_limit_window_ms == 0 {
            return Err(ConfigError::Zero {
                field: "rate_limit_window_ms",
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "tick_interval_ms",
            });
        }
        Ok(())
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn empty_room_ttl(&self) -> Duration {
        Duration::from_secs(self.empty_room_ttl_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
