use serde::{Deserialize, Serialize};

use crate::{Coord, PlayerId};

/// Colours a player may pick in the lobby.
pub const PLAYER_COLORS: [&str; 6] = ["red", "green", "blue", "yellow", "cyan", "magenta"];

pub fn is_palette_color(color: &str) -> bool {
    PLAYER_COLORS.contains(&color)
}

/// Lobby roster entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_letter: Option<char>,
    #[serde(default)]
    pub color: Option<String>,
    /// Assigned by the server; whatever a client sends here is ignored.
    #[serde(default)]
    pub is_owner: bool,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            display_letter: None,
            color: None,
            is_owner: false,
        }
    }

    pub fn with_letter(mut self, letter: char) -> Self {
        self.display_letter = Some(letter);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Colour used for explosion events; empty when none was chosen.
    pub fn color_or_default(&self) -> &str {
        self.color.as_deref().unwrap_or("")
    }
}

/// A single orb placement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub x: u32,
    pub y: u32,
    pub player_id: PlayerId,
}

impl Move {
    pub fn new(x: u32, y: u32, player_id: impl Into<PlayerId>) -> Self {
        Self {
            x,
            y,
            player_id: player_id.into(),
        }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}
