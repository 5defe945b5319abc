use serde::{Deserialize, Serialize};

use crate::{Board, Player, PlayerId};

/// Authoritative match state. Each accepted move produces a new value; readers never see a
/// partially resolved board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Active roster in turn order. Eliminated and departed players are removed.
    pub players: Vec<Player>,
    pub current_player_index: usize,
    pub board: Board,
    pub is_game_over: bool,
    /// Set while a move is in flight; a second move is refused until it clears.
    #[serde(default)]
    pub resolving: bool,
    /// Players that have placed at least one orb. Only these can be eliminated.
    #[serde(default)]
    pub placed: Vec<PlayerId>,
    /// Number of accepted moves so far.
    #[serde(default)]
    pub move_number: u32,
}

impl GameState {
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_player_index)
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn position_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    pub fn has_placed(&self, id: &PlayerId) -> bool {
        self.placed.contains(id)
    }

    /// The remaining player once the game is over.
    pub fn winner(&self) -> Option<&Player> {
        if !self.is_game_over || self.players.len() != 1 {
            return None;
        }
        self.players.first()
    }
}
