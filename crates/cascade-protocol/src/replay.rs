use serde::{Deserialize, Serialize};

use crate::{Move, Player, PlayerId};

pub const REPLAY_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFile {
    /// Replay file schema version.
    pub version: u32,
    pub rows: u32,
    pub columns: u32,
    /// Roster at game start, in turn order.
    pub players: Vec<Player>,
    #[serde(default)]
    pub entries: Vec<ReplayEntry>,
}

/// Every state transition a room applied, in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ReplayEntry {
    Move {
        #[serde(rename = "move")]
        mv: Move,
    },
    Forfeit { player_id: PlayerId },
}
