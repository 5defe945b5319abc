use cascade_protocol::{BoardError, GameState, ReplayEntry, ReplayFile, REPLAY_VERSION};
use thiserror::Error;

use crate::game::{apply_move, forfeit, new_game, MoveError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("unsupported replay version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("entry {index}: {source}")]
    IllegalMove {
        index: usize,
        #[source]
        source: MoveError,
    },
    #[error("entry {index}: {player} is not on the active roster")]
    UnknownForfeit { index: usize, player: String },
}

/// Rebuild the final state of a recorded match by re-applying every entry in order.
pub fn replay(file: &ReplayFile) -> Result<GameState, ReplayError> {
    if file.version != REPLAY_VERSION {
        return Err(ReplayError::UnsupportedVersion {
            found: file.version,
            expected: REPLAY_VERSION,
        });
    }

    let mut state = new_game(file.players.clone(), file.rows, file.columns)?;
    for (index, entry) in file.entries.iter().enumerate() {
        state = match entry {
            ReplayEntry::Move { mv } => {
                apply_move(&state, mv)
                    .map_err(|source| ReplayError::IllegalMove { index, source })?
                    .state
            }
            ReplayEntry::Forfeit { player_id } => {
                forfeit(&state, player_id).ok_or_else(|| ReplayError::UnknownForfeit {
                    index,
                    player: player_id.to_string(),
                })?
            }
        };
    }
    Ok(state)
}
