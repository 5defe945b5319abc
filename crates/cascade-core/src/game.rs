use cascade_protocol::{Board, BoardError, ExplosionEvent, GameState, Move, Player, PlayerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::resolve;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("game is already over")]
    GameOver,
    #[error("a move is already being resolved")]
    Resolving,
    #[error("it is not {player}'s turn")]
    NotYourTurn { player: PlayerId },
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: u32, y: u32 },
    #[error("cell ({x}, {y}) belongs to another player")]
    CellOwnedByOpponent { x: u32, y: u32 },
    #[error("cell ({x}, {y}) is already at capacity")]
    CellAtCapacity { x: u32, y: u32 },
}

/// Externally visible turn phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    AwaitingMove,
    Resolving,
    GameOver,
}

pub fn phase(state: &GameState) -> Phase {
    if state.is_game_over {
        Phase::GameOver
    } else if state.resolving {
        Phase::Resolving
    } else {
        Phase::AwaitingMove
    }
}

/// Outcome of an accepted move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub state: GameState,
    pub events: Vec<ExplosionEvent>,
    /// Players removed from the active roster by this move, in turn order.
    pub eliminated: Vec<PlayerId>,
    pub winner: Option<PlayerId>,
    /// The resolver stopped at a safety limit before the board settled.
    pub truncated: bool,
}

/// Initial state for a match: empty board, first roster entry to move.
pub fn new_game(players: Vec<Player>, rows: u32, columns: u32) -> Result<GameState, BoardError> {
    let board = Board::new(rows, columns)?;
    let is_game_over = players.len() <= 1;
    Ok(GameState {
        players,
        current_player_index: 0,
        board,
        is_game_over,
        resolving: false,
        placed: Vec::new(),
        move_number: 0,
    })
}

/// Check a move against the current state without applying it.
pub fn validate_move(state: &GameState, mv: &Move) -> Result<(), MoveError> {
    if state.is_game_over {
        return Err(MoveError::GameOver);
    }
    if state.resolving {
        return Err(MoveError::Resolving);
    }
    match state.current_player() {
        Some(current) if current.id == mv.player_id => {}
        _ => {
            return Err(MoveError::NotYourTurn {
                player: mv.player_id.clone(),
            })
        }
    }

    let at = mv.coord();
    let Some(cell) = state.board.get(at) else {
        return Err(MoveError::OutOfBounds { x: mv.x, y: mv.y });
    };
    if !cell.is_empty() && cell.owner.as_ref() != Some(&mv.player_id) {
        return Err(MoveError::CellOwnedByOpponent { x: mv.x, y: mv.y });
    }
    if !state.board.is_within_capacity(at) {
        return Err(MoveError::CellAtCapacity { x: mv.x, y: mv.y });
    }
    Ok(())
}

/// Validate and apply one move, producing the next state.
///
/// The input state is left untouched. On rejection nothing changes.
pub fn apply_move(state: &GameState, mv: &Move) -> Result<MoveOutcome, MoveError> {
    validate_move(state, mv)?;

    let at = mv.coord();
    let mut board = state.board.clone();
    if let Some(cell) = board.get_mut(at) {
        cell.orbs += 1;
        cell.owner = Some(mv.player_id.clone());
    }

    let resolution = resolve(&board, at, &state.players);

    let mut placed = state.placed.clone();
    if !placed.contains(&mv.player_id) {
        placed.push(mv.player_id.clone());
    }

    let mut next = GameState {
        players: state.players.clone(),
        current_player_index: state.current_player_index,
        board: resolution.board,
        is_game_over: false,
        resolving: false,
        placed,
        move_number: state.move_number + 1,
    };

    let eliminated = eliminate_inactive(&mut next);
    let winner = if next.is_game_over {
        next.winner().map(|p| p.id.clone())
    } else {
        advance_turn(&mut next, &mv.player_id);
        None
    };

    Ok(MoveOutcome {
        state: next,
        events: resolution.events,
        eliminated,
        winner,
        truncated: resolution.truncated,
    })
}

/// A player stays active until they have placed at least once and then lost every orb.
pub fn is_active(state: &GameState, player: &PlayerId) -> bool {
    !state.has_placed(player) || state.board.owned_cells(player) > 0
}

pub fn active_players(state: &GameState) -> Vec<&Player> {
    state
        .players
        .iter()
        .filter(|p| is_active(state, &p.id))
        .collect()
}

/// Drop players who no longer own any orb and recompute game over.
fn eliminate_inactive(state: &mut GameState) -> Vec<PlayerId> {
    let mut eliminated = Vec::new();
    let mut kept = Vec::with_capacity(state.players.len());
    for player in std::mem::take(&mut state.players) {
        if is_active(state, &player.id) {
            kept.push(player);
        } else {
            eliminated.push(player.id);
        }
    }
    state.players = kept;
    state.is_game_over = state.players.len() <= 1;
    eliminated
}

/// Pass the turn to whoever follows `mover` in the updated roster.
fn advance_turn(state: &mut GameState, mover: &PlayerId) {
    let len = state.players.len();
    if len == 0 {
        state.current_player_index = 0;
        return;
    }
    let from = state
        .position_of(mover)
        .unwrap_or(state.current_player_index % len);
    state.current_player_index = (from + 1) % len;
}

/// Remove a player mid-game: clear their cells, drop them from the roster and fix the turn.
///
/// Returns `None` if the game is already over or the player is not on the active roster.
pub fn forfeit(state: &GameState, player: &PlayerId) -> Option<GameState> {
    if state.is_game_over {
        return None;
    }
    let position = state.position_of(player)?;
    let mut next = state.clone();
    next.board.clear_owner(player);
    next.players.remove(position);
    next.placed.retain(|p| p != player);

    // Earlier players shift everyone after them down by one. When the current player leaves,
    // the same index now points at the next player.
    if position < next.current_player_index {
        next.current_player_index -= 1;
    }
    if next.players.is_empty() {
        next.current_player_index = 0;
    } else {
        next.current_player_index %= next.players.len();
    }

    eliminate_inactive(&mut next);
    if next.is_game_over {
        next.current_player_index = 0;
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use cascade_protocol::{Cell, Coord};

    use super::*;

    fn two_player(rows: u32, columns: u32) -> GameState {
        new_game(
            vec![
                Player::new("a").with_letter('A').with_color("red"),
                Player::new("b").with_letter('B').with_color("blue"),
            ],
            rows,
            columns,
        )
        .unwrap()
    }

    fn play(state: &GameState, x: u32, y: u32, player: &str) -> GameState {
        apply_move(state, &Move::new(x, y, player)).unwrap().state
    }

    #[test]
    fn turns_alternate() {
        let state = two_player(3, 3);
        assert_eq!(phase(&state), Phase::AwaitingMove);
        let state = play(&state, 0, 0, "a");
        assert_eq!(state.current_player().unwrap().id, PlayerId::from("b"));
        assert_eq!(state.move_number, 1);
        let state = play(&state, 2, 2, "b");
        assert_eq!(state.current_player().unwrap().id, PlayerId::from("a"));
    }

    #[test]
    fn corner_double_placement_explodes() {
        let state = two_player(3, 3);
        let state = play(&state, 0, 0, "a");
        let state = play(&state, 2, 2, "b");
        let outcome = apply_move(&state, &Move::new(0, 0, "a")).unwrap();

        let board = &outcome.state.board;
        assert_eq!(board.get(Coord::new(0, 0)), Some(&Cell::default()));
        assert_eq!(board.get(Coord::new(1, 0)).unwrap().orbs, 1);
        assert_eq!(board.get(Coord::new(0, 1)).unwrap().orbs, 1);
        assert_eq!(outcome.events.len(), 2);
        assert!(!outcome.state.is_game_over);
    }

    #[test]
    fn rejects_opponent_cell_without_change() {
        let state = play(&two_player(3, 3), 1, 1, "a");
        let err = apply_move(&state, &Move::new(1, 1, "b")).unwrap_err();
        assert_eq!(err, MoveError::CellOwnedByOpponent { x: 1, y: 1 });
        assert_eq!(state.board.total_orbs(), 1);
    }

    #[test]
    fn rejects_out_of_turn_and_out_of_bounds() {
        let state = two_player(3, 3);
        assert!(matches!(
            apply_move(&state, &Move::new(0, 0, "b")),
            Err(MoveError::NotYourTurn { .. })
        ));
        assert_eq!(
            apply_move(&state, &Move::new(3, 0, "a")),
            Err(MoveError::OutOfBounds { x: 3, y: 0 })
        );
    }

    #[test]
    fn rejects_while_resolving() {
        let mut state = two_player(3, 3);
        state.resolving = true;
        assert_eq!(phase(&state), Phase::Resolving);
        assert_eq!(
            apply_move(&state, &Move::new(0, 0, "a")),
            Err(MoveError::Resolving)
        );
    }

    #[test]
    fn unplaced_players_are_not_eliminated() {
        let state = two_player(3, 3);
        let state = play(&state, 0, 0, "a");
        assert_eq!(state.players.len(), 2);
        assert!(!state.is_game_over);
    }

    #[test]
    fn capturing_last_cell_ends_game() {
        let mut state = two_player(3, 3);
        *state.board.get_mut(Coord::new(0, 0)).unwrap() = Cell {
            orbs: 1,
            owner: Some(PlayerId::from("a")),
        };
        *state.board.get_mut(Coord::new(1, 0)).unwrap() = Cell {
            orbs: 1,
            owner: Some(PlayerId::from("b")),
        };
        state.placed = vec![PlayerId::from("a"), PlayerId::from("b")];

        let outcome = apply_move(&state, &Move::new(0, 0, "a")).unwrap();
        assert!(outcome.state.is_game_over);
        assert_eq!(outcome.eliminated, vec![PlayerId::from("b")]);
        assert_eq!(outcome.winner, Some(PlayerId::from("a")));
        assert_eq!(phase(&outcome.state), Phase::GameOver);
        assert_eq!(
            apply_move(&outcome.state, &Move::new(2, 2, "a")),
            Err(MoveError::GameOver)
        );
    }

    #[test]
    fn rotation_skips_eliminated_players() {
        let mut state = new_game(
            vec![Player::new("a"), Player::new("b"), Player::new("c")],
            3,
            3,
        )
        .unwrap();
        *state.board.get_mut(Coord::new(0, 0)).unwrap() = Cell {
            orbs: 1,
            owner: Some(PlayerId::from("a")),
        };
        *state.board.get_mut(Coord::new(1, 0)).unwrap() = Cell {
            orbs: 1,
            owner: Some(PlayerId::from("b")),
        };
        *state.board.get_mut(Coord::new(2, 2)).unwrap() = Cell {
            orbs: 1,
            owner: Some(PlayerId::from("c")),
        };
        state.placed = vec!["a".into(), "b".into(), "c".into()];

        let outcome = apply_move(&state, &Move::new(0, 0, "a")).unwrap();
        assert_eq!(outcome.eliminated, vec![PlayerId::from("b")]);
        let next = outcome.state;
        assert_eq!(next.players.len(), 2);
        assert_eq!(next.current_player().unwrap().id, PlayerId::from("c"));
    }

    #[test]
    fn forfeit_of_current_player_passes_turn() {
        let state = new_game(
            vec![Player::new("a"), Player::new("b"), Player::new("c")],
            3,
            3,
        )
        .unwrap();
        let state = play(&state, 0, 0, "a");
        assert_eq!(state.current_player_index, 1);

        let next = forfeit(&state, &PlayerId::from("b")).unwrap();
        assert_eq!(next.players.len(), 2);
        assert_eq!(next.current_player().unwrap().id, PlayerId::from("c"));
        assert!(!next.is_game_over);
    }

    #[test]
    fn forfeit_clears_cells_and_shifts_index() {
        let state = two_player(3, 3);
        let state = play(&state, 0, 0, "a");
        let state = play(&state, 2, 2, "b");
        assert_eq!(state.current_player_index, 0);

        let next = forfeit(&state, &PlayerId::from("b")).unwrap();
        assert_eq!(next.board.owned_cells(&PlayerId::from("b")), 0);
        assert_eq!(next.board.get(Coord::new(2, 2)), Some(&Cell::default()));
        assert!(next.is_game_over);
        assert_eq!(next.winner().unwrap().id, PlayerId::from("a"));
        assert!(forfeit(&next, &PlayerId::from("b")).is_none());
        assert!(forfeit(&next, &PlayerId::from("a")).is_none());
    }

    #[test]
    fn forfeit_before_current_decrements_index() {
        let state = new_game(
            vec![Player::new("a"), Player::new("b"), Player::new("c")],
            3,
            3,
        )
        .unwrap();
        let state = play(&state, 0, 0, "a");
        let state = play(&state, 2, 0, "b");
        assert_eq!(state.current_player_index, 2);

        let next = forfeit(&state, &PlayerId::from("a")).unwrap();
        assert_eq!(next.current_player().unwrap().id, PlayerId::from("c"));
    }
}
