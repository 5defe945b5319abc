use cascade_core::{
    apply_move, is_active, new_game, operation_budget, replay_events, rescan_limit, resolve,
    validate_move,
};
use cascade_protocol::{Coord, GameState, Move, Player};
use proptest::prelude::*;

fn roster(count: usize) -> Vec<Player> {
    const COLORS: [&str; 4] = ["red", "green", "blue", "yellow"];
    (0..count)
        .map(|i| Player::new(format!("p{i}")).with_color(COLORS[i % COLORS.len()]))
        .collect()
}

/// Pick the `choice`-th cell the current player may legally play.
fn legal_move(state: &GameState, choice: usize) -> Option<Move> {
    let player = state.current_player()?.id.clone();
    let legal: Vec<Coord> = state
        .board
        .iter()
        .map(|(at, _)| at)
        .filter(|at| validate_move(state, &Move::new(at.x, at.y, player.clone())).is_ok())
        .collect();
    if legal.is_empty() {
        return None;
    }
    let at = legal[choice % legal.len()];
    Some(Move::new(at.x, at.y, player))
}

prop_compose! {
    fn game_script()(
        rows in 2u32..6,
        columns in 2u32..8,
        players in 2usize..4,
        choices in prop::collection::vec(any::<usize>(), 1..120),
    ) -> (u32, u32, usize, Vec<usize>) {
        (rows, columns, players, choices)
    }
}

proptest! {
    #[test]
    fn moves_conserve_orbs_and_respect_capacity((rows, columns, players, choices) in game_script()) {
        let mut state = new_game(roster(players), rows, columns).unwrap();
        for choice in choices {
            let Some(mv) = legal_move(&state, choice) else { break };
            let before = state.board.total_orbs();
            let outcome = apply_move(&state, &mv).unwrap();

            prop_assert_eq!(outcome.state.board.total_orbs(), before + 1);
            prop_assert!(!outcome.truncated);
            if outcome.state.board.owners().len() > 1 {
                prop_assert!(outcome.state.board.is_stable());
            }

            state = outcome.state;
            if state.is_game_over {
                break;
            }
        }
    }

    #[test]
    fn game_over_iff_at_most_one_active((rows, columns, players, choices) in game_script()) {
        let mut state = new_game(roster(players), rows, columns).unwrap();
        for choice in choices {
            let Some(mv) = legal_move(&state, choice) else { break };
            let outcome = apply_move(&state, &mv).unwrap();
            state = outcome.state;

            for gone in &outcome.eliminated {
                prop_assert!(state.player(gone).is_none());
                prop_assert_eq!(state.board.owned_cells(gone), 0);
            }
            for player in &state.players {
                prop_assert!(is_active(&state, &player.id));
            }
            prop_assert_eq!(state.is_game_over, state.players.len() <= 1);
            if state.is_game_over {
                break;
            }
            prop_assert!(state.current_player_index < state.players.len());
        }
    }

    #[test]
    fn resolution_is_deterministic_and_replayable((rows, columns, players, choices) in game_script()) {
        let mut state = new_game(roster(players), rows, columns).unwrap();
        for choice in choices {
            let Some(mv) = legal_move(&state, choice) else { break };

            let mut placed = state.board.clone();
            if let Some(cell) = placed.get_mut(mv.coord()) {
                cell.orbs += 1;
                cell.owner = Some(mv.player_id.clone());
            }
            let first = resolve(&placed, mv.coord(), &state.players);
            let second = resolve(&placed, mv.coord(), &state.players);
            prop_assert_eq!(&first, &second);
            prop_assert!(!first.truncated);
            prop_assert!(first.passes <= rescan_limit(&placed) + 1);
            prop_assert!(first.operations <= operation_budget(&placed) * first.passes);

            let mut replayed = placed.clone();
            replay_events(&mut replayed, &first.events);
            prop_assert_eq!(&replayed, &first.board);

            state = apply_move(&state, &mv).unwrap().state;
            if state.is_game_over {
                break;
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn full_size_games_settle_every_move(
        players in 2usize..5,
        choices in prop::collection::vec(any::<usize>(), 100..600),
    ) {
        let mut state = new_game(roster(players), 8, 16).unwrap();
        for choice in choices {
            let Some(mv) = legal_move(&state, choice) else { break };
            let outcome = apply_move(&state, &mv).unwrap();

            prop_assert!(!outcome.truncated, "move {} truncated", outcome.state.move_number);
            if outcome.state.board.owners().len() > 1 {
                prop_assert!(outcome.state.board.is_stable());
            }

            state = outcome.state;
            if state.is_game_over {
                break;
            }
        }
    }
}
