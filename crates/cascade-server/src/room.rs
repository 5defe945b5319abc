//! Per-room lobby roster and match state.
//!
//! A room owns its lobby roster, the authoritative `GameState` once started, and a log of
//! every accepted transition for replay export.

use std::collections::HashSet;
use std::time::Instant;

use cascade_core::{forfeit, new_game, validate_move, MoveError};
use cascade_protocol::{
    is_palette_color, BoardError, GameState, Move, Player, PlayerId, ReplayEntry, ReplayFile,
    RoomCode, RoomCodeError, PLAYER_COLORS, REPLAY_VERSION,
};

use crate::protocol::{FailureReason, MoveRejectReason};

/// Limits a room enforces, taken from server config.
#[derive(Clone, Copy, Debug)]
pub struct RoomRules {
    pub min_players: usize,
    pub max_players: usize,
    pub board_rows: u32,
    pub board_columns: u32,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: PLAYER_COLORS.len(),
            board_rows: 8,
            board_columns: 16,
        }
    }
}

/// Lobby roster problems that block `start-game`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("At least {min} players are needed to start, found {found}")]
    NotEnoughPlayers { min: usize, found: usize },
    #[error("Player {player} has not picked a letter")]
    MissingLetter { player: PlayerId },
    #[error("Player {player} has not picked a colour")]
    MissingColor { player: PlayerId },
    #[error("Letter '{letter}' is used by more than one player")]
    DuplicateLetter { letter: char },
    #[error("Colour '{color}' is used by more than one player")]
    DuplicateColor { color: String },
    #[error("Colour '{color}' is not one of {palette:?}")]
    InvalidColor {
        color: String,
        palette: [&'static str; 6],
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Invalid room code: {0}")]
    InvalidRoomCode(#[from] RoomCodeError),
    #[error("Room {0} not found")]
    RoomNotFound(RoomCode),
    #[error("Game has already started")]
    GameAlreadyStarted,
    #[error("Game has not started")]
    GameNotStarted,
    #[error("Room is full ({max} players)")]
    RoomFull { max: usize },
    #[error("Player {0} is not in this room")]
    PlayerNotFound(PlayerId),
    #[error("You are not in this room")]
    NotInRoom,
    #[error("Only the room owner can start the game")]
    NotOwner,
    #[error("Connection has not identified itself")]
    NotIdentified,
    #[error("Player id does not match this connection's identity")]
    IdentityMismatch,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Board(#[from] BoardError),
}

impl RoomError {
    pub fn reason(&self) -> FailureReason {
        match self {
            RoomError::InvalidRoomCode(_) => FailureReason::InvalidRoomCode,
            RoomError::RoomNotFound(_) => FailureReason::RoomNotFound,
            RoomError::GameAlreadyStarted => FailureReason::GameAlreadyStarted,
            RoomError::GameNotStarted => FailureReason::GameNotStarted,
            RoomError::RoomFull { .. } => FailureReason::RoomFull,
            RoomError::PlayerNotFound(_) => FailureReason::PlayerNotFound,
            RoomError::NotInRoom => FailureReason::NotInRoom,
            RoomError::NotOwner => FailureReason::NotOwner,
            RoomError::NotIdentified => FailureReason::NotIdentified,
            RoomError::IdentityMismatch => FailureReason::IdentityMismatch,
            RoomError::Validation(_) | RoomError::Board(_) => FailureReason::ValidationFailure,
        }
    }
}

/// What happened when a player left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Removed from the lobby roster. `new_owner` is set when ownership moved.
    Removed { new_owner: Option<PlayerId> },
    /// Left a running game: their cells were cleared and they were dropped from the turn order.
    Forfeited {
        new_owner: Option<PlayerId>,
        ended_game: bool,
    },
    /// Left after the game ended. The final state and the replay log are untouched.
    LeftFinished { new_owner: Option<PlayerId> },
}

/// Why a move could not be started in a room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BeginMoveError {
    #[error("game has not started")]
    NotStarted,
    #[error(transparent)]
    Illegal(#[from] MoveError),
}

impl BeginMoveError {
    pub fn reason(&self) -> MoveRejectReason {
        match self {
            BeginMoveError::NotStarted => MoveRejectReason::GameNotStarted,
            BeginMoveError::Illegal(err) => MoveRejectReason::from(err),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Room {
    pub id: RoomCode,
    /// Lobby roster in join order. After the game starts, departed entries stay here.
    pub players: Vec<Player>,
    pub is_game_started: bool,
    pub game_state: Option<GameState>,
    pub created_at: Instant,
    departed: HashSet<PlayerId>,
    starting_roster: Vec<Player>,
    log: Vec<ReplayEntry>,
}

impl Room {
    pub fn new(id: RoomCode, now: Instant) -> Self {
        Self {
            id,
            players: Vec::new(),
            is_game_started: false,
            game_state: None,
            created_at: now,
            departed: HashSet::new(),
            starting_roster: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Roster entries that have not left.
    pub fn members(&self) -> Vec<Player> {
        self.players
            .iter()
            .filter(|p| !self.departed.contains(&p.id))
            .cloned()
            .collect()
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.id == player) && !self.departed.contains(player)
    }

    pub fn owner(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_owner)
    }

    /// Nobody is left; the room should be deleted.
    pub fn is_abandoned(&self) -> bool {
        self.players.iter().all(|p| self.departed.contains(&p.id))
    }

    /// Add or replace a roster entry.
    pub fn join(&mut self, mut player: Player, rules: &RoomRules) -> Result<Vec<Player>, RoomError> {
        if self.is_game_started {
            return Err(RoomError::GameAlreadyStarted);
        }
        check_color(&player)?;

        if let Some(existing) = self.players.iter_mut().find(|p| p.id == player.id) {
            player.is_owner = existing.is_owner;
            *existing = player;
        } else {
            if self.players.len() >= rules.max_players {
                return Err(RoomError::RoomFull {
                    max: rules.max_players,
                });
            }
            player.is_owner = self.players.is_empty();
            self.players.push(player);
        }
        Ok(self.members())
    }

    /// Replace an existing roster entry matched by id.
    pub fn update_player(&mut self, mut player: Player) -> Result<Vec<Player>, RoomError> {
        if self.is_game_started {
            return Err(RoomError::GameAlreadyStarted);
        }
        check_color(&player)?;

        let existing = self
            .players
            .iter_mut()
            .find(|p| p.id == player.id)
            .ok_or_else(|| RoomError::PlayerNotFound(player.id.clone()))?;
        player.is_owner = existing.is_owner;
        *existing = player;
        Ok(self.members())
    }

    /// Start the match. Only the owner may start, and the roster must be complete and unique.
    pub fn start_game(
        &mut self,
        requested_by: &PlayerId,
        rules: &RoomRules,
    ) -> Result<&GameState, RoomError> {
        if self.is_game_started {
            return Err(RoomError::GameAlreadyStarted);
        }
        let requester = self
            .players
            .iter()
            .find(|p| &p.id == requested_by)
            .ok_or(RoomError::NotInRoom)?;
        if !requester.is_owner {
            return Err(RoomError::NotOwner);
        }
        validate_roster(&self.players, rules.min_players)?;

        let state = new_game(self.players.clone(), rules.board_rows, rules.board_columns)?;
        self.starting_roster = self.players.clone();
        self.log.clear();
        self.is_game_started = true;
        Ok(self.game_state.insert(state))
    }

    /// Remove a player. In the lobby they are dropped at once; mid-game they forfeit. Once the
    /// game is over they are only marked departed.
    pub fn leave(&mut self, player: &PlayerId) -> Result<LeaveOutcome, RoomError> {
        if !self.is_member(player) {
            return Err(RoomError::PlayerNotFound(player.clone()));
        }

        if !self.is_game_started {
            let Some(position) = self.players.iter().position(|p| &p.id == player) else {
                return Err(RoomError::PlayerNotFound(player.clone()));
            };
            let removed = self.players.remove(position);
            let new_owner = if removed.is_owner {
                self.promote_owner()
            } else {
                None
            };
            return Ok(LeaveOutcome::Removed { new_owner });
        }

        self.departed.insert(player.clone());
        let finished = self.game_state.as_ref().is_some_and(|s| s.is_game_over);
        let mut ended_game = false;
        if let Some(state) = self.game_state.as_ref().filter(|s| !s.is_game_over) {
            if let Some(next) = forfeit(state, player) {
                ended_game = next.is_game_over;
                self.log.push(ReplayEntry::Forfeit {
                    player_id: player.clone(),
                });
                self.game_state = Some(next);
            }
        }

        let was_owner = self
            .players
            .iter()
            .any(|p| &p.id == player && p.is_owner);
        let new_owner = if was_owner {
            if let Some(entry) = self.players.iter_mut().find(|p| &p.id == player) {
                entry.is_owner = false;
            }
            self.promote_owner()
        } else {
            None
        };
        if finished {
            return Ok(LeaveOutcome::LeftFinished { new_owner });
        }
        Ok(LeaveOutcome::Forfeited {
            new_owner,
            ended_game,
        })
    }

    fn promote_owner(&mut self) -> Option<PlayerId> {
        let departed = &self.departed;
        let next = self.players.iter_mut().find(|p| !departed.contains(&p.id))?;
        next.is_owner = true;
        Some(next.id.clone())
    }

    /// Check a move and mark the room as resolving. Returns the pre-move state.
    pub fn begin_move(&mut self, mv: &Move) -> Result<GameState, BeginMoveError> {
        if !self.is_game_started {
            return Err(BeginMoveError::NotStarted);
        }
        let Some(state) = self.game_state.as_mut() else {
            return Err(BeginMoveError::NotStarted);
        };
        validate_move(state, mv)?;
        let pre = state.clone();
        state.resolving = true;
        Ok(pre)
    }

    /// Store the resolved state and log the move.
    pub fn commit_move(&mut self, mv: Move, next: GameState) {
        self.log.push(ReplayEntry::Move { mv });
        self.game_state = Some(next);
    }

    /// Clear the resolving flag without changing the board.
    pub fn abort_move(&mut self) {
        if let Some(state) = self.game_state.as_mut() {
            state.resolving = false;
        }
    }

    /// Export everything applied since the game started.
    pub fn replay_file(&self) -> Option<ReplayFile> {
        let state = self.game_state.as_ref()?;
        Some(ReplayFile {
            version: REPLAY_VERSION,
            rows: state.board.rows(),
            columns: state.board.columns(),
            players: self.starting_roster.clone(),
            entries: self.log.clone(),
        })
    }
}

fn check_color(player: &Player) -> Result<(), ValidationError> {
    match &player.color {
        Some(color) if !is_palette_color(color) => Err(ValidationError::InvalidColor {
            color: color.clone(),
            palette: PLAYER_COLORS,
        }),
        _ => Ok(()),
    }
}

/// Every player needs a letter and a palette colour, and both must be unique.
pub fn validate_roster(players: &[Player], min_players: usize) -> Result<(), ValidationError> {
    if players.len() < min_players {
        return Err(ValidationError::NotEnoughPlayers {
            min: min_players,
            found: players.len(),
        });
    }

    let mut letters = HashSet::new();
    let mut colors = HashSet::new();
    for player in players {
        let letter = player
            .display_letter
            .ok_or_else(|| ValidationError::MissingLetter {
                player: player.id.clone(),
            })?;
        let color = player
            .color
            .as_deref()
            .ok_or_else(|| ValidationError::MissingColor {
                player: player.id.clone(),
            })?;
        check_color(player)?;

        if !letters.insert(letter.to_uppercase().collect::<String>()) {
            return Err(ValidationError::DuplicateLetter { letter });
        }
        if !colors.insert(color) {
            return Err(ValidationError::DuplicateColor {
                color: color.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RoomCode {
        RoomCode::parse("RUMB").unwrap()
    }

    fn player(id: &str, letter: char, color: &str) -> Player {
        Player::new(id).with_letter(letter).with_color(color)
    }

    fn lobby(players: &[Player]) -> Room {
        let mut room = Room::new(code(), Instant::now());
        for p in players {
            room.join(p.clone(), &RoomRules::default()).unwrap();
        }
        room
    }

    fn started() -> Room {
        let mut room = lobby(&[
            player("a", 'A', "red"),
            player("b", 'B', "blue"),
            player("c", 'C', "green"),
        ]);
        room.start_game(&PlayerId::from("a"), &RoomRules::default())
            .unwrap();
        room
    }

    #[test]
    fn first_joiner_owns_and_client_flag_is_ignored() {
        let mut sneaky = player("b", 'B', "blue");
        sneaky.is_owner = true;
        let room = lobby(&[player("a", 'A', "red"), sneaky]);
        assert!(room.players[0].is_owner);
        assert!(!room.players[1].is_owner);
    }

    #[test]
    fn rejoin_replaces_entry() {
        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'B', "blue")]);
        let roster = room
            .join(player("b", 'Z', "green"), &RoomRules::default())
            .unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[1].display_letter, Some('Z'));
    }

    #[test]
    fn join_after_start_is_refused() {
        let mut room = started();
        let before = room.players.clone();
        assert_eq!(
            room.join(player("d", 'D', "cyan"), &RoomRules::default()),
            Err(RoomError::GameAlreadyStarted)
        );
        assert_eq!(room.players, before);
    }

    #[test]
    fn room_full() {
        let rules = RoomRules {
            max_players: 2,
            ..Default::default()
        };
        let mut room = Room::new(code(), Instant::now());
        room.join(player("a", 'A', "red"), &rules).unwrap();
        room.join(player("b", 'B', "blue"), &rules).unwrap();
        assert_eq!(
            room.join(player("c", 'C', "green"), &rules),
            Err(RoomError::RoomFull { max: 2 })
        );
    }

    #[test]
    fn update_unknown_player_fails() {
        let mut room = lobby(&[player("a", 'A', "red")]);
        assert_eq!(
            room.update_player(player("x", 'X', "blue")),
            Err(RoomError::PlayerNotFound(PlayerId::from("x")))
        );
        let roster = room.update_player(player("a", 'Q', "yellow")).unwrap();
        assert_eq!(roster[0].display_letter, Some('Q'));
        assert!(roster[0].is_owner);
    }

    #[test]
    fn off_palette_colour_is_rejected() {
        let mut room = Room::new(code(), Instant::now());
        assert!(matches!(
            room.join(player("a", 'A', "purple"), &RoomRules::default()),
            Err(RoomError::Validation(ValidationError::InvalidColor { .. }))
        ));
    }

    #[test]
    fn start_requires_complete_unique_roster() {
        let rules = RoomRules::default();
        let a = PlayerId::from("a");

        let mut room = lobby(&[player("a", 'A', "red")]);
        assert!(matches!(
            room.start_game(&a, &rules),
            Err(RoomError::Validation(ValidationError::NotEnoughPlayers { .. }))
        ));

        let mut room = lobby(&[player("a", 'A', "red"), Player::new("b").with_color("blue")]);
        assert!(matches!(
            room.start_game(&a, &rules),
            Err(RoomError::Validation(ValidationError::MissingLetter { .. }))
        ));

        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'a', "blue")]);
        assert!(matches!(
            room.start_game(&a, &rules),
            Err(RoomError::Validation(ValidationError::DuplicateLetter { .. }))
        ));

        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'B', "red")]);
        assert!(matches!(
            room.start_game(&a, &rules),
            Err(RoomError::Validation(ValidationError::DuplicateColor { .. }))
        ));
        assert!(!room.is_game_started);
    }

    #[test]
    fn only_owner_starts() {
        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'B', "blue")]);
        assert_eq!(
            room.start_game(&PlayerId::from("b"), &RoomRules::default())
                .err(),
            Some(RoomError::NotOwner)
        );
        let state = room
            .start_game(&PlayerId::from("a"), &RoomRules::default())
            .unwrap();
        assert_eq!(state.current_player_index, 0);
        assert_eq!(state.board.rows(), 8);
        assert_eq!(state.board.total_orbs(), 0);
    }

    #[test]
    fn owner_leaving_lobby_promotes_next() {
        let mut room = lobby(&[
            player("a", 'A', "red"),
            player("b", 'B', "blue"),
            player("c", 'C', "green"),
        ]);
        let outcome = room.leave(&PlayerId::from("a")).unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::Removed {
                new_owner: Some(PlayerId::from("b"))
            }
        );
        assert_eq!(room.players.len(), 2);
        assert!(room.players[0].is_owner);
        assert_eq!(room.players.iter().filter(|p| p.is_owner).count(), 1);
    }

    #[test]
    fn last_lobby_player_leaving_abandons_room() {
        let mut room = lobby(&[player("a", 'A', "red")]);
        room.leave(&PlayerId::from("a")).unwrap();
        assert!(room.is_abandoned());
    }

    #[test]
    fn leaving_mid_game_forfeits() {
        let mut room = started();
        let mv = Move::new(0, 0, "a");
        let pre = room.begin_move(&mv).unwrap();
        let next = cascade_core::apply_move(&pre, &mv).unwrap().state;
        room.commit_move(mv, next);

        let outcome = room.leave(&PlayerId::from("a")).unwrap();
        assert!(matches!(
            outcome,
            LeaveOutcome::Forfeited {
                new_owner: Some(_),
                ended_game: false
            }
        ));
        let state = room.game_state.as_ref().unwrap();
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.board.total_orbs(), 0);
        assert_eq!(room.players.len(), 3);
        assert_eq!(room.members().len(), 2);
        assert!(room.members()[0].is_owner);
        assert!(room.leave(&PlayerId::from("a")).is_err());
    }

    #[test]
    fn resolving_guard_blocks_second_move() {
        let mut room = started();
        let mv = Move::new(0, 0, "a");
        room.begin_move(&mv).unwrap();
        assert_eq!(
            room.begin_move(&mv),
            Err(BeginMoveError::Illegal(MoveError::Resolving))
        );
        room.abort_move();
        assert!(room.begin_move(&mv).is_ok());
    }

    #[test]
    fn replay_file_records_moves_and_forfeits() {
        let mut room = started();
        let mv = Move::new(1, 1, "a");
        let pre = room.begin_move(&mv).unwrap();
        let next = cascade_core::apply_move(&pre, &mv).unwrap().state;
        room.commit_move(mv, next);
        room.leave(&PlayerId::from("c")).unwrap();

        let file = room.replay_file().unwrap();
        assert_eq!(file.players.len(), 3);
        assert_eq!(file.entries.len(), 2);
        let rebuilt = cascade_core::replay(&file).unwrap();
        assert_eq!(&rebuilt, room.game_state.as_ref().unwrap());
    }

    #[test]
    fn leaving_finished_game_keeps_result() {
        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'B', "blue")]);
        room.start_game(&PlayerId::from("a"), &RoomRules::default())
            .unwrap();
        room.leave(&PlayerId::from("b")).unwrap();
        let final_state = room.game_state.clone().unwrap();
        assert!(final_state.is_game_over);
        let log_len = room.replay_file().unwrap().entries.len();

        let outcome = room.leave(&PlayerId::from("a")).unwrap();
        assert_eq!(outcome, LeaveOutcome::LeftFinished { new_owner: None });
        let state = room.game_state.as_ref().unwrap();
        assert_eq!(state, &final_state);
        assert_eq!(state.winner().unwrap().id, PlayerId::from("a"));
        assert_eq!(room.replay_file().unwrap().entries.len(), log_len);
        assert!(room.is_abandoned());
    }

    #[test]
    fn moves_need_a_started_game() {
        let mut room = lobby(&[player("a", 'A', "red"), player("b", 'B', "blue")]);
        assert_eq!(
            room.begin_move(&Move::new(0, 0, "a")),
            Err(BeginMoveError::NotStarted)
        );
        assert_eq!(
            BeginMoveError::NotStarted.reason(),
            MoveRejectReason::GameNotStarted
        );
    }
}
