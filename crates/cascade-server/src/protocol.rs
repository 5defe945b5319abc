//! Network protocol messages for multiplayer rooms.
//!
//! Every message is a MessagePack map tagged by `type` (kebab-case) with camelCase fields, so
//! browser and native clients can share one schema.

use serde::{Deserialize, Serialize};

use cascade_core::MoveError;
use cascade_protocol::{ExplosionEvent, GameState, Move, Player, PlayerId, ReplayFile, RoomCode};

/// Client-to-server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a durable player id. Sent first on every (re)connect.
    Identify { player_id: PlayerId },
    CreateRoom,
    JoinRoom { room_id: String, player: Player },
    UpdatePlayer { room_id: String, player: Player },
    StartGame { room_id: String },
    MakeMove {
        room_id: String,
        #[serde(rename = "move")]
        mv: Move,
        /// Client's view of the pre-move state, compared by checksum only.
        #[serde(default)]
        game_state: Option<GameState>,
    },
    /// Ask for a fresh snapshot, e.g. right after reconnecting.
    SyncRequest { room_id: String },
    GameOver {
        room_id: String,
        #[serde(default)]
        winner: Option<PlayerId>,
    },
    LeaveRoom { room_id: String, player_id: PlayerId },
    RequestReplay { room_id: String },
    Ping { timestamp: u64 },
}

/// Server-to-client messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Identified {
        player_id: PlayerId,
        /// Room the player was re-associated with, if any.
        room_id: Option<RoomCode>,
    },
    RoomCreated { room_id: RoomCode },
    /// Result of a lobby request.
    Ack {
        request: RequestKind,
        room_id: Option<RoomCode>,
        result: AckResult,
    },
    /// Full lobby roster after any change.
    PlayerUpdated {
        room_id: RoomCode,
        players: Vec<Player>,
    },
    GameStarted {
        room_id: RoomCode,
        players: Vec<Player>,
        game_state: GameState,
        checksum: u64,
    },
    /// Authoritative result of an accepted move. Sent to every member, the mover included.
    MoveMade {
        room_id: RoomCode,
        #[serde(rename = "move")]
        mv: Move,
        events: Vec<ExplosionEvent>,
        eliminated: Vec<PlayerId>,
        game_state: GameState,
        checksum: u64,
    },
    MoveRejected {
        room_id: Option<RoomCode>,
        #[serde(rename = "move")]
        mv: Move,
        reason: MoveRejectReason,
    },
    /// Full snapshot for a single client.
    SyncGameState {
        room_id: RoomCode,
        players: Vec<Player>,
        game_state: GameState,
        checksum: u64,
    },
    GameEnded {
        room_id: RoomCode,
        winner: Option<PlayerId>,
    },
    PlayerLeft {
        room_id: RoomCode,
        player_id: PlayerId,
        players: Vec<Player>,
        game_state: Option<GameState>,
    },
    /// A player dropped mid-game; they forfeit unless they return within the grace period.
    PlayerDisconnected {
        room_id: RoomCode,
        player_id: PlayerId,
        game_state: Option<GameState>,
        grace_secs: u64,
    },
    PlayerReconnected {
        room_id: RoomCode,
        player_id: PlayerId,
    },
    ReplayFile {
        room_id: RoomCode,
        replay: ReplayFile,
    },
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

/// Which request an `Ack` answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    JoinRoom,
    UpdatePlayer,
    StartGame,
    LeaveRoom,
    SyncRequest,
    RequestReplay,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum AckResult {
    Success { players: Vec<Player> },
    Failure {
        reason: FailureReason,
        message: String,
    },
}

impl AckResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AckResult::Success { .. })
    }
}

/// Reasons for refusing a lobby request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    InvalidRoomCode,
    RoomNotFound,
    GameAlreadyStarted,
    GameNotStarted,
    RoomFull,
    PlayerNotFound,
    NotInRoom,
    NotOwner,
    NotIdentified,
    IdentityMismatch,
    ValidationFailure,
}

/// Reasons for rejecting a move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveRejectReason {
    InvalidRoomCode,
    RoomNotFound,
    GameNotStarted,
    NotIdentified,
    IdentityMismatch,
    GameOver,
    Resolving,
    NotYourTurn,
    OutOfBounds,
    CellOwnedByOpponent,
    CellAtCapacity,
}

impl From<&MoveError> for MoveRejectReason {
    fn from(err: &MoveError) -> Self {
        match err {
            MoveError::GameOver => MoveRejectReason::GameOver,
            MoveError::Resolving => MoveRejectReason::Resolving,
            MoveError::NotYourTurn { .. } => MoveRejectReason::NotYourTurn,
            MoveError::OutOfBounds { .. } => MoveRejectReason::OutOfBounds,
            MoveError::CellOwnedByOpponent { .. } => MoveRejectReason::CellOwnedByOpponent,
            MoveError::CellAtCapacity { .. } => MoveRejectReason::CellAtCapacity,
        }
    }
}

pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec_named(msg)
}

pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}

pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::encode::to_vec_named(msg)
}

pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(data)
}
