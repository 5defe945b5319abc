//! Room synchronization service.
//!
//! Transport-agnostic: the tick loop feeds it connection events and decoded messages, and it
//! returns the messages to deliver. All room mutations go through the [`RoomStore`], one
//! message at a time, so a room never has two moves in flight.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use cascade_core::apply_move;
use cascade_protocol::{wire, GameState, Move, Player, PlayerId, RoomCode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::ConnectionRegistry;
use crate::protocol::{AckResult, ClientMessage, MoveRejectReason, RequestKind, ServerMessage};
use crate::room::{LeaveOutcome, Room, RoomError, RoomRules};
use crate::store::{unique_room_code, RoomStore};

/// A message addressed to one client.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub client_id: u64,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn new(client_id: u64, message: ServerMessage) -> Self {
        Self { client_id, message }
    }
}

pub struct SyncService<S: RoomStore> {
    store: S,
    connections: ConnectionRegistry,
    config: ServerConfig,
    rules: RoomRules,
    rng: StdRng,
}

impl<S: RoomStore> SyncService<S> {
    pub fn new(store: S, config: ServerConfig) -> Self {
        Self::with_rng(store, config, StdRng::from_entropy())
    }

    /// Deterministic room codes, for tests.
    pub fn with_rng(store: S, config: ServerConfig, rng: StdRng) -> Self {
        let connections = ConnectionRegistry::new(
            config.disconnect_grace(),
            config.rate_limit_messages,
            config.rate_limit_window(),
        );
        let rules = RoomRules {
            min_players: config.min_players,
            max_players: config.max_players,
            board_rows: config.board_rows,
            board_columns: config.board_columns,
        };
        Self {
            store,
            connections,
            config,
            rules,
            rng,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn handle_connect(&mut self, client_id: u64, now: Instant) {
        self.connections.connect(client_id, now);
        info!(
            "Client {} connected ({} online)",
            client_id,
            self.connections.connected_count()
        );
    }

    /// Before the game starts, or after it ends, a drop is a leave. Mid-game it starts the
    /// grace timer.
    pub fn handle_disconnect(&mut self, client_id: u64, now: Instant) -> Vec<Outbound> {
        let Some(session) = self.connections.disconnect(client_id) else {
            return Vec::new();
        };
        debug!(
            "Client {} was connected for {:?} ({} online)",
            client_id,
            now.saturating_duration_since(session.connected_at),
            self.connections.connected_count()
        );
        let (Some(player), Some(code)) = (session.player_id, session.room) else {
            debug!("Client {} disconnected without a room", client_id);
            return Vec::new();
        };
        if self.connections.client_of(&player).is_some() {
            // A newer connection already took over this identity.
            return Vec::new();
        }
        let Some(room) = self.store.get(&code) else {
            return Vec::new();
        };
        if !room.is_member(&player) {
            return Vec::new();
        }

        if !room.is_game_started {
            info!("Player {} dropped from lobby {}", player, code);
            return self.depart(&code, &player).unwrap_or_default();
        }
        if room.game_state.as_ref().is_some_and(|s| s.is_game_over) {
            info!("Player {} dropped from finished game {}", player, code);
            return self.depart(&code, &player).unwrap_or_default();
        }

        let deadline = self.connections.start_grace(&code, &player, now);
        info!(
            "Player {} disconnected from {}; forfeit in {:?}",
            player,
            code,
            deadline.saturating_duration_since(now)
        );
        let message = ServerMessage::PlayerDisconnected {
            room_id: code.clone(),
            player_id: player.clone(),
            game_state: room.game_state.clone(),
            grace_secs: self.config.disconnect_grace_secs,
        };
        self.broadcast(&room, message, Some(&player))
    }

    pub fn handle_message(
        &mut self,
        client_id: u64,
        message: ClientMessage,
        now: Instant,
    ) -> Vec<Outbound> {
        if !self.connections.check_rate_limit(client_id, now) {
            warn!("Rate limit exceeded for client {}", client_id);
            return Vec::new();
        }

        match message {
            ClientMessage::Identify { player_id } => self.handle_identify(client_id, player_id),
            ClientMessage::CreateRoom => self.handle_create_room(client_id, now),
            ClientMessage::JoinRoom { room_id, player } => {
                self.handle_join_room(client_id, &room_id, player)
            }
            ClientMessage::UpdatePlayer { room_id, player } => {
                self.handle_update_player(client_id, &room_id, player)
            }
            ClientMessage::StartGame { room_id } => self.handle_start_game(client_id, &room_id),
            ClientMessage::MakeMove {
                room_id,
                mv,
                game_state,
            } => self.handle_make_move(client_id, &room_id, mv, game_state),
            ClientMessage::SyncRequest { room_id } => self.handle_sync_request(client_id, &room_id),
            ClientMessage::GameOver { room_id, winner } => {
                self.handle_game_over(client_id, &room_id, winner)
            }
            ClientMessage::LeaveRoom { room_id, player_id } => {
                self.handle_leave_room(client_id, &room_id, &player_id)
            }
            ClientMessage::RequestReplay { room_id } => {
                self.handle_request_replay(client_id, &room_id)
            }
            ClientMessage::Ping { timestamp } => vec![Outbound::new(
                client_id,
                ServerMessage::Pong {
                    client_timestamp: timestamp,
                    server_timestamp: unix_millis(),
                },
            )],
        }
    }

    /// Fire expired grace timers and reap rooms nobody ever joined.
    pub fn tick(&mut self, now: Instant) -> Vec<Outbound> {
        let mut out = Vec::new();

        for (code, player) in self.connections.take_expired(now) {
            if self.connections.is_present(&player, &code) {
                debug!("Grace timer for {} in {} fired after reconnect", player, code);
                continue;
            }
            let still_member = self
                .store
                .get(&code)
                .is_some_and(|room| room.is_member(&player));
            if !still_member {
                continue;
            }
            info!("Grace period expired for {} in {}; forfeiting", player, code);
            match self.depart(&code, &player) {
                Ok(messages) => out.extend(messages),
                Err(err) => warn!("Forfeit of {} in {} failed: {}", player, code, err),
            }
        }

        let ttl = self.config.empty_room_ttl();
        for code in self.store.codes() {
            let Some(room) = self.store.get(&code) else {
                continue;
            };
            if room.players.is_empty() && now.saturating_duration_since(room.created_at) >= ttl {
                info!("Deleting empty room {}", code);
                self.store.delete(&code);
            }
        }

        out
    }

    // --- Handlers ---

    fn handle_identify(&mut self, client_id: u64, player: PlayerId) -> Vec<Outbound> {
        match self.connections.identify(client_id, &player) {
            Ok(Some(displaced)) => info!(
                "Player {} moved from client {} to {}",
                player, displaced, client_id
            ),
            Ok(None) => debug!("Client {} identified as {}", client_id, player),
            Err(err) => {
                warn!("Client {} failed to identify: {}", client_id, err);
                return Vec::new();
            }
        }

        let Some(code) = self.store.find_by_player(&player) else {
            return vec![Outbound::new(
                client_id,
                ServerMessage::Identified {
                    player_id: player,
                    room_id: None,
                },
            )];
        };
        let Some(room) = self.store.get(&code) else {
            return Vec::new();
        };

        self.connections.enter_room(client_id, &code);
        if self.connections.cancel_grace(&code, &player) {
            info!("Player {} reconnected to {} within grace period", player, code);
        }

        let mut out = vec![Outbound::new(
            client_id,
            ServerMessage::Identified {
                player_id: player.clone(),
                room_id: Some(code.clone()),
            },
        )];
        out.extend(self.snapshot_for(client_id, &room));
        if room.is_game_started {
            out.extend(self.broadcast(
                &room,
                ServerMessage::PlayerReconnected {
                    room_id: code,
                    player_id: player.clone(),
                },
                Some(&player),
            ));
        }
        out
    }

    fn handle_create_room(&mut self, client_id: u64, now: Instant) -> Vec<Outbound> {
        let code = match unique_room_code(&self.store, &mut self.rng, self.config.room_code_length)
        {
            Ok(code) => code,
            Err(err) => {
                warn!("Could not generate room code: {}", err);
                return Vec::new();
            }
        };
        self.store.create(Room::new(code.clone(), now));
        info!("Client {} created room {}", client_id, code);
        vec![Outbound::new(
            client_id,
            ServerMessage::RoomCreated { room_id: code },
        )]
    }

    fn handle_join_room(&mut self, client_id: u64, room_id: &str, player: Player) -> Vec<Outbound> {
        let request = RequestKind::JoinRoom;
        let code = match RoomCode::parse(room_id) {
            Ok(code) => code,
            Err(err) => return self.fail(client_id, request, None, err.into()),
        };

        match self.connections.player_of(client_id) {
            Some(bound) if bound != &player.id => {
                return self.fail(client_id, request, Some(code), RoomError::IdentityMismatch)
            }
            Some(_) => {}
            None => {
                if let Err(err) = self.connections.identify(client_id, &player.id) {
                    warn!("Client {} failed to identify on join: {}", client_id, err);
                    return self.fail(client_id, request, Some(code), RoomError::NotIdentified);
                }
            }
        }

        let Some(mut room) = self.store.get(&code) else {
            return self.fail(client_id, request, Some(code.clone()), RoomError::RoomNotFound(code));
        };

        let mut out = Vec::new();
        if let Some(previous) = self.connections.room_of(client_id).cloned() {
            if previous != code {
                out.extend(self.depart(&previous, &player.id).unwrap_or_default());
                self.connections.leave_room(client_id);
            }
        }

        let player_id = player.id.clone();
        let players = match room.join(player, &self.rules) {
            Ok(players) => players,
            Err(err) => {
                debug!("Join of {} to {} refused: {}", player_id, code, err);
                out.extend(self.fail(client_id, request, Some(code), err));
                return out;
            }
        };
        self.store.update(room.clone());
        self.connections.enter_room(client_id, &code);
        info!("Player {} joined room {}", player_id, code);

        out.push(self.ack(client_id, request, &code, players.clone()));
        out.extend(self.broadcast(
            &room,
            ServerMessage::PlayerUpdated {
                room_id: code.clone(),
                players,
            },
            None,
        ));
        out
    }

    fn handle_update_player(
        &mut self,
        client_id: u64,
        room_id: &str,
        player: Player,
    ) -> Vec<Outbound> {
        let request = RequestKind::UpdatePlayer;
        let (code, mut room) = match self.member_room(client_id, room_id) {
            Ok(found) => found,
            Err((code, err)) => return self.fail(client_id, request, code, err),
        };
        if self.connections.player_of(client_id) != Some(&player.id) {
            return self.fail(client_id, request, Some(code), RoomError::IdentityMismatch);
        }

        let players = match room.update_player(player) {
            Ok(players) => players,
            Err(err) => return self.fail(client_id, request, Some(code), err),
        };
        self.store.update(room.clone());

        let mut out = vec![self.ack(client_id, request, &code, players.clone())];
        out.extend(self.broadcast(
            &room,
            ServerMessage::PlayerUpdated {
                room_id: code,
                players,
            },
            None,
        ));
        out
    }

    fn handle_start_game(&mut self, client_id: u64, room_id: &str) -> Vec<Outbound> {
        let request = RequestKind::StartGame;
        let (code, mut room) = match self.member_room(client_id, room_id) {
            Ok(found) => found,
            Err((code, err)) => return self.fail(client_id, request, code, err),
        };
        let Some(requester) = self.connections.player_of(client_id).cloned() else {
            return self.fail(client_id, request, Some(code), RoomError::NotIdentified);
        };

        let state = match room.start_game(&requester, &self.rules) {
            Ok(state) => state.clone(),
            Err(err) => {
                debug!("Start of {} refused: {}", code, err);
                return self.fail(client_id, request, Some(code), err);
            }
        };
        self.store.update(room.clone());
        info!("Room {} started with {} players", code, state.players.len());

        let players = room.members();
        let mut out = vec![self.ack(client_id, request, &code, players.clone())];
        match wire::state_hash(&state) {
            Ok(checksum) => out.extend(self.broadcast(
                &room,
                ServerMessage::GameStarted {
                    room_id: code,
                    players,
                    game_state: state,
                    checksum,
                },
                None,
            )),
            Err(err) => warn!("Failed to hash initial state for {}: {}", code, err),
        }
        out
    }

    fn handle_make_move(
        &mut self,
        client_id: u64,
        room_id: &str,
        mv: Move,
        client_state: Option<GameState>,
    ) -> Vec<Outbound> {
        let code = match RoomCode::parse(room_id) {
            Ok(code) => code,
            Err(_) => return reject(client_id, None, mv, MoveRejectReason::InvalidRoomCode),
        };
        match self.connections.player_of(client_id) {
            None => {
                return reject(client_id, Some(code), mv, MoveRejectReason::NotIdentified);
            }
            Some(bound) if bound != &mv.player_id => {
                return reject(client_id, Some(code), mv, MoveRejectReason::IdentityMismatch);
            }
            Some(_) => {}
        }
        let Some(mut room) = self.store.get(&code) else {
            return reject(client_id, Some(code), mv, MoveRejectReason::RoomNotFound);
        };
        if !room.is_game_started {
            return reject(client_id, Some(code), mv, MoveRejectReason::GameNotStarted);
        }

        let pre = match room.begin_move(&mv) {
            Ok(pre) => pre,
            Err(err) => {
                debug!("Rejected move {:?} in {}: {}", mv, code, err);
                return reject(client_id, Some(code), mv, err.reason());
            }
        };
        let players = room.members();
        self.store.update(room);

        let mut out = Vec::new();
        if let Some(client_state) = client_state {
            let theirs = wire::state_hash(&GameState {
                resolving: false,
                ..client_state
            });
            let ours = wire::state_hash(&pre);
            if let (Ok(theirs), Ok(ours)) = (theirs, ours) {
                if theirs != ours {
                    warn!(
                        "Client {} state diverged in {} (client {:016x}, server {:016x})",
                        client_id, code, theirs, ours
                    );
                    out.push(Outbound::new(
                        client_id,
                        ServerMessage::SyncGameState {
                            room_id: code.clone(),
                            players,
                            game_state: pre.clone(),
                            checksum: ours,
                        },
                    ));
                }
            }
        }

        let outcome = match apply_move(&pre, &mv) {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(mut room) = self.store.get(&code) {
                    room.abort_move();
                    self.store.update(room);
                }
                let reason = MoveRejectReason::from(&err);
                out.extend(reject(client_id, Some(code), mv, reason));
                return out;
            }
        };
        if outcome.truncated {
            warn!(
                "Explosion chain in {} hit the operation limit at move {}",
                code, outcome.state.move_number
            );
        }
        for player in &outcome.eliminated {
            info!("Player {} eliminated in {}", player, code);
        }

        let Some(mut room) = self.store.get(&code) else {
            return out;
        };
        room.commit_move(mv.clone(), outcome.state.clone());
        self.store.update(room.clone());

        let checksum = match wire::state_hash(&outcome.state) {
            Ok(checksum) => checksum,
            Err(err) => {
                warn!("Failed to hash state for {}: {}", code, err);
                0
            }
        };
        out.extend(self.broadcast(
            &room,
            ServerMessage::MoveMade {
                room_id: code.clone(),
                mv,
                events: outcome.events,
                eliminated: outcome.eliminated,
                game_state: outcome.state,
                checksum,
            },
            None,
        ));
        if let Some(state) = &room.game_state {
            if state.is_game_over {
                info!("Game in {} is over", code);
                out.extend(self.game_ended(&room, state.winner().map(|p| p.id.clone())));
            }
        }
        out
    }

    fn handle_sync_request(&mut self, client_id: u64, room_id: &str) -> Vec<Outbound> {
        let request = RequestKind::SyncRequest;
        let code = match RoomCode::parse(room_id) {
            Ok(code) => code,
            Err(err) => return self.fail(client_id, request, None, err.into()),
        };
        let Some(player) = self.connections.player_of(client_id).cloned() else {
            return self.fail(client_id, request, Some(code), RoomError::NotIdentified);
        };
        let Some(room) = self.store.get(&code) else {
            return self.fail(client_id, request, Some(code.clone()), RoomError::RoomNotFound(code));
        };
        if !room.is_member(&player) {
            return self.fail(client_id, request, Some(code), RoomError::NotInRoom);
        }

        self.connections.enter_room(client_id, &code);
        if self.connections.cancel_grace(&code, &player) {
            info!("Player {} resynced {} within grace period", player, code);
        }
        self.snapshot_for(client_id, &room)
    }

    /// Answered only to the sender, and only if the server agrees the game is over.
    fn handle_game_over(
        &mut self,
        client_id: u64,
        room_id: &str,
        claimed: Option<PlayerId>,
    ) -> Vec<Outbound> {
        let Ok(code) = RoomCode::parse(room_id) else {
            return Vec::new();
        };
        let Some(room) = self.store.get(&code) else {
            return Vec::new();
        };
        let Some(state) = room.game_state.as_ref().filter(|s| s.is_game_over) else {
            debug!("Ignoring game-over claim for running game {}", code);
            return Vec::new();
        };
        let winner = state.winner().map(|p| p.id.clone());
        if claimed.is_some() && claimed != winner {
            warn!(
                "Client {} claimed winner {:?} in {}, server has {:?}",
                client_id, claimed, code, winner
            );
        }
        vec![Outbound::new(
            client_id,
            ServerMessage::GameEnded {
                room_id: code,
                winner,
            },
        )]
    }

    fn handle_leave_room(
        &mut self,
        client_id: u64,
        room_id: &str,
        player: &PlayerId,
    ) -> Vec<Outbound> {
        let request = RequestKind::LeaveRoom;
        let (code, _) = match self.member_room(client_id, room_id) {
            Ok(found) => found,
            Err((code, err)) => return self.fail(client_id, request, code, err),
        };
        if self.connections.player_of(client_id) != Some(player) {
            return self.fail(client_id, request, Some(code), RoomError::IdentityMismatch);
        }

        self.connections.leave_room(client_id);
        match self.depart(&code, player) {
            Ok(mut out) => {
                let players = self
                    .store
                    .get(&code)
                    .map(|room| room.members())
                    .unwrap_or_default();
                out.insert(0, self.ack(client_id, request, &code, players));
                out
            }
            Err(err) => self.fail(client_id, request, Some(code), err),
        }
    }

    fn handle_request_replay(&mut self, client_id: u64, room_id: &str) -> Vec<Outbound> {
        let request = RequestKind::RequestReplay;
        let (code, room) = match self.member_room(client_id, room_id) {
            Ok(found) => found,
            Err((code, err)) => return self.fail(client_id, request, code, err),
        };
        match room.replay_file() {
            Some(replay) => vec![Outbound::new(
                client_id,
                ServerMessage::ReplayFile {
                    room_id: code,
                    replay,
                },
            )],
            None => self.fail(client_id, request, Some(code), RoomError::GameNotStarted),
        }
    }

    // --- Helpers ---

    /// Remove `player` from `code` (lobby leave or mid-game forfeit) and build the broadcasts.
    fn depart(&mut self, code: &RoomCode, player: &PlayerId) -> Result<Vec<Outbound>, RoomError> {
        let mut room = self
            .store
            .get(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.clone()))?;
        let outcome = room.leave(player)?;
        self.connections.cancel_grace(code, player);

        if room.is_abandoned() {
            info!("Room {} is empty; deleting", code);
            self.store.delete(code);
            self.connections.cancel_room_grace(code);
            return Ok(Vec::new());
        }
        self.store.update(room.clone());

        let players = room.members();
        let mut out = self.broadcast(
            &room,
            ServerMessage::PlayerLeft {
                room_id: code.clone(),
                player_id: player.clone(),
                players: players.clone(),
                game_state: room.game_state.clone(),
            },
            Some(player),
        );
        match outcome {
            LeaveOutcome::Removed { new_owner } => {
                if let Some(owner) = new_owner {
                    info!("Player {} now owns {}", owner, code);
                }
                out.extend(self.broadcast(
                    &room,
                    ServerMessage::PlayerUpdated {
                        room_id: code.clone(),
                        players,
                    },
                    Some(player),
                ));
            }
            LeaveOutcome::Forfeited {
                new_owner,
                ended_game,
            } => {
                info!("Player {} forfeited in {}", player, code);
                if let Some(owner) = new_owner {
                    info!("Player {} now owns {}", owner, code);
                }
                if ended_game {
                    let winner = room
                        .game_state
                        .as_ref()
                        .and_then(|s| s.winner())
                        .map(|p| p.id.clone());
                    out.extend(self.game_ended(&room, winner));
                }
            }
            LeaveOutcome::LeftFinished { new_owner } => {
                if let Some(owner) = new_owner {
                    info!("Player {} now owns {}", owner, code);
                }
            }
        }
        Ok(out)
    }

    /// Parse the code and check that the sender is a live member of that room.
    fn member_room(
        &self,
        client_id: u64,
        room_id: &str,
    ) -> Result<(RoomCode, Room), (Option<RoomCode>, RoomError)> {
        let code = RoomCode::parse(room_id).map_err(|err| (None, err.into()))?;
        let player = self
            .connections
            .player_of(client_id)
            .ok_or_else(|| (Some(code.clone()), RoomError::NotIdentified))?;
        let room = self
            .store
            .get(&code)
            .ok_or_else(|| (Some(code.clone()), RoomError::RoomNotFound(code.clone())))?;
        if !room.is_member(player) {
            return Err((Some(code), RoomError::NotInRoom));
        }
        Ok((code, room))
    }

    /// Lobby roster or full game snapshot, whichever the room is in.
    fn snapshot_for(&self, client_id: u64, room: &Room) -> Vec<Outbound> {
        let message = match &room.game_state {
            Some(state) if room.is_game_started => match wire::state_hash(state) {
                Ok(checksum) => ServerMessage::SyncGameState {
                    room_id: room.id.clone(),
                    players: room.members(),
                    game_state: state.clone(),
                    checksum,
                },
                Err(err) => {
                    warn!("Failed to hash state for {}: {}", room.id, err);
                    return Vec::new();
                }
            },
            _ => ServerMessage::PlayerUpdated {
                room_id: room.id.clone(),
                players: room.members(),
            },
        };
        vec![Outbound::new(client_id, message)]
    }

    fn game_ended(&self, room: &Room, winner: Option<PlayerId>) -> Vec<Outbound> {
        self.broadcast(
            room,
            ServerMessage::GameEnded {
                room_id: room.id.clone(),
                winner,
            },
            None,
        )
    }

    /// Address `message` to every connected member of `room`, optionally skipping one player.
    fn broadcast(
        &self,
        room: &Room,
        message: ServerMessage,
        except: Option<&PlayerId>,
    ) -> Vec<Outbound> {
        let members = room.members();
        let ids = members
            .iter()
            .map(|p| &p.id)
            .filter(|id| Some(*id) != except);
        self.connections
            .clients_in(&room.id, ids)
            .into_iter()
            .map(|client_id| Outbound::new(client_id, message.clone()))
            .collect()
    }

    fn ack(
        &self,
        client_id: u64,
        request: RequestKind,
        code: &RoomCode,
        players: Vec<Player>,
    ) -> Outbound {
        Outbound::new(
            client_id,
            ServerMessage::Ack {
                request,
                room_id: Some(code.clone()),
                result: AckResult::Success { players },
            },
        )
    }

    fn fail(
        &self,
        client_id: u64,
        request: RequestKind,
        code: Option<RoomCode>,
        err: RoomError,
    ) -> Vec<Outbound> {
        vec![Outbound::new(
            client_id,
            ServerMessage::Ack {
                request,
                room_id: code,
                result: AckResult::Failure {
                    reason: err.reason(),
                    message: err.to_string(),
                },
            },
        )]
    }
}

fn reject(
    client_id: u64,
    room_id: Option<RoomCode>,
    mv: Move,
    reason: MoveRejectReason,
) -> Vec<Outbound> {
    vec![Outbound::new(
        client_id,
        ServerMessage::MoveRejected {
            room_id,
            mv,
            reason,
        },
    )]
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
