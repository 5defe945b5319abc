//! Connection registry: transient client ids, durable player ids and disconnect grace timers.
//!
//! Grace timers are deadlines keyed by `(room, player)`. They are polled from the server tick,
//! cancelled explicitly on reconnect, and the expiry handler still re-checks presence before
//! forfeiting anyone.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cascade_protocol::{PlayerId, RoomCode};

/// Per-connection state.
#[derive(Clone, Debug)]
pub struct Session {
    pub client_id: u64,
    pub player_id: Option<PlayerId>,
    pub room: Option<RoomCode>,
    pub connected_at: Instant,
    /// Rate limiting: message count in current window
    message_count: u32,
    /// Rate limiting: window start time
    rate_window_start: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentifyError {
    #[error("Unknown connection {0}")]
    UnknownClient(u64),
    #[error("Connection already identified as {0}")]
    AlreadyIdentified(PlayerId),
}

pub struct ConnectionRegistry {
    sessions: HashMap<u64, Session>,
    player_to_client: HashMap<PlayerId, u64>,
    /// Pending forfeits: deadline per (room, player)
    grace: HashMap<(RoomCode, PlayerId), Instant>,
    disconnect_grace: Duration,
    rate_limit_messages: u32,
    rate_limit_window: Duration,
}

impl ConnectionRegistry {
    pub fn new(
        disconnect_grace: Duration,
        rate_limit_messages: u32,
        rate_limit_window: Duration,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            player_to_client: HashMap::new(),
            grace: HashMap::new(),
            disconnect_grace,
            rate_limit_messages,
            rate_limit_window,
        }
    }

    pub fn connect(&mut self, client_id: u64, now: Instant) {
        self.sessions.insert(
            client_id,
            Session {
                client_id,
                player_id: None,
                room: None,
                connected_at: now,
                message_count: 0,
                rate_window_start: now,
            },
        );
    }

    /// Drop a connection. Returns its last session.
    pub fn disconnect(&mut self, client_id: u64) -> Option<Session> {
        let session = self.sessions.remove(&client_id)?;
        if let Some(player) = &session.player_id {
            if self.player_to_client.get(player) == Some(&client_id) {
                self.player_to_client.remove(player);
            }
        }
        Some(session)
    }

    /// Bind `client_id` to a durable player id.
    ///
    /// A newer connection for the same player takes over; the displaced client id is returned.
    pub fn identify(
        &mut self,
        client_id: u64,
        player: &PlayerId,
    ) -> Result<Option<u64>, IdentifyError> {
        let session = self
            .sessions
            .get_mut(&client_id)
            .ok_or(IdentifyError::UnknownClient(client_id))?;
        match &session.player_id {
            Some(existing) if existing == player => return Ok(None),
            Some(existing) => return Err(IdentifyError::AlreadyIdentified(existing.clone())),
            None => {}
        }
        session.player_id = Some(player.clone());

        let displaced = self
            .player_to_client
            .insert(player.clone(), client_id)
            .filter(|old| *old != client_id);
        if let Some(old) = displaced {
            if let Some(stale) = self.sessions.get_mut(&old) {
                stale.player_id = None;
                stale.room = None;
            }
        }
        Ok(displaced)
    }

    pub fn enter_room(&mut self, client_id: u64, room: &RoomCode) {
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.room = Some(room.clone());
        }
    }

    pub fn leave_room(&mut self, client_id: u64) {
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.room = None;
        }
    }

    pub fn session(&self, client_id: u64) -> Option<&Session> {
        self.sessions.get(&client_id)
    }

    pub fn player_of(&self, client_id: u64) -> Option<&PlayerId> {
        self.sessions.get(&client_id)?.player_id.as_ref()
    }

    pub fn room_of(&self, client_id: u64) -> Option<&RoomCode> {
        self.sessions.get(&client_id)?.room.as_ref()
    }

    pub fn client_of(&self, player: &PlayerId) -> Option<u64> {
        self.player_to_client.get(player).copied()
    }

    /// The player has a live connection attached to `room`.
    pub fn is_present(&self, player: &PlayerId, room: &RoomCode) -> bool {
        self.client_of(player)
            .and_then(|client| self.room_of(client))
            .is_some_and(|r| r == room)
    }

    /// Client ids of `players` currently attached to `room`.
    pub fn clients_in<'a>(
        &self,
        room: &RoomCode,
        players: impl IntoIterator<Item = &'a PlayerId>,
    ) -> Vec<u64> {
        players
            .into_iter()
            .filter_map(|player| self.client_of(player))
            .filter(|client| self.room_of(*client) == Some(room))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    // --- Grace timers ---

    pub fn start_grace(&mut self, room: &RoomCode, player: &PlayerId, now: Instant) -> Instant {
        let deadline = now + self.disconnect_grace;
        self.grace.insert((room.clone(), player.clone()), deadline);
        deadline
    }

    /// Returns `true` if a pending timer was cancelled.
    pub fn cancel_grace(&mut self, room: &RoomCode, player: &PlayerId) -> bool {
        self.grace.remove(&(room.clone(), player.clone())).is_some()
    }

    pub fn cancel_room_grace(&mut self, room: &RoomCode) {
        self.grace.retain(|(r, _), _| r != room);
    }

    pub fn grace_deadline(&self, room: &RoomCode, player: &PlayerId) -> Option<Instant> {
        self.grace.get(&(room.clone(), player.clone())).copied()
    }

    /// Remove and return every timer whose deadline has passed, oldest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(RoomCode, PlayerId)> {
        let mut expired: Vec<((RoomCode, PlayerId), Instant)> = self
            .grace
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (key.clone(), *deadline))
            .collect();
        expired.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (key, _) in &expired {
            self.grace.remove(key);
        }
        expired.into_iter().map(|(key, _)| key).collect()
    }

    pub fn disconnect_grace(&self) -> Duration {
        self.disconnect_grace
    }

    // --- Rate limiting ---

    /// Returns `true` if the message is allowed.
    pub fn check_rate_limit(&mut self, client_id: u64, now: Instant) -> bool {
        let Some(session) = self.sessions.get_mut(&client_id) else {
            return true; // Unknown client - let message through for error handling
        };

        if now.duration_since(session.rate_window_start) >= self.rate_limit_window {
            session.rate_window_start = now;
            session.message_count = 0;
        }

        session.message_count += 1;
        session.message_count <= self.rate_limit_messages
    }
}
