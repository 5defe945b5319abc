//! Room storage.
//!
//! The sync service only talks to rooms through [`RoomStore`], so the in-memory map can be
//! swapped for another backend without touching protocol handling.

use std::collections::HashMap;

use cascade_protocol::{PlayerId, RoomCode, RoomCodeError, ROOM_CODE_ALPHABET};
use rand::Rng;

use crate::room::Room;

/// Authoritative map from room code to room.
pub trait RoomStore {
    /// Snapshot of a room. Changes are only visible to others after [`RoomStore::update`].
    fn get(&self, code: &RoomCode) -> Option<Room>;
    /// Insert a new room. Returns `false` if the code is already taken.
    fn create(&mut self, room: Room) -> bool;
    /// Replace an existing room. Returns `false` if it no longer exists.
    fn update(&mut self, room: Room) -> bool;
    fn delete(&mut self, code: &RoomCode) -> Option<Room>;
    fn contains(&self, code: &RoomCode) -> bool;
    fn codes(&self) -> Vec<RoomCode>;
    /// Room whose live roster contains `player`.
    fn find_by_player(&self, player: &PlayerId) -> Option<RoomCode>;
}

#[derive(Debug, Default)]
pub struct InMemoryRoomStore {
    rooms: HashMap<RoomCode, Room>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomStore for InMemoryRoomStore {
    fn get(&self, code: &RoomCode) -> Option<Room> {
        self.rooms.get(code).cloned()
    }

    fn create(&mut self, room: Room) -> bool {
        if self.rooms.contains_key(&room.id) {
            return false;
        }
        self.rooms.insert(room.id.clone(), room);
        true
    }

    fn update(&mut self, room: Room) -> bool {
        match self.rooms.get_mut(&room.id) {
            Some(slot) => {
                *slot = room;
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    fn codes(&self) -> Vec<RoomCode> {
        let mut codes: Vec<RoomCode> = self.rooms.keys().cloned().collect();
        codes.sort();
        codes
    }

    fn find_by_player(&self, player: &PlayerId) -> Option<RoomCode> {
        let mut matches: Vec<&Room> = self
            .rooms
            .values()
            .filter(|room| room.is_member(player))
            .collect();
        // Prefer the most recently created room if an identity ended up in several.
        matches.sort_by_key(|room| std::cmp::Reverse(room.created_at));
        matches.first().map(|room| room.id.clone())
    }
}

/// Random code drawn from [`ROOM_CODE_ALPHABET`].
pub fn generate_room_code<R: Rng>(rng: &mut R, length: usize) -> Result<RoomCode, RoomCodeError> {
    let alphabet = ROOM_CODE_ALPHABET.as_bytes();
    let raw: String = (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect();
    RoomCode::parse(&raw)
}

/// Generate codes until one is free in `store`.
pub fn unique_room_code<S, R>(store: &S, rng: &mut R, length: usize) -> Result<RoomCode, RoomCodeError>
where
    S: RoomStore + ?Sized,
    R: Rng,
{
    loop {
        let code = generate_room_code(rng, length)?;
        if !store.contains(&code) {
            return Ok(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use cascade_protocol::Player;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::room::RoomRules;

    #[test]
    fn generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_room_code(&mut rng, 6).unwrap();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().chars().all(|c| ROOM_CODE_ALPHABET.contains(c)));
        }
        assert!(generate_room_code(&mut rng, 2).is_err());
    }

    #[test]
    fn unique_code_avoids_live_rooms() {
        let mut store = InMemoryRoomStore::new();
        let now = Instant::now();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let code = unique_room_code(&store, &mut rng, 4).unwrap();
            assert!(store.create(Room::new(code, now)));
        }
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn crud_round_trip() {
        let mut store = InMemoryRoomStore::new();
        let code = RoomCode::parse("abcd").unwrap();
        let now = Instant::now();
        assert!(store.create(Room::new(code.clone(), now)));
        assert!(!store.create(Room::new(code.clone(), now)));

        let mut room = store.get(&code).unwrap();
        room.join(Player::new("p1"), &RoomRules::default()).unwrap();
        assert!(store.get(&code).unwrap().players.is_empty());
        assert!(store.update(room));
        assert_eq!(store.get(&code).unwrap().players.len(), 1);

        assert!(store.contains(&RoomCode::parse("ABCD").unwrap()));
        assert_eq!(store.find_by_player(&PlayerId::from("p1")), Some(code.clone()));
        assert!(store.delete(&code).is_some());
        assert!(!store.update(Room::new(code, now)));
        assert!(store.is_empty());
    }

    #[test]
    fn find_by_player_prefers_newest_room() {
        let mut store = InMemoryRoomStore::new();
        let old = Instant::now();
        let new = old + Duration::from_secs(5);
        for (code, at) in [("PAST", old), ("NEXT", new)] {
            let mut room = Room::new(RoomCode::parse(code).unwrap(), at);
            room.join(Player::new("p1"), &RoomRules::default()).unwrap();
            store.create(room);
        }
        assert_eq!(
            store.find_by_player(&PlayerId::from("p1")).unwrap().as_str(),
            "NEXT"
        );
    }
}
