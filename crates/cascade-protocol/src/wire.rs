use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::{ExplosionEvent, GameState, ReplayFile};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_game_state(state: &GameState) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(state)?)
}

pub fn deserialize_game_state(bytes: &[u8]) -> Result<GameState, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_events(events: &[ExplosionEvent]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(events)?)
}

pub fn deserialize_events(bytes: &[u8]) -> Result<Vec<ExplosionEvent>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_replay(replay: &ReplayFile) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(replay)?)
}

pub fn deserialize_replay(bytes: &[u8]) -> Result<ReplayFile, WireError> {
    Ok(decode::from_slice(bytes)?)
}

/// Deterministic game state hash for desync detection.
///
/// Hashes the MessagePack-serialized state using FNV-1a 64-bit. The `resolving` flag is part
/// of the encoding, so hash committed states only.
pub fn state_hash(state: &GameState) -> Result<u64, WireError> {
    let bytes = serialize_game_state(state)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub fn serialize_game_state_json(state: &GameState) -> Result<String, WireError> {
    Ok(serde_json::to_string(state)?)
}

pub fn deserialize_game_state_json(json: &str) -> Result<GameState, WireError> {
    Ok(serde_json::from_str(json)?)
}

pub fn serialize_replay_json(replay: &ReplayFile) -> Result<String, WireError> {
    Ok(serde_json::to_string(replay)?)
}

pub fn deserialize_replay_json(json: &str) -> Result<ReplayFile, WireError> {
    Ok(serde_json::from_str(json)?)
}
