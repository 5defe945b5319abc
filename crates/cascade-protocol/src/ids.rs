use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Durable player identity.
///
/// Generated once and persisted by the client, so it survives reconnects. It is never the
/// transport-level connection id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Characters used when generating room codes. Ambiguous glyphs (0/O, 1/I) are left out so
/// codes can be read aloud and typed by hand.
pub const ROOM_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_MIN_LEN: usize = 4;
pub const ROOM_CODE_MAX_LEN: usize = 12;

/// Short, human-typeable room code. Stored upper-case so comparisons are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse user input, normalising case and surrounding whitespace.
    pub fn parse(value: &str) -> Result<Self, RoomCodeError> {
        let normalized = value.trim().to_ascii_uppercase();
        let len = normalized.chars().count();
        if !(ROOM_CODE_MIN_LEN..=ROOM_CODE_MAX_LEN).contains(&len) {
            return Err(RoomCodeError::InvalidLength {
                min: ROOM_CODE_MIN_LEN,
                max: ROOM_CODE_MAX_LEN,
                found: len,
            });
        }
        for (index, ch) in normalized.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(RoomCodeError::InvalidCharacter { ch, index });
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomCodeError {
    #[error("room code must be {min}-{max} chars, got {found}")]
    InvalidLength { min: usize, max: usize, found: usize },
    #[error("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_compare_case_insensitively() {
        let a = RoomCode::parse("abc234").unwrap();
        let b = RoomCode::parse(" ABC234 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ABC234");
    }

    #[test]
    fn room_code_rejects_bad_input() {
        assert!(matches!(
            RoomCode::parse("ab"),
            Err(RoomCodeError::InvalidLength { found: 2, .. })
        ));
        assert!(matches!(
            RoomCode::parse("AB-CD"),
            Err(RoomCodeError::InvalidCharacter { ch: '-', index: 2 })
        ));
    }

    #[test]
    fn room_code_deserialize_normalizes() {
        let code: RoomCode = serde_json::from_str("\"xyz789\"").unwrap();
        assert_eq!(code.as_str(), "XYZ789");
        assert!(serde_json::from_str::<RoomCode>("\"x\"").is_err());
    }
}
