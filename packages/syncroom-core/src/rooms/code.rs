//! Room code parsing.

use std::fmt;

use serde::Serialize;

use super::RoomError;
use crate::protocol_constants::ROOM_CODE_LEN;

/// A room code: exactly six characters from `[A-Z0-9]`.
///
/// Codes are generated by clients; the server only normalizes and validates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Parses user input, trimming whitespace and normalizing to uppercase.
    pub fn parse(input: &str) -> Result<Self, RoomError> {
        let normalized = input.trim().to_ascii_uppercase();
        let valid = normalized.len() == ROOM_CODE_LEN
            && normalized
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if valid {
            Ok(Self(normalized))
        } else {
            Err(RoomError::InvalidRoomCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
