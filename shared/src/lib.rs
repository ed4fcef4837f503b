//! Types and rules shared by the arcade client and the lobby hub.

pub mod protocol;

pub use protocol::{
    ClientMessage, EntityKind, EntityState, InputFrame, LobbyInfo, LobbyPlayer, LobbyStatus,
    Role, ServerMessage,
};

use rand::Rng;
use std::fmt;
use thiserror::Error;

pub const MAX_PLAYERS: usize = 2;
pub const ROOM_CODE_LEN: usize = 6;
/// 32 symbols: A-Z and 2-9 without I, O, 0 and 1.
pub const ROOM_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 16;
pub const INPUT_SEND_RATE: u32 = 60;
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8080/ws";

/// User-correctable input problems, rejected before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a name (at least 2 characters)")]
    NameTooShort,
    #[error("Name must be at most 16 characters")]
    NameTooLong,
    #[error("Please enter a valid 6-character room code")]
    RoomCodeLength(usize),
    #[error("Room codes may only contain letters and digits, found '{0}'")]
    RoomCodeCharacter(char),
}

/// A validated, uppercase room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes user input (trim + uppercase) and checks it is six ASCII
    /// alphanumerics. Joining accepts any such code; only generated codes are
    /// restricted to [`ROOM_CODE_ALPHABET`].
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let code = raw.trim().to_ascii_uppercase();
        let len = code.chars().count();
        if len != ROOM_CODE_LEN {
            return Err(ValidationError::RoomCodeLength(len));
        }
        if let Some(bad) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(ValidationError::RoomCodeCharacter(bad));
        }
        Ok(RoomCode(code))
    }

    pub fn generate() -> Self {
        RoomCode(generate_room_code_with(&mut rand::thread_rng()))
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

/// Draws six symbols uniformly from [`ROOM_CODE_ALPHABET`].
pub fn generate_room_code() -> String {
    generate_room_code_with(&mut rand::thread_rng())
}

pub fn generate_room_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Trims the name and checks its length bounds. Returns the trimmed name.
pub fn validate_player_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < NAME_MIN_LEN {
        return Err(ValidationError::NameTooShort);
    }
    if len > NAME_MAX_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(name.to_string())
}

/// Send interval for a given rate, e.g. 60 Hz → 16.67 ms.
pub fn send_interval(rate_hz: u32) -> std::time::Duration {
    std::time::Duration::from_secs(1) / rate_hz.max(1)
}
