//! Error codes for structured error handling in the Plaza protocol.
//!
//! These codes are wire-compatible with the server's `ErrorCode` enum and
//! serialize using `SCREAMING_SNAKE_CASE` to match the server's JSON format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the Plaza server.
///
/// Each variant corresponds to a specific error condition. The server sends
/// these as `"SCREAMING_SNAKE_CASE"` strings (e.g., `"ROOM_NOT_FOUND"`).
///
/// Use [`description()`](ErrorCode::description) for a human-readable
/// explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Session errors
    Unauthorized,
    HandshakeRequired,
    DuplicateSession,
    HandshakeTimeout,

    // Validation errors
    InvalidInput,
    InvalidRoomName,
    InvalidDisplayName,
    InvalidMaxPlayers,
    MessageTooLarge,

    // Room errors
    RoomNotFound,
    RoomFull,
    RoomLocked,
    AlreadyInRoom,
    NotInRoom,
    RoomCreationFailed,
    InvalidRoomState,

    // Lifecycle errors
    NotHost,
    GameAlreadyStarted,
    GameNotStarted,

    // Role errors
    RoleSwitchRejected,
    ObserverNotAllowed,

    // Rate limiting
    RateLimitExceeded,
    TooManyConnections,

    // Server errors
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            // Session errors
            Self::Unauthorized => {
                "Access denied. The session identity is missing or invalid."
            }
            Self::HandshakeRequired => {
                "This operation requires a completed handshake. Send Hello first."
            }
            Self::DuplicateSession => {
                "Another live session already exists for this user. Disconnect it first."
            }
            Self::HandshakeTimeout => {
                "The handshake took too long to complete. Please reconnect."
            }

            // Validation errors
            Self::InvalidInput => {
                "The provided input is invalid or malformed. Check your request parameters."
            }
            Self::InvalidRoomName => {
                "The room name is invalid. Room names must be non-empty and within length limits."
            }
            Self::InvalidDisplayName => {
                "The display name is invalid. Display names must be non-empty and within length limits."
            }
            Self::InvalidMaxPlayers => {
                "The maximum player count is invalid. It must be a positive number within allowed limits."
            }
            Self::MessageTooLarge => {
                "The message size exceeds the maximum allowed limit. Please send a smaller message."
            }

            // Room errors
            Self::RoomNotFound => {
                "The requested room could not be found. It may have been closed already."
            }
            Self::RoomFull => {
                "The room has reached its maximum player capacity. Try a different room or spectate."
            }
            Self::RoomLocked => {
                "The room is locked and cannot be joined."
            }
            Self::AlreadyInRoom => {
                "You are already in a room. Leave the current room before joining another."
            }
            Self::NotInRoom => {
                "You are not currently in any room. Join a room before performing this action."
            }
            Self::RoomCreationFailed => {
                "Failed to create the room. Please try again."
            }
            Self::InvalidRoomState => {
                "The room is in an invalid state for this operation. Try refreshing the room state."
            }

            // Lifecycle errors
            Self::NotHost => {
                "Only the room host can perform this operation."
            }
            Self::GameAlreadyStarted => {
                "The game has already started in this room."
            }
            Self::GameNotStarted => {
                "No game is currently running in this room."
            }

            // Role errors
            Self::RoleSwitchRejected => {
                "The role switch was rejected. The player set may be full."
            }
            Self::ObserverNotAllowed => {
                "Observers are not allowed in this room."
            }

            // Rate limiting
            Self::RateLimitExceeded => {
                "Too many requests in a short time. Please slow down and try again later."
            }
            Self::TooManyConnections => {
                "You have too many active connections. Close some connections before opening new ones."
            }

            // Server errors
            Self::InternalError => {
                "An internal server error occurred. Please try again later."
            }
            Self::ServiceUnavailable => {
                "The service is temporarily unavailable. Please try again in a few moments."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
