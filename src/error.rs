//! Error types for the Plaza client.

use thiserror::Error;

/// Errors that can occur when using the Plaza client.
#[derive(Debug, Error)]
pub enum PlazaError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to establish a new transport connection.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the
    /// session is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a room operation but the session is not in a room.
    #[error("not in a room")]
    NotInRoom,

    /// Attempted a host-only operation (start game, update room settings)
    /// without being the room host.
    #[error("operation requires room host")]
    NotHost,

    /// Attempted to send a board move out of turn.
    #[error("not the local player's turn")]
    NotYourTurn,

    /// The server returned an error message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
        /// Structured error code, if provided by the server.
        error_code: Option<String>,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Plaza client operations.
pub type Result<T> = std::result::Result<T, PlazaError>;
