//! Transport abstraction for the Plaza session protocol.
//!
//! The protocol is JSON text messages over any bidirectional channel, so the
//! [`Transport`] trait is a text pipe: each `send` carries one complete
//! message, each `recv` yields one. Framing (WebSocket frames,
//! length-prefixed TCP, whatever) is the implementation's business.
//!
//! Because a session outlives individual connections — the loop reconnects
//! after a transport failure — connection setup lives in a second trait,
//! [`Connector`], which mints a fresh transport on demand. A one-shot session
//! that should never reconnect can skip the connector and hand a connected
//! transport straight to `PlazaSession::connect`.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use plaza_client::error::PlazaError;
//! use plaza_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), PlazaError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PlazaError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PlazaError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::PlazaError;

/// A bidirectional text message transport for the Plaza session protocol.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message; each call to [`recv`](Transport::recv) returns one.
///
/// # Object Safety
///
/// This trait is object-safe; the session loop holds a `Box<dyn Transport>`
/// so a [`Connector`] can swap in a fresh connection after a failure.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If the future is dropped before completion,
/// calling `recv` again must not lose a message. Channel-based
/// implementations (wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::TransportSend`] if the message could not be
    /// sent (connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), PlazaError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, PlazaError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this, subsequent `send` and `recv` calls may return
    /// errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources when the close handshake fails.
    async fn close(&mut self) -> Result<(), PlazaError>;
}

/// Mints fresh connected transports for the session's reconnect loop.
///
/// Each call to [`connect`](Connector::connect) must produce a brand-new
/// connection; the session never reuses a failed transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection and return it ready for the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::Connect`] (or a transport-specific error) when
    /// the connection cannot be established. The session loop treats any
    /// error as one failed attempt and backs off before retrying.
    async fn connect(&self) -> Result<Box<dyn Transport>, PlazaError>;
}
