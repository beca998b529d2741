//! # Plaza Client
//!
//! Transport-agnostic Rust client core for the Plaza real-time multiplayer
//! plaza: a shared social space whose users chat, move avatars, and play
//! short minigames in rooms.
//!
//! This crate keeps a session synchronized with a Plaza server over JSON
//! text messages on any bidirectional transport. The server is the source
//! of truth for every piece of shared state; the client renders confirmed
//! state and sends advisory requests.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] trait for any
//!   backend; a [`Connector`] mints fresh connections for reconnects
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketConnector`] and [`WebSocketTransport`]
//! - **Event-driven** — register closures on the [`EventBus`] per
//!   [`EventCategory`]; every server-originated change arrives as a typed
//!   [`PlazaEvent`]
//! - **Self-healing** — heartbeats, automatic reconnect with subscription
//!   replay, and state refresh after an outage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plaza_client::{
//!     EventCategory, PlazaConfig, PlazaEvent, PlazaSession, SessionIdentity,
//!     WebSocketConnector,
//! };
//!
//! # async fn example() -> Result<(), plaza_client::PlazaError> {
//! let connector = WebSocketConnector::new("ws://localhost:8017/plaza");
//! let identity = SessionIdentity::new("Alice");
//! let (mut session, bus) =
//!     PlazaSession::connect(connector, identity, PlazaConfig::new()).await?;
//!
//! let _rooms = bus.on(EventCategory::RoomList, |event| {
//!     if let PlazaEvent::RoomList(rooms) = event {
//!         println!("{} rooms open", rooms.len());
//!     }
//! });
//!
//! session.send_chat("hello, plaza")?;
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod directory;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod games;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use bus::{EventBus, ListenerHandle};
pub use error::{PlazaError, Result};
pub use error_codes::ErrorCode;
pub use event::{EventCategory, PlazaEvent};
pub use games::{GameRouter, GameView};
pub use protocol::{
    ClientMessage, GameRequest, GameType, RoomId, RoomSummary, ServerGameEvent, ServerMessage,
    SessionRole, UserId,
};
pub use registry::{Topic, TopicRegistry};
pub use room::{RoomPhase, RoomView};
pub use session::{ConnectionState, PlazaConfig, PlazaSession, SessionIdentity};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
