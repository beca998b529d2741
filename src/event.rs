//! Typed events emitted by a Plaza session to its consumers.
//!
//! Every server-originated change and every local connection-state change is
//! surfaced as one [`PlazaEvent`], dispatched through the session's
//! [`EventBus`](crate::bus::EventBus) under a fixed [`EventCategory`].

use crate::error_codes::ErrorCode;
use crate::protocol::{
    ChatMessage, GameType, PositionSample, RoomId, RoomSummary, ServerGameEvent, UserId,
};
use crate::room::RoomView;
use crate::session::ConnectionState;

/// The closed set of event categories consumers can listen to.
///
/// Multiple independent handlers may register for the same category;
/// registration order does not affect delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Room directory changed (diff applied or snapshot replaced).
    RoomList,
    /// Membership or phase of the locally occupied room changed.
    RoomDetail,
    /// A global or room-scoped chat message arrived.
    Chat,
    /// A confirmed game event was applied.
    Game,
    /// The result of a local join request arrived.
    JoinResult,
    /// The local connection state changed (emitted locally, not by the
    /// server).
    Connection,
    /// Another avatar's position sample arrived.
    Position,
    /// A game invitation addressed to this user arrived.
    Invite,
    /// The server reported an error outside any request context.
    Error,
}

/// An event delivered to registered listeners.
#[derive(Debug, Clone)]
pub enum PlazaEvent {
    /// Current room directory contents after a change.
    RoomList(Vec<RoomSummary>),
    /// Snapshot of the locally occupied room after a change.
    RoomDetail(RoomView),
    /// A chat message; `room_id` is `None` for global plaza chat.
    Chat {
        room_id: Option<RoomId>,
        message: ChatMessage,
    },
    /// A confirmed game event, already applied to the game view.
    Game(ServerGameEvent),
    /// Typed join outcome for a local join request.
    JoinResult {
        success: bool,
        room_id: RoomId,
        error_code: Option<ErrorCode>,
        reason: Option<String>,
    },
    /// Connection state change, for reconnect indicators.
    Connection(ConnectionState),
    /// Another avatar moved.
    Position(PositionSample),
    /// A game invitation.
    Invite {
        from_user_id: UserId,
        from_display_name: String,
        room_id: RoomId,
        game_type: GameType,
    },
    /// A server-reported error that is not tied to a join request.
    Error {
        message: String,
        error_code: Option<ErrorCode>,
    },
}

impl PlazaEvent {
    /// The category this event is dispatched under.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::RoomList(_) => EventCategory::RoomList,
            Self::RoomDetail(_) => EventCategory::RoomDetail,
            Self::Chat { .. } => EventCategory::Chat,
            Self::Game(_) => EventCategory::Game,
            Self::JoinResult { .. } => EventCategory::JoinResult,
            Self::Connection(_) => EventCategory::Connection,
            Self::Position(_) => EventCategory::Position,
            Self::Invite { .. } => EventCategory::Invite,
            Self::Error { .. } => EventCategory::Error,
        }
    }
}
