//! Wire types for the Plaza session-synchronization protocol.
//!
//! Every type in this module produces identical JSON to the server's
//! message DTOs. Notable choices:
//!
//! - All messages are internally tagged (`"type"` + `"data"`), matching the
//!   server's envelope format.
//! - Game events are a **closed** tagged union ([`ServerGameEvent`]): a new
//!   event type is a compile-time gap in dispatch, never a silent no-op.
//! - End-of-round scores travel as a structured `userId -> score` map, not a
//!   serialized debug string.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error_codes::ErrorCode;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for users.
pub type UserId = Uuid;

/// Unique identifier for rooms.
pub type RoomId = Uuid;

/// Unique identifier for reflex-game targets.
pub type TargetId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// Role requested at handshake time.
///
/// The role is connection-scoped: an Observer becoming a Player requires a
/// full reconnect, never a live upgrade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Full participant; may occupy a player slot in rooms.
    #[default]
    Player,
    /// Read-only observer; may only spectate.
    Observer,
}

/// The kind of minigame a room hosts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    /// Turn-based stone placement on a 15×15 grid.
    #[default]
    Board,
    /// Target-based reflex game: click server-spawned targets.
    Target,
    /// Timed reaction race: first click after the GO signal wins.
    Reaction,
}

/// One incremental change to the room directory cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Create,
    Update,
    Join,
    Leave,
    Delete,
}

// ── Structs ─────────────────────────────────────────────────────────

/// Summary of one room, as cached in the room directory.
///
/// Upserted by [`RoomDiff`](ServerMessage::RoomDiff) events keyed by
/// `room_id`. Player/spectator counts are authoritative snapshots from the
/// server, replaced (never incremented) on apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub name: String,
    pub game_type: GameType,
    pub host_id: UserId,
    pub max_players: u8,
    pub current_player_count: u8,
    pub is_locked: bool,
    pub is_playing: bool,
    #[serde(default)]
    pub spectator_count: u8,
}

/// One occupant of a room, player or spectator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSlot {
    pub user_id: UserId,
    pub display_name: String,
    pub ready: bool,
    pub is_host: bool,
}

/// Full membership detail for one room.
/// Boxed in [`ServerMessage`] to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatePayload {
    pub room_id: RoomId,
    pub game_type: GameType,
    pub host_id: UserId,
    pub players: Vec<PlayerSlot>,
    #[serde(default)]
    pub spectators: Vec<PlayerSlot>,
    pub is_playing: bool,
}

/// A transient avatar position sample. Superseded by the next sample for the
/// same `user_id`; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub user_id: UserId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading_radians: f32,
    pub animation_state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
    pub timestamp_ms: u64,
}

/// A chat message, global or room-scoped. Append-only; no edit or delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: UserId,
    pub display_name: String,
    pub text: String,
    pub sent_at_ms: u64,
}

/// A clickable target in the reflex game. Spawn position and size are
/// normalized to the unit square.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub spawned_at_ms: u64,
    pub lifetime_ms: u64,
}

// ── Game events ─────────────────────────────────────────────────────

/// Outbound game request from the local player.
///
/// Requests are advisory: the local view is never mutated on send. Only the
/// server's echo ([`ServerGameEvent`]) changes confirmed game state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum GameRequest {
    /// Place a stone at a flat board index (`row * 15 + col`).
    BoardMove { position: u16 },
    /// Claim a hit on an active target.
    TargetHit { target_id: TargetId },
    /// Host starts a reaction round. `immediate` skips the random delay
    /// before the GO signal (testing aid).
    ReactionStart { immediate: bool },
    /// Claim the reaction round.
    ReactionHit,
}

/// Server-confirmed game event, the only source of truth for game state.
///
/// Every variant carries the `room_id` it belongs to; events for a room
/// other than the locally active one are discarded by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerGameEvent {
    /// The game started. Moves the room machine to `Playing`.
    GameStart { room_id: RoomId },
    /// The game ended, with final scores and optional winner. Applied
    /// unconditionally regardless of who requested the end.
    GameEnd {
        room_id: RoomId,
        #[serde(default)]
        scores: HashMap<UserId, u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<UserId>,
    },
    /// A confirmed board move, including the sender's own echo. Confirms
    /// the placement and advances the turn pointer in one message.
    BoardMove {
        room_id: RoomId,
        user_id: UserId,
        position: u16,
    },
    /// A new target appeared.
    SpawnTarget { room_id: RoomId, target: Target },
    /// A target was hit or expired.
    TargetRemoved { room_id: RoomId, target_id: TargetId },
    /// Authoritative snapshot of all currently active targets. Reconciles
    /// any optimistic local removals.
    TargetSync {
        room_id: RoomId,
        targets: Vec<Target>,
    },
    /// A player's score changed. Scores are taken verbatim, never computed
    /// locally.
    ScoreUpdate {
        room_id: RoomId,
        user_id: UserId,
        score: u32,
    },
    /// Reaction round armed; GO follows after a server-chosen delay.
    ReactionPrepare { room_id: RoomId },
    /// Reaction round is live; clicks count from now.
    ReactionGo { room_id: RoomId },
    /// A player won the reaction round.
    ReactionResult {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
    },
    /// Reaction round over, possibly without a winner.
    ReactionEnd {
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<UserId>,
    },
}

impl ServerGameEvent {
    /// The room this event belongs to.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::GameStart { room_id }
            | Self::GameEnd { room_id, .. }
            | Self::BoardMove { room_id, .. }
            | Self::SpawnTarget { room_id, .. }
            | Self::TargetRemoved { room_id, .. }
            | Self::TargetSync { room_id, .. }
            | Self::ScoreUpdate { room_id, .. }
            | Self::ReactionPrepare { room_id }
            | Self::ReactionGo { room_id }
            | Self::ReactionResult { room_id, .. }
            | Self::ReactionEnd { room_id, .. } => *room_id,
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Handshake (MUST be the first message on every connection).
    /// Identity and role are fixed for the life of the connection.
    Hello {
        user_id: UserId,
        display_name: String,
        role: SessionRole,
    },
    /// Open a logical broadcast channel.
    Subscribe { topic: String },
    /// Close a logical broadcast channel.
    Unsubscribe { topic: String },
    /// Heartbeat to maintain the connection.
    Ping,
    /// Create a room (the creator becomes host and first player).
    CreateRoom {
        name: String,
        game_type: GameType,
        max_players: u8,
        is_locked: bool,
    },
    /// Join an existing room. The result arrives on the per-user
    /// join-result channel.
    JoinRoom { room_id: RoomId },
    /// Leave the current room.
    LeaveRoom { room_id: RoomId },
    /// Toggle readiness in the waiting room.
    ToggleReady { room_id: RoomId },
    /// Move between the player and spectator lists. Rejected server-side
    /// when the player set is full.
    SwitchRole { room_id: RoomId },
    /// Start the game (host only).
    StartGame { room_id: RoomId },
    /// Change room settings (host only).
    UpdateRoom {
        room_id: RoomId,
        game_type: GameType,
        max_players: u8,
    },
    /// Request a full room-list snapshot.
    RoomListRequest,
    /// Request the authoritative state of one room (late join / rejoin
    /// after an outage).
    RoomStateRequest { room_id: RoomId },
    /// Global plaza chat.
    Chat { text: String },
    /// Room-scoped chat.
    RoomChat { room_id: RoomId, text: String },
    /// Avatar position broadcast. Rate-limited client-side.
    Position(PositionSample),
    /// Invite another user to a room.
    Invite {
        target_user_id: UserId,
        room_id: RoomId,
        game_type: GameType,
    },
    /// A game request for the room currently being played.
    Game {
        room_id: RoomId,
        request: GameRequest,
    },
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Handshake acknowledgment. The first server message on a healthy
    /// connection; resolves the `connect()` future.
    Welcome {
        user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        heartbeat_interval_ms: Option<u64>,
    },
    /// Heartbeat response.
    Pong,
    /// Result of a join request, addressed to the requesting user.
    JoinResult {
        success: bool,
        room_id: RoomId,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// One incremental change to the shared room directory.
    RoomDiff {
        action: DiffAction,
        room: RoomSummary,
    },
    /// Full room-list snapshot for late joiners.
    RoomList { rooms: Vec<RoomSummary> },
    /// Full membership detail for a room (boxed to reduce enum size).
    RoomState(Box<RoomStatePayload>),
    /// Global plaza chat message.
    Chat(ChatMessage),
    /// Room-scoped chat message.
    RoomChat {
        room_id: RoomId,
        message: ChatMessage,
    },
    /// Another avatar's position sample.
    Position(PositionSample),
    /// A game invitation addressed to this user.
    Invite {
        from_user_id: UserId,
        from_display_name: String,
        room_id: RoomId,
        game_type: GameType,
    },
    /// A confirmed game event.
    Game(ServerGameEvent),
    /// Error message.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}
