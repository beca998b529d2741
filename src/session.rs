//! Async session for the Plaza protocol.
//!
//! [`PlazaSession`] is a thin handle that communicates with a background
//! session loop task via an unbounded MPSC channel. Server-originated
//! changes are dispatched through the session's [`EventBus`]; the handle
//! additionally exposes cheap snapshot accessors over shared state.
//!
//! The loop owns the transport. When it fails, the loop re-dials through the
//! [`Connector`], replays every registered topic subscription, and requests
//! fresh room-list and room-state snapshots before the session is considered
//! connected again.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8017/plaza");
//! let identity = SessionIdentity::new("Alice");
//! let (session, bus) = PlazaSession::connect(connector, identity, PlazaConfig::new()).await?;
//!
//! let _h = bus.on(EventCategory::RoomList, |event| {
//!     if let PlazaEvent::RoomList(rooms) = event {
//!         println!("{} rooms open", rooms.len());
//!     }
//! });
//!
//! session.create_room("omok night", GameType::Board, 2, false)?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::directory::RoomDirectory;
use crate::error::{PlazaError, Result};
use crate::event::PlazaEvent;
use crate::games::{GameRouter, GameView};
use crate::protocol::{
    ClientMessage, DiffAction, GameRequest, GameType, PositionSample, RoomId, RoomSummary,
    ServerGameEvent, ServerMessage, SessionRole, TargetId, UserId,
};
use crate::registry::{Topic, TopicRegistry};
use crate::room::{RoomPhase, RoomSessionMachine, RoomStateOutcome, RoomView};
use crate::transport::{Connector, Transport};

/// Default timeout for the `Welcome` handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heartbeat interval, matching the server's expected cadence.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Default number of silent heartbeat intervals before the connection is
/// declared dead.
const DEFAULT_HEARTBEAT_GRACE: u32 = 3;

/// Default delay between reconnect attempts.
const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Default maximum number of reconnect attempts before giving up.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default minimum interval between outbound position samples.
const DEFAULT_POSITION_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Default cooldown between role-switch requests.
const DEFAULT_ROLE_SWITCH_COOLDOWN: Duration = Duration::from_secs(1);

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Connection state ────────────────────────────────────────────────

/// Connection state of a session, as observed by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; terminal unless a new session is created.
    Disconnected,
    /// Initial connection attempt in progress.
    Connecting,
    /// Handshake complete; subscriptions replayed.
    Connected,
    /// Transport lost; the loop is re-dialing.
    Reconnecting,
}

// ── Identity & configuration ────────────────────────────────────────

/// Who this session is on the wire. Fixed for the life of a connection; the
/// role can only change through [`PlazaSession::reconnect_as`], which tears
/// the connection down first.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub role: SessionRole,
}

impl SessionIdentity {
    /// New identity with a random user id and the default `Player` role.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            user_id: uuid::Uuid::new_v4(),
            display_name: display_name.into(),
            role: SessionRole::Player,
        }
    }

    /// Set the session role requested at handshake time.
    #[must_use]
    pub fn with_role(mut self, role: SessionRole) -> Self {
        self.role = role;
        self
    }

    /// Set an explicit user id (rejoining with a persisted identity).
    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Configuration for a [`PlazaSession`].
///
/// All fields have defaults matching the server's expected cadences.
///
/// # Tuning
///
/// ```
/// use plaza_client::session::PlazaConfig;
/// use std::time::Duration;
///
/// let config = PlazaConfig::new()
///     .with_reconnect_backoff(Duration::from_secs(2))
///     .with_max_reconnect_attempts(10);
/// ```
#[derive(Debug, Clone)]
pub struct PlazaConfig {
    /// How long `connect` waits for the server `Welcome`.
    pub handshake_timeout: Duration,
    /// Interval between heartbeat pings. The server may override this via
    /// the `Welcome` message.
    pub heartbeat_interval: Duration,
    /// Number of silent heartbeat intervals tolerated before the connection
    /// is treated as failed.
    pub heartbeat_grace: u32,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_backoff: Duration,
    /// Reconnect attempts before the session goes terminally
    /// `Disconnected`.
    pub max_reconnect_attempts: u32,
    /// Minimum interval between outbound position samples; faster calls to
    /// [`PlazaSession::send_position`] are dropped.
    pub position_min_interval: Duration,
    /// Minimum interval between role-switch requests.
    pub role_switch_cooldown: Duration,
    /// Timeout for the graceful shutdown before the loop task is aborted.
    pub shutdown_timeout: Duration,
}

impl PlazaConfig {
    pub fn new() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            position_min_interval: DEFAULT_POSITION_MIN_INTERVAL,
            role_switch_cooldown: DEFAULT_ROLE_SWITCH_COOLDOWN,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_position_min_interval(mut self, interval: Duration) -> Self {
        self.position_min_interval = interval;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for PlazaConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the handle and the session loop.
///
/// Every lock section is short and never held across an await point.
struct Shared {
    identity: Mutex<SessionIdentity>,
    connection: Mutex<ConnectionState>,
    directory: Mutex<RoomDirectory>,
    machine: Mutex<RoomSessionMachine>,
    router: Mutex<GameRouter>,
    registry: Mutex<TopicRegistry>,
    last_position: Mutex<Option<Instant>>,
    last_role_switch: Mutex<Option<Instant>>,
}

impl Shared {
    fn new(identity: SessionIdentity) -> Self {
        let user_id = identity.user_id;
        Self {
            identity: Mutex::new(identity),
            connection: Mutex::new(ConnectionState::Connecting),
            directory: Mutex::new(RoomDirectory::new()),
            machine: Mutex::new(RoomSessionMachine::new(user_id)),
            router: Mutex::new(GameRouter::new(user_id)),
            registry: Mutex::new(TopicRegistry::new()),
            last_position: Mutex::new(None),
            last_role_switch: Mutex::new(None),
        }
    }
}

/// Lock a shared mutex, recovering the data if a handler panicked while
/// holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_connection(shared: &Shared, bus: &EventBus, state: ConnectionState) {
    *lock(&shared.connection) = state;
    bus.emit(&PlazaEvent::Connection(state));
}

/// Topics every session keeps open for its whole lifetime.
fn base_topics(user_id: UserId) -> [Topic; 6] {
    [
        Topic::RoomDirectory,
        Topic::RoomListSnapshots,
        Topic::GlobalChat,
        Topic::Positions,
        Topic::JoinResults(user_id),
        Topic::Invites(user_id),
    ]
}

// ── Commands ────────────────────────────────────────────────────────

/// Instruction from the handle to the session loop.
enum Command {
    /// Serialize and send one protocol message.
    Send(ClientMessage),
    /// Tear down the transport and re-handshake with the updated role.
    Rehandshake,
}

// ── Session handle ──────────────────────────────────────────────────

/// Handle to a live Plaza session.
///
/// Created via [`PlazaSession::connect`], which dials the server, performs
/// the `Hello`/`Welcome` handshake, and spawns the background session loop.
/// All request methods queue a message to the loop and return once it is
/// queued (no round-trip await); outcomes arrive as [`PlazaEvent`]s.
pub struct PlazaSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    bus: EventBus,
    config: PlazaConfig,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl PlazaSession {
    /// Dial the server through `connector`, perform the handshake, and
    /// start the session loop.
    ///
    /// Resolves once the server `Welcome` arrives, the lifetime topic
    /// subscriptions are issued, and an initial room-list snapshot has been
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::Timeout`] when no `Welcome` arrives within
    /// `config.handshake_timeout`, or any connect/transport error from the
    /// dial itself.
    pub async fn connect(
        connector: impl Connector,
        identity: SessionIdentity,
        config: PlazaConfig,
    ) -> Result<(Self, EventBus)> {
        let connector: Arc<dyn Connector> = Arc::new(connector);
        let mut transport = connector.connect().await?;

        let welcome = handshake(transport.as_mut(), &identity, config.handshake_timeout).await?;
        if welcome.user_id != identity.user_id {
            warn!(
                ours = %identity.user_id,
                theirs = %welcome.user_id,
                "server welcomed a different user id"
            );
        }
        let heartbeat_interval = welcome
            .heartbeat_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.heartbeat_interval);

        let shared = Arc::new(Shared::new(identity.clone()));
        {
            let mut registry = lock(&shared.registry);
            for topic in base_topics(identity.user_id) {
                registry.subscribe(topic);
            }
        }
        resume(transport.as_mut(), &shared).await?;
        *lock(&shared.connection) = ConnectionState::Connected;

        let bus = EventBus::new();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(session_loop(
            transport,
            Arc::clone(&connector),
            config.clone(),
            Arc::clone(&shared),
            bus.clone(),
            cmd_rx,
            shutdown_rx,
            heartbeat_interval,
        ));

        let session = Self {
            cmd_tx,
            shared,
            bus: bus.clone(),
            config,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        Ok((session, bus))
    }

    // ── Room operations ─────────────────────────────────────────────

    /// Create a room. The creator becomes host and first player; the
    /// server's `JoinResult` carries the new room's id.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotConnected`] if the session is disconnected.
    pub fn create_room(
        &self,
        name: impl Into<String>,
        game_type: GameType,
        max_players: u8,
        is_locked: bool,
    ) -> Result<()> {
        self.send(ClientMessage::CreateRoom {
            name: name.into(),
            game_type,
            max_players,
            is_locked,
        })
    }

    /// Join a room. Room topics are opened optimistically before the server
    /// confirms so a fast broadcast is not missed; joining while another
    /// room is occupied implicitly leaves it first.
    ///
    /// The outcome arrives as a [`PlazaEvent::JoinResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotConnected`] if the session is disconnected.
    pub fn join_room(&self, room_id: RoomId) -> Result<()> {
        let mut messages = Vec::new();
        {
            let mut machine = lock(&self.shared.machine);
            if let Some(left) = machine.begin_join(room_id) {
                lock(&self.shared.router).clear();
                messages.push(ClientMessage::LeaveRoom { room_id: left });
                for topic in lock(&self.shared.registry).remove_room(left) {
                    messages.push(ClientMessage::Unsubscribe {
                        topic: topic.channel_name(),
                    });
                }
            }
            let mut registry = lock(&self.shared.registry);
            for topic in Topic::for_room(room_id) {
                if registry.subscribe(topic) {
                    messages.push(ClientMessage::Subscribe {
                        topic: topic.channel_name(),
                    });
                }
            }
        }
        messages.push(ClientMessage::JoinRoom { room_id });
        for msg in messages {
            self.send(msg)?;
        }
        Ok(())
    }

    /// Leave the occupied room and close its topics.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied, or
    /// [`PlazaError::NotConnected`] if the session is disconnected.
    pub fn leave_room(&self) -> Result<()> {
        let mut messages = Vec::new();
        {
            let mut machine = lock(&self.shared.machine);
            let Some(room_id) = machine.leave() else {
                return Err(PlazaError::NotInRoom);
            };
            lock(&self.shared.router).clear();
            messages.push(ClientMessage::LeaveRoom { room_id });
            for topic in lock(&self.shared.registry).remove_room(room_id) {
                messages.push(ClientMessage::Unsubscribe {
                    topic: topic.channel_name(),
                });
            }
        }
        for msg in messages {
            self.send(msg)?;
        }
        Ok(())
    }

    /// Toggle readiness in the waiting room.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn toggle_ready(&self) -> Result<()> {
        let room_id = self.active_room_or_err()?;
        self.send(ClientMessage::ToggleReady { room_id })
    }

    /// Request to move between the player and spectator lists.
    ///
    /// The request is advisory and server-authoritative: it is dropped
    /// locally when the room is not in the waiting phase, within the
    /// cooldown window, or when the player set is already full.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn switch_role(&self) -> Result<()> {
        let (room_id, wants_player_slot) = {
            let machine = lock(&self.shared.machine);
            let Some(room_id) = machine.active_room_id() else {
                return Err(PlazaError::NotInRoom);
            };
            if machine.phase() != RoomPhase::Waiting {
                debug!(%room_id, "role switch outside waiting phase dropped");
                return Ok(());
            }
            (room_id, machine.local_is_spectator())
        };

        {
            let mut last = lock(&self.shared.last_role_switch);
            if last.is_some_and(|at| at.elapsed() < self.config.role_switch_cooldown) {
                debug!(%room_id, "role switch inside cooldown dropped");
                return Ok(());
            }
            *last = Some(Instant::now());
        }

        if wants_player_slot {
            let full = lock(&self.shared.directory)
                .get(room_id)
                .is_some_and(|room| room.current_player_count >= room.max_players);
            if full {
                debug!(%room_id, "role switch into full player set dropped");
                return Ok(());
            }
        }
        self.send(ClientMessage::SwitchRole { room_id })
    }

    /// Start the game (host only). `Playing` is entered only when the
    /// server broadcasts game start.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotHost`] when the local user does not host
    /// the room, or [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn start_game(&self) -> Result<()> {
        let room_id = self.host_room_or_err()?;
        self.send(ClientMessage::StartGame { room_id })
    }

    /// Change the occupied room's settings (host only).
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotHost`] when the local user does not host
    /// the room, or [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn update_room(&self, game_type: GameType, max_players: u8) -> Result<()> {
        let room_id = self.host_room_or_err()?;
        self.send(ClientMessage::UpdateRoom {
            room_id,
            game_type,
            max_players,
        })
    }

    /// Dismiss the end-of-game results: drop the finished game view and
    /// return the room to the waiting phase for the next round. Ignored
    /// unless the room is in the ended phase.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn dismiss_results(&self) -> Result<()> {
        let view = {
            let mut machine = lock(&self.shared.machine);
            if machine.active_room_id().is_none() {
                return Err(PlazaError::NotInRoom);
            }
            if !machine.return_to_waiting() {
                debug!("dismiss outside ended phase ignored");
                return Ok(());
            }
            lock(&self.shared.router).clear();
            machine.view()
        };
        if let Some(view) = view {
            self.bus.emit(&PlazaEvent::RoomDetail(view));
        }
        Ok(())
    }

    /// Request a fresh full room-list snapshot.
    pub fn request_room_list(&self) -> Result<()> {
        self.send(ClientMessage::RoomListRequest)
    }

    /// Request the authoritative state of one room.
    pub fn request_room_state(&self, room_id: RoomId) -> Result<()> {
        self.send(ClientMessage::RoomStateRequest { room_id })
    }

    // ── Chat, positions, invites ────────────────────────────────────

    /// Send a global plaza chat message.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.send(ClientMessage::Chat { text: text.into() })
    }

    /// Send a chat message to the occupied room.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn send_room_chat(&self, text: impl Into<String>) -> Result<()> {
        let room_id = self.active_room_or_err()?;
        self.send(ClientMessage::RoomChat {
            room_id,
            text: text.into(),
        })
    }

    /// Broadcast an avatar position sample.
    ///
    /// Samples arriving faster than `config.position_min_interval` are
    /// dropped; position data is transient and the next sample supersedes
    /// the dropped one.
    pub fn send_position(&self, sample: PositionSample) -> Result<()> {
        {
            let mut last = lock(&self.shared.last_position);
            if last.is_some_and(|at| at.elapsed() < self.config.position_min_interval) {
                return Ok(());
            }
            *last = Some(Instant::now());
        }
        self.send(ClientMessage::Position(sample))
    }

    /// Invite another user to the occupied room.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no room is occupied.
    pub fn invite(&self, target_user_id: UserId) -> Result<()> {
        let (room_id, game_type) = {
            let machine = lock(&self.shared.machine);
            match machine.view() {
                Some(view) => (view.room_id, view.game_type),
                None => return Err(PlazaError::NotInRoom),
            }
        };
        self.send(ClientMessage::Invite {
            target_user_id,
            room_id,
            game_type,
        })
    }

    // ── Game requests ───────────────────────────────────────────────

    /// Request a stone placement at a flat board index.
    ///
    /// The local board is not mutated; the placement takes effect when the
    /// server echoes it back.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotYourTurn`] out of turn, or
    /// [`PlazaError::NotInRoom`] when no board game is active.
    pub fn send_board_move(&self, position: u16) -> Result<()> {
        self.send_game_request(GameRequest::BoardMove { position })
    }

    /// Claim a hit on a target. The target is hidden optimistically; an
    /// authoritative sync reinstates it if the claim loses.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotInRoom`] when no target game is active.
    pub fn hit_target(&self, target_id: TargetId) -> Result<()> {
        self.send_game_request(GameRequest::TargetHit { target_id })
    }

    /// Start a reaction round (host only). `immediate` skips the random
    /// pre-GO delay.
    ///
    /// # Errors
    ///
    /// Returns [`PlazaError::NotHost`] when the local user does not host
    /// the room.
    pub fn start_reaction_round(&self, immediate: bool) -> Result<()> {
        self.host_room_or_err()?;
        self.send_game_request(GameRequest::ReactionStart { immediate })
    }

    /// Claim the current reaction round. Dropped unless the GO window is
    /// open.
    pub fn reaction_hit(&self) -> Result<()> {
        self.send_game_request(GameRequest::ReactionHit)
    }

    fn send_game_request(&self, request: GameRequest) -> Result<()> {
        let room_id = {
            let machine = lock(&self.shared.machine);
            machine.active_room_id().ok_or(PlazaError::NotInRoom)?
        };
        let should_send = lock(&self.shared.router).prepare_request(room_id, &request)?;
        if !should_send {
            return Ok(());
        }
        self.send(ClientMessage::Game { room_id, request })
    }

    // ── Connection management ───────────────────────────────────────

    /// Reconnect with a different session role.
    ///
    /// A no-op when the session is already connected with the requested
    /// role. Otherwise the current transport is torn down first, then a new
    /// connection handshakes with the new role — there are never two live
    /// connections for one identity.
    pub fn reconnect_as(&self, role: SessionRole) -> Result<()> {
        {
            let mut identity = lock(&self.shared.identity);
            if identity.role == role
                && *lock(&self.shared.connection) == ConnectionState::Connected
            {
                return Ok(());
            }
            identity.role = role;
        }
        self.cmd_tx
            .send(Command::Rehandshake)
            .map_err(|_| PlazaError::NotConnected)
    }

    /// Shut down the session: auto-leave the occupied room, close the
    /// transport, and stop the background loop.
    ///
    /// A final `Disconnected` connection event is emitted on the bus.
    pub async fn disconnect(&mut self) {
        debug!("session shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout; abort if it does not exit so the
        // task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        *lock(&self.shared.connection) = ConnectionState::Disconnected;
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// The session's event bus (same instance returned from `connect`).
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.shared.connection)
    }

    pub fn user_id(&self) -> UserId {
        lock(&self.shared.identity).user_id
    }

    pub fn role(&self) -> SessionRole {
        lock(&self.shared.identity).role
    }

    /// Cached room directory contents.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        lock(&self.shared.directory).rooms()
    }

    /// Snapshot of the occupied room, if any.
    pub fn current_room(&self) -> Option<RoomView> {
        lock(&self.shared.machine).view()
    }

    /// Whether the local user hosts the occupied room.
    pub fn is_host(&self) -> bool {
        lock(&self.shared.machine).is_host()
    }

    /// Snapshot of the active game view, if a game is being played.
    pub fn game_view(&self) -> Option<GameView> {
        lock(&self.shared.router).view().cloned()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if *lock(&self.shared.connection) == ConnectionState::Disconnected {
            return Err(PlazaError::NotConnected);
        }
        self.cmd_tx
            .send(Command::Send(msg))
            .map_err(|_| PlazaError::NotConnected)
    }

    fn active_room_or_err(&self) -> Result<RoomId> {
        lock(&self.shared.machine)
            .active_room_id()
            .ok_or(PlazaError::NotInRoom)
    }

    fn host_room_or_err(&self) -> Result<RoomId> {
        let machine = lock(&self.shared.machine);
        let room_id = machine.active_room_id().ok_or(PlazaError::NotInRoom)?;
        if !machine.is_host() {
            return Err(PlazaError::NotHost);
        }
        Ok(room_id)
    }
}

impl std::fmt::Debug for PlazaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlazaSession")
            .field("connection", &self.connection_state())
            .field("user_id", &self.user_id())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for PlazaSession {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful shutdown cannot be awaited.
        // Aborting the task drops the session loop future immediately; the
        // shutdown oneshot is intentionally not sent because there is no
        // executor context to drive the graceful path here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Handshake ───────────────────────────────────────────────────────

struct WelcomeInfo {
    user_id: UserId,
    heartbeat_interval_ms: Option<u64>,
}

/// Send `Hello` and wait for the server `Welcome`.
///
/// Messages arriving before `Welcome` are ignored; a server `Error` aborts
/// the handshake.
async fn handshake(
    transport: &mut dyn Transport,
    identity: &SessionIdentity,
    timeout: Duration,
) -> Result<WelcomeInfo> {
    let hello = ClientMessage::Hello {
        user_id: identity.user_id,
        display_name: identity.display_name.clone(),
        role: identity.role,
    };
    transport.send(serde_json::to_string(&hello)?).await?;

    tokio::time::timeout(timeout, async {
        loop {
            match transport.recv().await {
                Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::Welcome {
                        user_id,
                        heartbeat_interval_ms,
                    }) => {
                        info!(%user_id, "handshake complete");
                        return Ok(WelcomeInfo {
                            user_id,
                            heartbeat_interval_ms,
                        });
                    }
                    Ok(ServerMessage::Error {
                        message,
                        error_code,
                    }) => {
                        return Err(PlazaError::ServerError {
                            message,
                            error_code: error_code.map(|code| code.to_string()),
                        });
                    }
                    Ok(_) => debug!("message before welcome ignored"),
                    Err(e) => warn!("malformed message during handshake: {e}"),
                },
                Some(Err(e)) => return Err(e),
                None => return Err(PlazaError::TransportClosed),
            }
        }
    })
    .await
    .map_err(|_| PlazaError::Timeout)?
}

/// Replay every registered subscription and request fresh snapshots.
///
/// Runs on every transition into `Connected`: broadcasts during an outage
/// are lost (delivery is at-most-once per connection), so the room list and
/// the occupied room's state must be re-fetched.
async fn resume(transport: &mut dyn Transport, shared: &Shared) -> Result<()> {
    let topics = lock(&shared.registry).all();
    for topic in topics {
        let msg = ClientMessage::Subscribe {
            topic: topic.channel_name(),
        };
        transport.send(serde_json::to_string(&msg)?).await?;
    }
    transport
        .send(serde_json::to_string(&ClientMessage::RoomListRequest)?)
        .await?;

    let occupied = lock(&shared.machine).occupied_room_id();
    if let Some(room_id) = occupied {
        let msg = ClientMessage::RoomStateRequest { room_id };
        transport.send(serde_json::to_string(&msg)?).await?;
    }
    Ok(())
}

// ── Session loop ────────────────────────────────────────────────────

/// Why the per-connection select loop exited.
enum ConnExit {
    /// The transport failed or went silent; try to reconnect.
    TransportFailed,
    /// Shutdown was requested via [`PlazaSession::disconnect`].
    Shutdown,
    /// The handle was dropped without an explicit shutdown.
    HandleDropped,
    /// [`PlazaSession::reconnect_as`] requested a fresh handshake.
    Rehandshake,
}

enum Recovered {
    Transport(Box<dyn Transport>),
    Shutdown,
    Failed,
}

#[allow(clippy::too_many_arguments)]
async fn session_loop(
    mut transport: Box<dyn Transport>,
    connector: Arc<dyn Connector>,
    config: PlazaConfig,
    shared: Arc<Shared>,
    bus: EventBus,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
    heartbeat_interval: Duration,
) {
    debug!("session loop started");

    loop {
        let exit = run_connection(
            transport.as_mut(),
            &shared,
            &bus,
            &mut cmd_rx,
            &mut shutdown_rx,
            heartbeat_interval,
            config.heartbeat_grace,
        )
        .await;

        match exit {
            ConnExit::Shutdown => {
                auto_leave(transport.as_mut(), &shared).await;
                let _ = transport.close().await;
                set_connection(&shared, &bus, ConnectionState::Disconnected);
                break;
            }
            ConnExit::HandleDropped => {
                debug!("command channel closed, shutting down session loop");
                let _ = transport.close().await;
                set_connection(&shared, &bus, ConnectionState::Disconnected);
                break;
            }
            ConnExit::Rehandshake => {
                let _ = transport.close().await;
            }
            ConnExit::TransportFailed => {}
        }

        match recover(&connector, &config, &shared, &bus, &mut shutdown_rx).await {
            Recovered::Transport(fresh) => transport = fresh,
            Recovered::Shutdown => {
                set_connection(&shared, &bus, ConnectionState::Disconnected);
                break;
            }
            Recovered::Failed => break,
        }
    }

    debug!("session loop exited");
}

/// Drive one live connection until it fails or the session ends.
async fn run_connection(
    transport: &mut dyn Transport,
    shared: &Shared,
    bus: &EventBus,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    heartbeat_interval: Duration,
    heartbeat_grace: u32,
) -> ConnExit {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a fresh interval completes immediately.
    heartbeat.tick().await;

    let grace = heartbeat_interval * heartbeat_grace.max(1);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(msg)) => {
                    if send_message(transport, &msg).await.is_err() {
                        return ConnExit::TransportFailed;
                    }
                }
                Some(Command::Rehandshake) => return ConnExit::Rehandshake,
                None => return ConnExit::HandleDropped,
            },

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return ConnExit::Shutdown;
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => {
                    last_inbound = Instant::now();
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            let replies = handle_server_message(shared, bus, msg);
                            for reply in replies {
                                if send_message(transport, &reply).await.is_err() {
                                    return ConnExit::TransportFailed;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("failed to deserialize server message: {e} — raw: {text}");
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("transport receive error: {e}");
                    return ConnExit::TransportFailed;
                }
                None => {
                    debug!("transport closed by server");
                    return ConnExit::TransportFailed;
                }
            },

            _ = heartbeat.tick() => {
                if last_inbound.elapsed() > grace {
                    warn!(
                        silent_for = ?last_inbound.elapsed(),
                        "no server traffic within heartbeat grace, treating connection as dead"
                    );
                    return ConnExit::TransportFailed;
                }
                if send_message(transport, &ClientMessage::Ping).await.is_err() {
                    return ConnExit::TransportFailed;
                }
            }
        }
    }
}

/// Serialize and send one message. Serialization failures are programming
/// bugs and are logged without killing the connection; only transport
/// failures propagate.
async fn send_message(
    transport: &mut dyn Transport,
    msg: &ClientMessage,
) -> std::result::Result<(), ()> {
    match serde_json::to_string(msg) {
        Ok(json) => {
            if let Err(e) = transport.send(json).await {
                error!("transport send error: {e}");
                return Err(());
            }
            Ok(())
        }
        Err(e) => {
            error!("failed to serialize client message: {e}");
            Ok(())
        }
    }
}

/// Send a `LeaveRoom` for the occupied room during graceful teardown.
async fn auto_leave(transport: &mut dyn Transport, shared: &Shared) {
    let room_id = lock(&shared.machine).leave();
    if let Some(room_id) = room_id {
        debug!(%room_id, "auto-leaving room on shutdown");
        lock(&shared.router).clear();
        let _ = send_message(transport, &ClientMessage::LeaveRoom { room_id }).await;
    }
}

/// Re-dial through the connector with fixed backoff until a handshake and
/// subscription replay succeed, shutdown arrives, or attempts run out.
async fn recover(
    connector: &Arc<dyn Connector>,
    config: &PlazaConfig,
    shared: &Arc<Shared>,
    bus: &EventBus,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> Recovered {
    set_connection(shared, bus, ConnectionState::Reconnecting);

    for attempt in 1..=config.max_reconnect_attempts {
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_backoff) => {}
            _ = &mut *shutdown_rx => return Recovered::Shutdown,
        }

        let identity = lock(&shared.identity).clone();
        match connector.connect().await {
            Ok(mut transport) => {
                match handshake(transport.as_mut(), &identity, config.handshake_timeout).await {
                    Ok(_welcome) => {
                        if let Err(e) = resume(transport.as_mut(), shared).await {
                            warn!(attempt, "subscription replay failed: {e}");
                            continue;
                        }
                        info!(attempt, "reconnected");
                        set_connection(shared, bus, ConnectionState::Connected);
                        return Recovered::Transport(transport);
                    }
                    Err(e) => warn!(attempt, "handshake failed: {e}"),
                }
            }
            Err(e) => warn!(attempt, "reconnect attempt failed: {e}"),
        }
    }

    error!(
        attempts = config.max_reconnect_attempts,
        "reconnect attempts exhausted"
    );
    set_connection(shared, bus, ConnectionState::Disconnected);
    Recovered::Failed
}

// ── Server message handling ─────────────────────────────────────────

/// Apply one server message to the shared state and emit events.
///
/// Returns follow-up messages to put on the wire (topic changes, state
/// refresh requests). Runs to completion before the next message is read,
/// so per-session handling is strictly ordered.
fn handle_server_message(shared: &Shared, bus: &EventBus, msg: ServerMessage) -> Vec<ClientMessage> {
    let mut out = Vec::new();
    match msg {
        ServerMessage::Welcome { .. } => {
            debug!("welcome outside handshake ignored");
        }
        ServerMessage::Pong => {}

        ServerMessage::JoinResult {
            success,
            room_id,
            error_code,
            reason,
        } => {
            if success {
                let mut machine = lock(&shared.machine);
                if machine.occupied_room_id() != Some(room_id) {
                    // Join initiated server-side (room creation): adopt the
                    // room the same way a local join would.
                    if let Some(left) = machine.begin_join(room_id) {
                        lock(&shared.router).clear();
                        out.push(ClientMessage::LeaveRoom { room_id: left });
                        for topic in lock(&shared.registry).remove_room(left) {
                            out.push(ClientMessage::Unsubscribe {
                                topic: topic.channel_name(),
                            });
                        }
                    }
                    let mut registry = lock(&shared.registry);
                    for topic in Topic::for_room(room_id) {
                        if registry.subscribe(topic) {
                            out.push(ClientMessage::Subscribe {
                                topic: topic.channel_name(),
                            });
                        }
                    }
                }
                out.push(ClientMessage::RoomStateRequest { room_id });
            } else if lock(&shared.machine).fail_join(room_id) {
                for topic in lock(&shared.registry).remove_room(room_id) {
                    out.push(ClientMessage::Unsubscribe {
                        topic: topic.channel_name(),
                    });
                }
            }
            bus.emit(&PlazaEvent::JoinResult {
                success,
                room_id,
                error_code,
                reason,
            });
        }

        ServerMessage::RoomDiff { action, room } => {
            let deleted_active = action == DiffAction::Delete
                && lock(&shared.machine).active_room_id() == Some(room.room_id);
            lock(&shared.directory).apply_diff(action, room.clone());

            if deleted_active {
                debug!(room_id = %room.room_id, "occupied room deleted, returning to lobby");
                lock(&shared.machine).leave();
                lock(&shared.router).clear();
                for topic in lock(&shared.registry).remove_room(room.room_id) {
                    out.push(ClientMessage::Unsubscribe {
                        topic: topic.channel_name(),
                    });
                }
            } else {
                let mut machine = lock(&shared.machine);
                if machine.apply_summary(&room) {
                    if let Some(view) = machine.view() {
                        bus.emit(&PlazaEvent::RoomDetail(view));
                    }
                }
            }
            bus.emit(&PlazaEvent::RoomList(lock(&shared.directory).rooms()));
        }

        ServerMessage::RoomList { rooms } => {
            lock(&shared.directory).apply_snapshot(rooms);
            bus.emit(&PlazaEvent::RoomList(lock(&shared.directory).rooms()));
        }

        ServerMessage::RoomState(payload) => {
            let outcome = lock(&shared.machine).apply_room_state(&payload);
            match outcome {
                RoomStateOutcome::JoinConfirmed | RoomStateOutcome::Updated => {
                    let machine = lock(&shared.machine);
                    if machine.phase() == RoomPhase::Playing {
                        // Rejoin into a game already in progress.
                        let mut router = lock(&shared.router);
                        if router.active_room() != Some(payload.room_id) {
                            let seats =
                                payload.players.iter().map(|slot| slot.user_id).collect();
                            router.start(payload.room_id, payload.game_type, seats);
                        }
                    }
                    if let Some(view) = machine.view() {
                        bus.emit(&PlazaEvent::RoomDetail(view));
                    }
                }
                RoomStateOutcome::Evicted => {
                    lock(&shared.router).clear();
                    for topic in lock(&shared.registry).remove_room(payload.room_id) {
                        out.push(ClientMessage::Unsubscribe {
                            topic: topic.channel_name(),
                        });
                    }
                }
                RoomStateOutcome::Ignored => {}
            }
        }

        ServerMessage::Chat(message) => {
            bus.emit(&PlazaEvent::Chat {
                room_id: None,
                message,
            });
        }

        ServerMessage::RoomChat { room_id, message } => {
            bus.emit(&PlazaEvent::Chat {
                room_id: Some(room_id),
                message,
            });
        }

        ServerMessage::Position(sample) => {
            bus.emit(&PlazaEvent::Position(sample));
        }

        ServerMessage::Invite {
            from_user_id,
            from_display_name,
            room_id,
            game_type,
        } => {
            bus.emit(&PlazaEvent::Invite {
                from_user_id,
                from_display_name,
                room_id,
                game_type,
            });
        }

        ServerMessage::Game(event) => {
            let applied = apply_game_event(shared, bus, &event);
            if applied {
                bus.emit(&PlazaEvent::Game(event));
            }
        }

        ServerMessage::Error {
            message,
            error_code,
        } => {
            warn!(?error_code, "server error: {message}");
            bus.emit(&PlazaEvent::Error {
                message,
                error_code,
            });
        }
    }
    out
}

/// Route one confirmed game event into the room machine and game router.
fn apply_game_event(shared: &Shared, bus: &EventBus, event: &ServerGameEvent) -> bool {
    match event {
        ServerGameEvent::GameStart { room_id } => {
            let mut machine = lock(&shared.machine);
            if !machine.game_started(*room_id) {
                debug!(%room_id, "game start for a room we do not occupy");
                return false;
            }
            if let Some(view) = machine.view() {
                let seats = view.players.iter().map(|slot| slot.user_id).collect();
                lock(&shared.router).start(*room_id, view.game_type, seats);
                bus.emit(&PlazaEvent::RoomDetail(view));
            }
            true
        }
        ServerGameEvent::GameEnd { room_id, .. } => {
            let applied = lock(&shared.router).apply(event);
            let mut machine = lock(&shared.machine);
            if machine.game_ended(*room_id) {
                if let Some(view) = machine.view() {
                    bus.emit(&PlazaEvent::RoomDetail(view));
                }
                return true;
            }
            applied
        }
        _ => lock(&shared.router).apply(event),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error_codes::ErrorCode;
    use crate::event::EventCategory;
    use crate::protocol::{PlayerSlot, RoomStatePayload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    // ── Mock transport & connector ──────────────────────────────────

    /// Records sent messages; replays messages pushed by the test.
    struct MockTransport {
        rx: mpsc::UnboundedReceiver<std::result::Result<String, PlazaError>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    /// Test-side controls for one mock transport.
    struct MockWire {
        tx: mpsc::UnboundedSender<std::result::Result<String, PlazaError>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockWire {
        fn push(&self, msg: &ServerMessage) {
            self.tx
                .send(Ok(serde_json::to_string(msg).unwrap()))
                .unwrap();
        }

        fn fail(&self) {
            let _ = self
                .tx
                .send(Err(PlazaError::TransportReceive("boom".into())));
        }

        fn sent_messages(&self) -> Vec<ClientMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|json| serde_json::from_str(json).unwrap())
                .collect()
        }
    }

    fn mock_wire() -> (MockTransport, MockWire) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        (
            MockTransport {
                rx,
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            },
            MockWire { tx, sent, closed },
        )
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), PlazaError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, PlazaError>> {
            // `UnboundedReceiver::recv` is cancel-safe; an empty but open
            // channel parks until the test pushes the next message.
            self.rx.recv().await
        }

        async fn close(&mut self) -> std::result::Result<(), PlazaError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Hands out pre-built mock transports, one per connect call.
    struct MockConnector {
        transports: StdMutex<VecDeque<MockTransport>>,
    }

    impl MockConnector {
        fn new(transports: Vec<MockTransport>) -> Self {
            Self {
                transports: StdMutex::new(transports.into()),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> std::result::Result<Box<dyn Transport>, PlazaError> {
            match self.transports.lock().unwrap().pop_front() {
                Some(transport) => Ok(Box::new(transport)),
                None => Err(PlazaError::Connect("no transport scripted".into())),
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn identity() -> SessionIdentity {
        SessionIdentity::new("Alice").with_user_id(Uuid::from_u128(1))
    }

    fn config() -> PlazaConfig {
        PlazaConfig::new()
            .with_handshake_timeout(Duration::from_millis(500))
            .with_reconnect_backoff(Duration::from_millis(10))
            .with_shutdown_timeout(Duration::from_millis(200))
    }

    fn welcome() -> ServerMessage {
        ServerMessage::Welcome {
            user_id: Uuid::from_u128(1),
            heartbeat_interval_ms: None,
        }
    }

    fn slot(id: u128, host: bool) -> PlayerSlot {
        PlayerSlot {
            user_id: Uuid::from_u128(id),
            display_name: format!("user-{id}"),
            ready: false,
            is_host: host,
        }
    }

    fn room_state(room: u128, players: Vec<PlayerSlot>) -> ServerMessage {
        ServerMessage::RoomState(Box::new(RoomStatePayload {
            room_id: Uuid::from_u128(room),
            game_type: GameType::Board,
            host_id: players
                .iter()
                .find(|p| p.is_host)
                .map(|p| p.user_id)
                .unwrap_or_else(|| Uuid::from_u128(99)),
            players,
            spectators: vec![],
            is_playing: false,
        }))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Connect a session over a single scripted transport.
    async fn connected_session() -> (PlazaSession, EventBus, MockWire) {
        let (transport, wire) = mock_wire();
        wire.push(&welcome());
        let connector = MockConnector::new(vec![transport]);
        let (session, bus) = PlazaSession::connect(connector, identity(), config())
            .await
            .unwrap();
        (session, bus, wire)
    }

    /// Drive the session into room 10 as a non-host player.
    async fn join_room_10(session: &PlazaSession, wire: &MockWire) {
        session.join_room(Uuid::from_u128(10)).unwrap();
        wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
        settle().await;
    }

    // ── Connect & handshake ─────────────────────────────────────────

    #[tokio::test]
    async fn connect_sends_hello_then_subscribes() {
        let (mut session, _bus, wire) = connected_session().await;

        let sent = wire.sent_messages();
        assert!(matches!(sent[0], ClientMessage::Hello { .. }));
        if let ClientMessage::Hello {
            user_id,
            ref display_name,
            role,
        } = sent[0]
        {
            assert_eq!(user_id, Uuid::from_u128(1));
            assert_eq!(display_name, "Alice");
            assert_eq!(role, SessionRole::Player);
        }

        let subscribes = sent
            .iter()
            .filter(|m| matches!(m, ClientMessage::Subscribe { .. }))
            .count();
        assert_eq!(subscribes, 6);
        assert!(sent
            .iter()
            .any(|m| matches!(m, ClientMessage::RoomListRequest)));
        assert_eq!(session.connection_state(), ConnectionState::Connected);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn connect_times_out_without_welcome() {
        let (transport, _wire) = mock_wire();
        let connector = MockConnector::new(vec![transport]);
        let config = config().with_handshake_timeout(Duration::from_millis(50));

        let result = PlazaSession::connect(connector, identity(), config).await;
        assert!(matches!(result, Err(PlazaError::Timeout)));
    }

    #[tokio::test]
    async fn connect_surfaces_server_error_during_handshake() {
        let (transport, wire) = mock_wire();
        wire.push(&ServerMessage::Error {
            message: "session already open".into(),
            error_code: Some(ErrorCode::DuplicateSession),
        });
        let connector = MockConnector::new(vec![transport]);

        let result = PlazaSession::connect(connector, identity(), config()).await;
        assert!(matches!(result, Err(PlazaError::ServerError { .. })));
    }

    // ── Join flow ───────────────────────────────────────────────────

    #[tokio::test]
    async fn join_subscribes_room_topics_before_confirmation() {
        let (mut session, _bus, wire) = connected_session().await;

        session.join_room(Uuid::from_u128(10)).unwrap();
        settle().await;

        let sent = wire.sent_messages();
        let room_subs: Vec<_> = sent
            .iter()
            .filter_map(|m| match m {
                ClientMessage::Subscribe { topic } if topic.starts_with("room/") => Some(topic),
                _ => None,
            })
            .collect();
        assert_eq!(room_subs.len(), 3);

        // Subscribes precede the join request.
        let join_pos = sent
            .iter()
            .position(|m| matches!(m, ClientMessage::JoinRoom { .. }))
            .unwrap();
        let last_sub_pos = sent
            .iter()
            .rposition(|m| matches!(m, ClientMessage::Subscribe { .. }))
            .unwrap();
        assert!(last_sub_pos < join_pos);

        // Not confirmed yet: no active room.
        assert!(session.current_room().is_none());

        session.disconnect().await;
    }

    #[tokio::test]
    async fn room_state_listing_us_confirms_join_and_emits_detail() {
        let (mut session, bus, wire) = connected_session().await;

        let details = Arc::new(AtomicUsize::new(0));
        let details2 = Arc::clone(&details);
        let _h = bus.on(EventCategory::RoomDetail, move |_| {
            details2.fetch_add(1, Ordering::SeqCst);
        });

        join_room_10(&session, &wire).await;

        let room = session.current_room().unwrap();
        assert_eq!(room.room_id, Uuid::from_u128(10));
        assert_eq!(room.phase, RoomPhase::Waiting);
        assert!(!session.is_host());
        assert_eq!(details.load(Ordering::SeqCst), 1);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn failed_join_rolls_back_and_unsubscribes() {
        let (mut session, bus, wire) = connected_session().await;

        let failures = Arc::new(AtomicUsize::new(0));
        let failures2 = Arc::clone(&failures);
        let _h = bus.on(EventCategory::JoinResult, move |event| {
            if let PlazaEvent::JoinResult { success: false, .. } = event {
                failures2.fetch_add(1, Ordering::SeqCst);
            }
        });

        session.join_room(Uuid::from_u128(10)).unwrap();
        wire.push(&ServerMessage::JoinResult {
            success: false,
            room_id: Uuid::from_u128(10),
            error_code: Some(ErrorCode::RoomFull),
            reason: Some("room is full".into()),
        });
        settle().await;

        assert!(session.current_room().is_none());
        assert_eq!(failures.load(Ordering::SeqCst), 1);

        let sent = wire.sent_messages();
        let unsubs = sent
            .iter()
            .filter(|m| matches!(m, ClientMessage::Unsubscribe { .. }))
            .count();
        assert_eq!(unsubs, 3);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn successful_create_adopts_room_from_join_result() {
        let (mut session, _bus, wire) = connected_session().await;

        session
            .create_room("omok", GameType::Board, 2, false)
            .unwrap();
        wire.push(&ServerMessage::JoinResult {
            success: true,
            room_id: Uuid::from_u128(42),
            error_code: None,
            reason: None,
        });
        settle().await;
        wire.push(&room_state(42, vec![slot(1, true)]));
        settle().await;

        let room = session.current_room().unwrap();
        assert_eq!(room.room_id, Uuid::from_u128(42));
        assert!(session.is_host());

        // The loop requested the authoritative state after adoption.
        let sent = wire.sent_messages();
        assert!(sent
            .iter()
            .any(|m| matches!(m, ClientMessage::RoomStateRequest { .. })));

        session.disconnect().await;
    }

    // ── Room operations ─────────────────────────────────────────────

    #[tokio::test]
    async fn start_game_requires_host() {
        let (mut session, _bus, wire) = connected_session().await;
        join_room_10(&session, &wire).await;

        assert!(matches!(session.start_game(), Err(PlazaError::NotHost)));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn room_operations_require_a_room() {
        let (mut session, _bus, _wire) = connected_session().await;

        assert!(matches!(session.leave_room(), Err(PlazaError::NotInRoom)));
        assert!(matches!(session.toggle_ready(), Err(PlazaError::NotInRoom)));
        assert!(matches!(
            session.send_room_chat("hi"),
            Err(PlazaError::NotInRoom)
        ));
        assert!(matches!(
            session.send_board_move(112),
            Err(PlazaError::NotInRoom)
        ));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn game_start_broadcast_enters_playing_and_routes_moves() {
        let (mut session, _bus, wire) = connected_session().await;
        join_room_10(&session, &wire).await;

        wire.push(&ServerMessage::Game(ServerGameEvent::GameStart {
            room_id: Uuid::from_u128(10),
        }));
        settle().await;
        assert_eq!(session.current_room().unwrap().phase, RoomPhase::Playing);

        // Seats are [host(2), us(1)]: not our turn yet.
        assert!(matches!(
            session.send_board_move(112),
            Err(PlazaError::NotYourTurn)
        ));

        wire.push(&ServerMessage::Game(ServerGameEvent::BoardMove {
            room_id: Uuid::from_u128(10),
            user_id: Uuid::from_u128(2),
            position: 112,
        }));
        settle().await;

        session.send_board_move(113).unwrap();
        settle().await;
        let sent = wire.sent_messages();
        assert!(sent.iter().any(|m| matches!(
            m,
            ClientMessage::Game {
                request: GameRequest::BoardMove { position: 113 },
                ..
            }
        )));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn directory_tracks_diffs_and_emits_room_list() {
        let (mut session, bus, wire) = connected_session().await;

        let lists = Arc::new(AtomicUsize::new(0));
        let lists2 = Arc::clone(&lists);
        let _h = bus.on(EventCategory::RoomList, move |_| {
            lists2.fetch_add(1, Ordering::SeqCst);
        });

        let summary = RoomSummary {
            room_id: Uuid::from_u128(7),
            name: "omok".into(),
            game_type: GameType::Board,
            host_id: Uuid::from_u128(2),
            max_players: 2,
            current_player_count: 1,
            is_locked: false,
            is_playing: false,
            spectator_count: 0,
        };
        wire.push(&ServerMessage::RoomDiff {
            action: DiffAction::Create,
            room: summary.clone(),
        });
        let mut joined = summary;
        joined.current_player_count = 2;
        wire.push(&ServerMessage::RoomDiff {
            action: DiffAction::Join,
            room: joined,
        });
        settle().await;

        let rooms = session.rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].current_player_count, 2);
        assert_eq!(lists.load(Ordering::SeqCst), 2);

        session.disconnect().await;
    }

    // ── Throttling ──────────────────────────────────────────────────

    #[tokio::test]
    async fn position_sends_are_throttled() {
        let (mut session, _bus, wire) = connected_session().await;

        let sample = PositionSample {
            user_id: Uuid::from_u128(1),
            x: 1.0,
            y: 0.0,
            z: 2.0,
            heading_radians: 0.5,
            animation_state: "walk".into(),
            model_ref: None,
            timestamp_ms: 0,
        };
        session.send_position(sample.clone()).unwrap();
        session.send_position(sample.clone()).unwrap();
        session.send_position(sample).unwrap();
        settle().await;

        let positions = wire
            .sent_messages()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Position(_)))
            .count();
        assert_eq!(positions, 1);

        session.disconnect().await;
    }

    // ── Reconnect ───────────────────────────────────────────────────

    #[tokio::test]
    async fn transport_failure_reconnects_resubscribes_and_refreshes() {
        let (first, first_wire) = mock_wire();
        first_wire.push(&welcome());
        let (second, second_wire) = mock_wire();
        second_wire.push(&welcome());

        let connector = MockConnector::new(vec![first, second]);
        let (mut session, bus) = PlazaSession::connect(connector, identity(), config())
            .await
            .unwrap();

        let states = Arc::new(StdMutex::new(Vec::new()));
        let states2 = Arc::clone(&states);
        let _h = bus.on(EventCategory::Connection, move |event| {
            if let PlazaEvent::Connection(state) = event {
                states2.lock().unwrap().push(*state);
            }
        });

        join_room_10(&session, &first_wire).await;
        first_wire.fail();
        settle().await;

        assert_eq!(session.connection_state(), ConnectionState::Connected);
        assert_eq!(
            *states.lock().unwrap(),
            vec![ConnectionState::Reconnecting, ConnectionState::Connected]
        );

        // The fresh connection replayed the handshake, every subscription
        // (6 lifetime + 3 room topics), and requested both snapshots.
        let sent = second_wire.sent_messages();
        assert!(matches!(sent[0], ClientMessage::Hello { .. }));
        let subs = sent
            .iter()
            .filter(|m| matches!(m, ClientMessage::Subscribe { .. }))
            .count();
        assert_eq!(subs, 9);
        assert!(sent
            .iter()
            .any(|m| matches!(m, ClientMessage::RoomListRequest)));
        assert!(sent.iter().any(|m| matches!(
            m,
            ClientMessage::RoomStateRequest { room_id } if *room_id == Uuid::from_u128(10)
        )));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn exhausted_reconnects_end_terminally_disconnected() {
        let (transport, wire) = mock_wire();
        wire.push(&welcome());
        // Only one transport scripted: every reconnect attempt fails.
        let connector = MockConnector::new(vec![transport]);
        let config = config().with_max_reconnect_attempts(2);

        let (mut session, bus) = PlazaSession::connect(connector, identity(), config)
            .await
            .unwrap();

        let disconnected = Arc::new(AtomicBool::new(false));
        let disconnected2 = Arc::clone(&disconnected);
        let _h = bus.on(EventCategory::Connection, move |event| {
            if let PlazaEvent::Connection(ConnectionState::Disconnected) = event {
                disconnected2.store(true, Ordering::SeqCst);
            }
        });

        wire.fail();
        settle().await;

        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(disconnected.load(Ordering::SeqCst));
        assert!(matches!(
            session.send_chat("hello?"),
            Err(PlazaError::NotConnected)
        ));

        session.disconnect().await;
    }

    #[tokio::test]
    async fn reconnect_as_tears_down_before_new_handshake() {
        let (first, first_wire) = mock_wire();
        first_wire.push(&welcome());
        let (second, second_wire) = mock_wire();
        second_wire.push(&welcome());

        let connector = MockConnector::new(vec![first, second]);
        let (mut session, _bus) = PlazaSession::connect(connector, identity(), config())
            .await
            .unwrap();
        assert_eq!(session.role(), SessionRole::Player);

        session.reconnect_as(SessionRole::Observer).unwrap();
        settle().await;

        // Old transport closed before the new handshake completed.
        assert!(first_wire.closed.load(Ordering::Relaxed));
        let sent = second_wire.sent_messages();
        assert!(matches!(
            sent[0],
            ClientMessage::Hello {
                role: SessionRole::Observer,
                ..
            }
        ));
        assert_eq!(session.role(), SessionRole::Observer);
        assert_eq!(session.connection_state(), ConnectionState::Connected);

        session.disconnect().await;
    }

    #[tokio::test]
    async fn reconnect_as_same_role_is_a_no_op() {
        let (mut session, _bus, wire) = connected_session().await;
        let before = wire.sent_messages().len();

        session.reconnect_as(SessionRole::Player).unwrap();
        settle().await;

        assert_eq!(wire.sent_messages().len(), before);
        session.disconnect().await;
    }

    // ── Teardown ────────────────────────────────────────────────────

    #[tokio::test]
    async fn disconnect_auto_leaves_room_and_closes_transport() {
        let (mut session, _bus, wire) = connected_session().await;
        join_room_10(&session, &wire).await;

        session.disconnect().await;

        let sent = wire.sent_messages();
        assert!(sent.iter().any(|m| matches!(
            m,
            ClientMessage::LeaveRoom { room_id } if *room_id == Uuid::from_u128(10)
        )));
        assert!(wire.closed.load(Ordering::Relaxed));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn double_disconnect_does_not_panic() {
        let (mut session, _bus, _wire) = connected_session().await;
        session.disconnect().await;
        session.disconnect().await;
    }

    #[tokio::test]
    async fn chat_events_carry_scope() {
        let (mut session, bus, wire) = connected_session().await;

        let scopes = Arc::new(StdMutex::new(Vec::new()));
        let scopes2 = Arc::clone(&scopes);
        let _h = bus.on(EventCategory::Chat, move |event| {
            if let PlazaEvent::Chat { room_id, .. } = event {
                scopes2.lock().unwrap().push(*room_id);
            }
        });

        let message = crate::protocol::ChatMessage {
            id: Uuid::from_u128(5),
            user_id: Uuid::from_u128(2),
            display_name: "Bob".into(),
            text: "hi".into(),
            sent_at_ms: 0,
        };
        wire.push(&ServerMessage::Chat(message.clone()));
        wire.push(&ServerMessage::RoomChat {
            room_id: Uuid::from_u128(10),
            message,
        });
        settle().await;

        assert_eq!(
            *scopes.lock().unwrap(),
            vec![None, Some(Uuid::from_u128(10))]
        );
        session.disconnect().await;
    }
}
