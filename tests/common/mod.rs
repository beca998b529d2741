#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Plaza Client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] whose server side is scripted
//! live from the test body, a [`MockConnector`] that hands out one transport
//! per connect call, and helpers for common server messages.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use plaza_client::protocol::{
    ClientMessage, GameType, PlayerSlot, RoomStatePayload, RoomSummary, ServerMessage,
};
use plaza_client::{Connector, PlazaConfig, PlazaError, SessionIdentity, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-driven mock transport.
///
/// `recv` pulls from an unbounded channel the test writes to through
/// [`MockWire`], so messages can be injected mid-flight; dropping the wire's
/// sender reads as a clean server-side close. Everything the client sends is
/// recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, PlazaError>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle for one [`MockTransport`].
pub struct MockWire {
    tx: mpsc::UnboundedSender<Result<String, PlazaError>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockWire {
    /// Script one server message.
    pub fn push(&self, msg: &ServerMessage) {
        self.tx
            .send(Ok(serde_json::to_string(msg).expect("serialize server message")))
            .expect("transport still live");
    }

    /// Script a transport receive failure.
    pub fn fail(&self) {
        let _ = self
            .tx
            .send(Err(PlazaError::TransportReceive("scripted failure".into())));
    }

    /// Everything the client put on the wire so far, deserialized.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).expect("parse client message"))
            .collect()
    }
}

/// Build a transport plus its test-side wire handle.
pub fn mock_wire() -> (MockTransport, MockWire) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockTransport {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        },
        MockWire { tx, sent, closed },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), PlazaError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PlazaError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), PlazaError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out pre-built transports in order, one per connect call. Once the
/// script runs dry, further connect attempts fail.
pub struct MockConnector {
    transports: StdMutex<VecDeque<MockTransport>>,
}

impl MockConnector {
    pub fn new(transports: Vec<MockTransport>) -> Self {
        Self {
            transports: StdMutex::new(transports.into()),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, PlazaError> {
        match self.transports.lock().unwrap().pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(PlazaError::Connect("no transport scripted".into())),
        }
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// The local test user's fixed id.
pub fn local_user() -> Uuid {
    Uuid::from_u128(1)
}

pub fn identity() -> SessionIdentity {
    SessionIdentity::new("Alice").with_user_id(local_user())
}

/// Config with intervals tightened for tests.
pub fn config() -> PlazaConfig {
    PlazaConfig::new()
        .with_handshake_timeout(Duration::from_millis(500))
        .with_reconnect_backoff(Duration::from_millis(10))
        .with_position_min_interval(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_millis(200))
}

pub fn welcome() -> ServerMessage {
    ServerMessage::Welcome {
        user_id: local_user(),
        heartbeat_interval_ms: None,
    }
}

pub fn slot(id: u128, host: bool) -> PlayerSlot {
    PlayerSlot {
        user_id: Uuid::from_u128(id),
        display_name: format!("user-{id}"),
        ready: false,
        is_host: host,
    }
}

pub fn room_state(room: u128, players: Vec<PlayerSlot>) -> ServerMessage {
    room_state_with(room, players, vec![], false)
}

pub fn room_state_with(
    room: u128,
    players: Vec<PlayerSlot>,
    spectators: Vec<PlayerSlot>,
    is_playing: bool,
) -> ServerMessage {
    let host_id = players
        .iter()
        .chain(spectators.iter())
        .find(|p| p.is_host)
        .map(|p| p.user_id)
        .unwrap_or_else(|| Uuid::from_u128(99));
    ServerMessage::RoomState(Box::new(RoomStatePayload {
        room_id: Uuid::from_u128(room),
        game_type: GameType::Board,
        host_id,
        players,
        spectators,
        is_playing,
    }))
}

pub fn room_summary(room: u128, host: u128) -> RoomSummary {
    RoomSummary {
        room_id: Uuid::from_u128(room),
        name: format!("room-{room}"),
        game_type: GameType::Board,
        host_id: Uuid::from_u128(host),
        max_players: 2,
        current_player_count: 1,
        is_locked: false,
        is_playing: false,
        spectator_count: 0,
    }
}

/// Yield long enough for the session loop to drain pending messages.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
