//! # Basic Plaza Example
//!
//! Demonstrates a complete Plaza client lifecycle:
//!
//! 1. Connect to a Plaza server via WebSocket
//! 2. Watch the room directory and global chat
//! 3. Create a board-game room and wait for an opponent
//! 4. React to game events as the server confirms them
//! 5. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a Plaza server on localhost:8017, then:
//! cargo run --example basic_plaza
//!
//! # Override the server URL:
//! PLAZA_URL=ws://my-server:8017/plaza cargo run --example basic_plaza
//! ```

use plaza_client::{
    ConnectionState, EventCategory, GameType, PlazaConfig, PlazaEvent, PlazaSession,
    SessionIdentity, WebSocketConnector,
};

/// Default server URL when `PLAZA_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8017/plaza";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Connect ─────────────────────────────────────────────────────
    let url = std::env::var("PLAZA_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");

    let connector = WebSocketConnector::new(&url);
    let identity = SessionIdentity::new("RustPlayer");
    let (mut session, bus) =
        PlazaSession::connect(connector, identity, PlazaConfig::new()).await?;
    tracing::info!("Connected as {}", session.user_id());

    // ── Listeners ───────────────────────────────────────────────────
    // Each handler is a plain closure; keep the returned handles alive for
    // as long as the subscription should last.
    let _rooms = bus.on(EventCategory::RoomList, |event| {
        if let PlazaEvent::RoomList(rooms) = event {
            tracing::info!("{} room(s) open", rooms.len());
            for room in rooms {
                tracing::info!(
                    "  {} — {:?}, {}/{} players",
                    room.name,
                    room.game_type,
                    room.current_player_count,
                    room.max_players
                );
            }
        }
    });

    let _chat = bus.on(EventCategory::Chat, |event| {
        if let PlazaEvent::Chat { room_id, message } = event {
            let scope = match room_id {
                Some(_) => "room",
                None => "plaza",
            };
            tracing::info!("[{scope}] {}: {}", message.display_name, message.text);
        }
    });

    let _detail = bus.on(EventCategory::RoomDetail, |event| {
        if let PlazaEvent::RoomDetail(view) = event {
            tracing::info!(
                "Room update: {} player(s), phase {:?}",
                view.players.len(),
                view.phase
            );
        }
    });

    let _game = bus.on(EventCategory::Game, |event| {
        if let PlazaEvent::Game(game_event) = event {
            tracing::info!("Game event: {game_event:?}");
        }
    });

    let _invites = bus.on(EventCategory::Invite, |event| {
        if let PlazaEvent::Invite {
            from_display_name,
            game_type,
            ..
        } = event
        {
            tracing::info!("{from_display_name} invited you to a {game_type:?} game");
        }
    });

    // Watch the connection so an outage is visible in the log.
    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel::<()>(1);
    let _conn = bus.on(EventCategory::Connection, move |event| {
        if let PlazaEvent::Connection(state) = event {
            tracing::info!("Connection: {state:?}");
            if *state == ConnectionState::Disconnected {
                let _ = done_tx.try_send(());
            }
        }
    });

    // ── Do something ────────────────────────────────────────────────
    session.send_chat("hello from Rust")?;
    session.create_room("rust room", GameType::Board, 2, false)?;

    // ── Wait ────────────────────────────────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down…");
        }
        _ = done_rx.recv() => {
            tracing::warn!("Session ended");
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    session.disconnect().await;
    tracing::info!("Session closed. Goodbye!");
    Ok(())
}
