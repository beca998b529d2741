#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the Plaza session, driven through the public API.
//!
//! A scripted [`MockConnector`] plays the server's side of the conversation;
//! assertions cover both the messages the session puts on the wire and the
//! events it emits on the bus.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use uuid::Uuid;

use plaza_client::protocol::{ClientMessage, DiffAction, GameRequest, ServerGameEvent};
use plaza_client::{
    ConnectionState, EventBus, EventCategory, GameType, PlazaError, PlazaEvent, PlazaSession,
    RoomPhase, ServerMessage, SessionRole,
};

use common::{
    config, identity, local_user, mock_wire, room_state, room_state_with, room_summary, settle,
    slot, welcome, MockConnector, MockWire,
};

async fn connected_session() -> (PlazaSession, EventBus, MockWire) {
    let (transport, wire) = mock_wire();
    wire.push(&welcome());
    let connector = MockConnector::new(vec![transport]);
    let (session, bus) = PlazaSession::connect(connector, identity(), config())
        .await
        .expect("connect");
    (session, bus, wire)
}

// ════════════════════════════════════════════════════════════════════
// Full room lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_play_end_new_round_lifecycle() {
    let (mut session, _bus, wire) = connected_session().await;

    // Create: the server confirms with a JoinResult, then the state
    // broadcast listing us as host.
    session
        .create_room("omok night", GameType::Board, 2, false)
        .unwrap();
    wire.push(&ServerMessage::JoinResult {
        success: true,
        room_id: Uuid::from_u128(10),
        error_code: None,
        reason: None,
    });
    settle().await;
    wire.push(&room_state(10, vec![slot(1, true)]));
    settle().await;

    assert!(session.is_host());
    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Waiting);

    // Opponent joins; host starts.
    wire.push(&room_state(10, vec![slot(1, true), slot(2, false)]));
    settle().await;
    session.start_game().unwrap();
    wire.push(&ServerMessage::Game(ServerGameEvent::GameStart {
        room_id: Uuid::from_u128(10),
    }));
    settle().await;
    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Playing);

    // We are seated first, so the opening move is ours.
    session.send_board_move(112).unwrap();
    settle().await;
    assert!(wire.sent_messages().iter().any(|m| matches!(
        m,
        ClientMessage::Game {
            request: GameRequest::BoardMove { position: 112 },
            ..
        }
    )));

    // Server ends the round.
    wire.push(&ServerMessage::Game(ServerGameEvent::GameEnd {
        room_id: Uuid::from_u128(10),
        scores: Default::default(),
        winner: Some(local_user()),
    }));
    settle().await;
    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Ended);

    // Results stay up through further state broadcasts until dismissed.
    wire.push(&room_state(10, vec![slot(1, true), slot(2, false)]));
    settle().await;
    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Ended);

    session.dismiss_results().unwrap();
    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Waiting);

    session.disconnect().await;
}

#[tokio::test]
async fn room_deletion_evicts_to_lobby() {
    let (mut session, bus, wire) = connected_session().await;

    session.join_room(Uuid::from_u128(10)).unwrap();
    wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
    settle().await;
    assert!(session.current_room().is_some());

    let lists = Arc::new(AtomicUsize::new(0));
    let lists2 = Arc::clone(&lists);
    let _h = bus.on(EventCategory::RoomList, move |_| {
        lists2.fetch_add(1, Ordering::SeqCst);
    });

    // Host closed the room: directory diff deletes it out from under us.
    wire.push(&ServerMessage::RoomDiff {
        action: DiffAction::Delete,
        room: room_summary(10, 2),
    });
    settle().await;

    assert!(session.current_room().is_none());
    assert_eq!(lists.load(Ordering::SeqCst), 1);

    // The session unsubscribed from all three room topics.
    let unsubs: Vec<String> = wire
        .sent_messages()
        .iter()
        .filter_map(|m| match m {
            ClientMessage::Unsubscribe { topic } => Some(topic.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(unsubs.len(), 3);
    assert!(unsubs.iter().all(|t| t.starts_with("room/")));

    // Room operations fail until the next join.
    assert!(matches!(session.toggle_ready(), Err(PlazaError::NotInRoom)));

    session.disconnect().await;
}

#[tokio::test]
async fn eviction_via_room_state_without_us() {
    let (mut session, _bus, wire) = connected_session().await;

    session.join_room(Uuid::from_u128(10)).unwrap();
    wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
    settle().await;

    // Kicked: the next broadcast no longer lists us.
    wire.push(&room_state(10, vec![slot(2, true)]));
    settle().await;

    assert!(session.current_room().is_none());
    session.disconnect().await;
}

#[tokio::test]
async fn joining_another_room_implicitly_leaves_the_first() {
    let (mut session, _bus, wire) = connected_session().await;

    session.join_room(Uuid::from_u128(10)).unwrap();
    wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
    settle().await;

    session.join_room(Uuid::from_u128(20)).unwrap();
    settle().await;

    let sent = wire.sent_messages();
    assert!(sent.iter().any(|m| matches!(
        m,
        ClientMessage::LeaveRoom { room_id } if *room_id == Uuid::from_u128(10)
    )));

    // The leave and its unsubscribes precede the second join.
    let leave_pos = sent
        .iter()
        .position(|m| matches!(m, ClientMessage::LeaveRoom { .. }))
        .unwrap();
    let second_join_pos = sent
        .iter()
        .rposition(|m| matches!(m, ClientMessage::JoinRoom { .. }))
        .unwrap();
    assert!(leave_pos < second_join_pos);

    wire.push(&room_state(20, vec![slot(3, true), slot(1, false)]));
    settle().await;
    assert_eq!(
        session.current_room().unwrap().room_id,
        Uuid::from_u128(20)
    );

    session.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn outage_mid_room_replays_topics_and_refreshes_state() {
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

    session.join_room(Uuid::from_u128(10)).unwrap();
    first_wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
    settle().await;

    first_wire.fail();
    settle().await;
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert_eq!(
        *states.lock().unwrap(),
        vec![ConnectionState::Reconnecting, ConnectionState::Connected]
    );

    // The fresh connection handshakes, replays every topic (six lifetime
    // plus three for the occupied room), and re-fetches both snapshots.
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

    // Still in the room from the session's point of view.
    assert_eq!(
        session.current_room().unwrap().room_id,
        Uuid::from_u128(10)
    );

    session.disconnect().await;
}

#[tokio::test]
async fn rejoin_into_running_game_restores_playing_view() {
    let (first, first_wire) = mock_wire();
    first_wire.push(&welcome());
    let (second, second_wire) = mock_wire();
    second_wire.push(&welcome());

    let connector = MockConnector::new(vec![first, second]);
    let (mut session, _bus) = PlazaSession::connect(connector, identity(), config())
        .await
        .unwrap();

    session.join_room(Uuid::from_u128(10)).unwrap();
    first_wire.push(&room_state(10, vec![slot(1, true), slot(2, false)]));
    settle().await;

    first_wire.fail();
    settle().await;

    // The refreshed state says the game started during the outage.
    second_wire.push(&room_state_with(
        10,
        vec![slot(1, true), slot(2, false)],
        vec![],
        true,
    ));
    settle().await;

    assert_eq!(session.current_room().unwrap().phase, RoomPhase::Playing);
    // The router picked up the game: our move goes on the wire.
    session.send_board_move(0).unwrap();
    settle().await;
    assert!(second_wire
        .sent_messages()
        .iter()
        .any(|m| matches!(m, ClientMessage::Game { .. })));

    session.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Role switching
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn observer_to_player_requires_full_reconnect() {
    let (first, first_wire) = mock_wire();
    first_wire.push(&welcome());
    let (second, second_wire) = mock_wire();
    second_wire.push(&welcome());

    let connector = MockConnector::new(vec![first, second]);
    let identity = identity().with_role(SessionRole::Observer);
    let (mut session, _bus) = PlazaSession::connect(connector, identity, config())
        .await
        .unwrap();
    assert_eq!(session.role(), SessionRole::Observer);

    session.reconnect_as(SessionRole::Player).unwrap();
    settle().await;

    // Old connection fully closed before the new hello went out.
    assert!(first_wire.closed.load(Ordering::Relaxed));
    assert!(matches!(
        second_wire.sent_messages()[0],
        ClientMessage::Hello {
            role: SessionRole::Player,
            ..
        }
    ));
    assert_eq!(session.role(), SessionRole::Player);
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    session.disconnect().await;
}

#[tokio::test]
async fn in_room_role_switch_is_waiting_phase_only() {
    let (mut session, _bus, wire) = connected_session().await;

    session.join_room(Uuid::from_u128(10)).unwrap();
    wire.push(&room_state(10, vec![slot(2, true), slot(1, false)]));
    settle().await;

    session.switch_role().unwrap();
    settle().await;
    let before_start = wire
        .sent_messages()
        .iter()
        .filter(|m| matches!(m, ClientMessage::SwitchRole { .. }))
        .count();
    assert_eq!(before_start, 1);

    // Playing: further switch requests are dropped locally.
    wire.push(&ServerMessage::Game(ServerGameEvent::GameStart {
        room_id: Uuid::from_u128(10),
    }));
    settle().await;
    session.switch_role().unwrap();
    settle().await;
    let after_start = wire
        .sent_messages()
        .iter()
        .filter(|m| matches!(m, ClientMessage::SwitchRole { .. }))
        .count();
    assert_eq!(after_start, 1);

    session.disconnect().await;
}

#[tokio::test]
async fn switch_into_full_player_set_is_dropped_locally() {
    let (mut session, _bus, wire) = connected_session().await;

    // Spectate a room whose player set is already full.
    session.join_room(Uuid::from_u128(10)).unwrap();
    wire.push(&room_state_with(
        10,
        vec![slot(2, true), slot(3, false)],
        vec![slot(1, false)],
        false,
    ));
    let mut summary = room_summary(10, 2);
    summary.current_player_count = 2;
    wire.push(&ServerMessage::RoomDiff {
        action: DiffAction::Join,
        room: summary,
    });
    settle().await;

    session.switch_role().unwrap();
    settle().await;
    assert!(!wire
        .sent_messages()
        .iter()
        .any(|m| matches!(m, ClientMessage::SwitchRole { .. })));

    session.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Events
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn invites_reach_their_listener() {
    let (mut session, bus, wire) = connected_session().await;

    let invites = Arc::new(StdMutex::new(Vec::new()));
    let invites2 = Arc::clone(&invites);
    let _h = bus.on(EventCategory::Invite, move |event| {
        if let PlazaEvent::Invite {
            from_display_name,
            room_id,
            ..
        } = event
        {
            invites2
                .lock()
                .unwrap()
                .push((from_display_name.clone(), *room_id));
        }
    });

    wire.push(&ServerMessage::Invite {
        from_user_id: Uuid::from_u128(2),
        from_display_name: "Bob".into(),
        room_id: Uuid::from_u128(10),
        game_type: GameType::Reaction,
    });
    settle().await;

    assert_eq!(
        *invites.lock().unwrap(),
        vec![("Bob".to_string(), Uuid::from_u128(10))]
    );
    session.disconnect().await;
}

#[tokio::test]
async fn bus_listener_can_be_detached() {
    let (mut session, bus, wire) = connected_session().await;

    let count = Arc::new(AtomicUsize::new(0));
    let count2 = Arc::clone(&count);
    let handle = bus.on(EventCategory::RoomList, move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    });

    wire.push(&ServerMessage::RoomList {
        rooms: vec![room_summary(7, 2)],
    });
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    bus.off(&handle);
    wire.push(&ServerMessage::RoomList { rooms: vec![] });
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    session.disconnect().await;
}
