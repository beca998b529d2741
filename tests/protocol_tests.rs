#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Plaza protocol types.
//!
//! Focuses on the envelope shape, casing, and field-presence rules the
//! server depends on, with JSON fixtures matching real server output rather
//! than exhaustive per-variant round-trips.

use std::collections::HashMap;

use serde_json::{json, Value};
use uuid::Uuid;

use plaza_client::protocol::{
    ClientMessage, GameRequest, GameType, PositionSample, RoomStatePayload, RoomSummary,
    ServerGameEvent, ServerMessage, SessionRole,
};
use plaza_client::ErrorCode;

fn to_value<T: serde::Serialize>(val: &T) -> Value {
    serde_json::to_value(val).expect("serialize")
}

// ════════════════════════════════════════════════════════════════════
// Envelope shape
// ════════════════════════════════════════════════════════════════════

#[test]
fn client_messages_use_type_data_envelope() {
    let msg = ClientMessage::Chat {
        text: "hello".into(),
    };
    let value = to_value(&msg);
    assert_eq!(value["type"], "Chat");
    assert_eq!(value["data"]["text"], "hello");
}

#[test]
fn unit_variants_omit_the_data_field() {
    let value = to_value(&ClientMessage::Ping);
    assert_eq!(value, json!({ "type": "Ping" }));
}

#[test]
fn hello_carries_lowercase_role() {
    let msg = ClientMessage::Hello {
        user_id: Uuid::from_u128(1),
        display_name: "Alice".into(),
        role: SessionRole::Observer,
    };
    let value = to_value(&msg);
    assert_eq!(value["data"]["role"], "observer");
}

#[test]
fn game_requests_nest_their_own_envelope() {
    let msg = ClientMessage::Game {
        room_id: Uuid::from_u128(10),
        request: GameRequest::BoardMove { position: 112 },
    };
    let value = to_value(&msg);
    assert_eq!(value["data"]["request"]["type"], "BoardMove");
    assert_eq!(value["data"]["request"]["data"]["position"], 112);
}

// ════════════════════════════════════════════════════════════════════
// Server fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn welcome_fixture_parses() {
    let json = r#"{"type":"Welcome","data":{"user_id":"00000000-0000-0000-0000-000000000001","heartbeat_interval_ms":4000}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("parse");
    if let ServerMessage::Welcome {
        user_id,
        heartbeat_interval_ms,
    } = msg
    {
        assert_eq!(user_id, Uuid::from_u128(1));
        assert_eq!(heartbeat_interval_ms, Some(4000));
    } else {
        panic!("expected Welcome");
    }
}

#[test]
fn welcome_without_heartbeat_override_parses() {
    let json =
        r#"{"type":"Welcome","data":{"user_id":"00000000-0000-0000-0000-000000000001"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("parse");
    assert!(matches!(
        msg,
        ServerMessage::Welcome {
            heartbeat_interval_ms: None,
            ..
        }
    ));
}

#[test]
fn join_result_failure_fixture_parses() {
    let json = r#"{"type":"JoinResult","data":{"success":false,"room_id":"00000000-0000-0000-0000-00000000000a","error_code":"ROOM_FULL","reason":"room is full"}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("parse");
    if let ServerMessage::JoinResult {
        success,
        error_code,
        reason,
        ..
    } = msg
    {
        assert!(!success);
        assert_eq!(error_code, Some(ErrorCode::RoomFull));
        assert_eq!(reason.as_deref(), Some("room is full"));
    } else {
        panic!("expected JoinResult");
    }
}

#[test]
fn room_state_tolerates_missing_spectators() {
    // Older servers omit the spectator list entirely.
    let json = r#"{"room_id":"00000000-0000-0000-0000-00000000000a","game_type":"board","host_id":"00000000-0000-0000-0000-000000000002","players":[],"is_playing":false}"#;
    let payload: RoomStatePayload = serde_json::from_str(json).expect("parse");
    assert!(payload.spectators.is_empty());
}

#[test]
fn room_summary_tolerates_missing_spectator_count() {
    let json = r#"{"room_id":"00000000-0000-0000-0000-00000000000a","name":"omok","game_type":"board","host_id":"00000000-0000-0000-0000-000000000002","max_players":2,"current_player_count":1,"is_locked":false,"is_playing":false}"#;
    let summary: RoomSummary = serde_json::from_str(json).expect("parse");
    assert_eq!(summary.spectator_count, 0);
}

// ════════════════════════════════════════════════════════════════════
// Game events
// ════════════════════════════════════════════════════════════════════

#[test]
fn game_end_scores_are_a_structured_map() {
    let mut scores = HashMap::new();
    scores.insert(Uuid::from_u128(1), 4u32);
    let event = ServerGameEvent::GameEnd {
        room_id: Uuid::from_u128(10),
        scores,
        winner: None,
    };
    let value = to_value(&ServerMessage::Game(event));
    assert_eq!(
        value["data"]["data"]["scores"]["00000000-0000-0000-0000-000000000001"],
        4
    );
    // No winner: the field is absent, not null.
    assert!(value["data"]["data"].get("winner").is_none());
}

#[test]
fn game_end_scores_default_to_empty() {
    let json = r#"{"type":"Game","data":{"type":"GameEnd","data":{"room_id":"00000000-0000-0000-0000-00000000000a"}}}"#;
    let msg: ServerMessage = serde_json::from_str(json).expect("parse");
    if let ServerMessage::Game(ServerGameEvent::GameEnd { scores, winner, .. }) = msg {
        assert!(scores.is_empty());
        assert_eq!(winner, None);
    } else {
        panic!("expected GameEnd");
    }
}

#[test]
fn unknown_game_event_kind_is_rejected() {
    // The union is closed: unknown kinds are a parse error the session
    // logs, never a silently empty event.
    let json = r#"{"type":"Game","data":{"type":"TimeWarp","data":{"room_id":"00000000-0000-0000-0000-00000000000a"}}}"#;
    assert!(serde_json::from_str::<ServerMessage>(json).is_err());
}

#[test]
fn game_type_serializes_lowercase() {
    assert_eq!(to_value(&GameType::Reaction), json!("reaction"));
    assert_eq!(to_value(&GameType::Board), json!("board"));
}

// ════════════════════════════════════════════════════════════════════
// Error codes & positions
// ════════════════════════════════════════════════════════════════════

#[test]
fn error_codes_are_screaming_snake_case() {
    assert_eq!(to_value(&ErrorCode::RoomNotFound), json!("ROOM_NOT_FOUND"));
    assert_eq!(
        to_value(&ErrorCode::RateLimitExceeded),
        json!("RATE_LIMIT_EXCEEDED")
    );
    let code: ErrorCode = serde_json::from_str("\"DUPLICATE_SESSION\"").expect("parse");
    assert_eq!(code, ErrorCode::DuplicateSession);
}

#[test]
fn every_error_code_has_a_description() {
    // Spot-check that descriptions are real sentences, not placeholders.
    for code in [
        ErrorCode::Unauthorized,
        ErrorCode::RoomLocked,
        ErrorCode::RoleSwitchRejected,
        ErrorCode::InternalError,
    ] {
        assert!(code.description().len() > 10, "{code:?} lacks a description");
    }
}

#[test]
fn position_sample_omits_absent_model_ref() {
    let sample = PositionSample {
        user_id: Uuid::from_u128(1),
        x: 1.5,
        y: 0.0,
        z: -2.25,
        heading_radians: 1.57,
        animation_state: "walk".into(),
        model_ref: None,
        timestamp_ms: 1000,
    };
    let value = to_value(&ClientMessage::Position(sample));
    assert!(value["data"].get("model_ref").is_none());
    assert_eq!(value["data"]["animation_state"], "walk");
}
