//! Game event routing and per-game view models.
//!
//! The [`GameRouter`] owns at most one active game, keyed by room id. Every
//! inbound [`ServerGameEvent`] is matched against that room id first; events
//! for any other room are discarded before dispatch. Outbound requests are
//! checked the other way: [`GameRouter::prepare_request`] decides whether a
//! request is worth putting on the wire, without ever mutating confirmed
//! state.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{PlazaError, Result};
use crate::protocol::{GameRequest, GameType, RoomId, ServerGameEvent, UserId};

pub mod board;
pub mod reaction;
pub mod targets;

pub use board::{BoardView, MoveCheck, BOARD_SIZE, CELL_COUNT};
pub use reaction::{ReactionPhase, ReactionView};
pub use targets::TargetView;

/// View model for whichever game is active.
#[derive(Debug, Clone)]
pub enum GameView {
    Board(BoardView),
    Target(TargetView),
    Reaction(ReactionView),
}

#[derive(Debug)]
struct ActiveGame {
    room_id: RoomId,
    game_type: GameType,
    view: GameView,
    /// Final scores from the last game-end event, if any.
    final_scores: HashMap<UserId, u32>,
}

/// Routes game traffic for the single locally active game.
#[derive(Debug)]
pub struct GameRouter {
    local_user: UserId,
    active: Option<ActiveGame>,
}

impl GameRouter {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            active: None,
        }
    }

    /// Begin routing for a game in `room_id`. `seats` is the server's
    /// player order at start; only the board game consumes it.
    pub fn start(&mut self, room_id: RoomId, game_type: GameType, seats: Vec<UserId>) {
        let view = match game_type {
            GameType::Board => GameView::Board(BoardView::new(seats)),
            GameType::Target => GameView::Target(TargetView::new()),
            GameType::Reaction => GameView::Reaction(ReactionView::new()),
        };
        self.active = Some(ActiveGame {
            room_id,
            game_type,
            view,
            final_scores: HashMap::new(),
        });
    }

    /// Stop routing (room left or session torn down).
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// The room whose game is being routed, if any.
    pub fn active_room(&self) -> Option<RoomId> {
        self.active.as_ref().map(|game| game.room_id)
    }

    pub fn game_type(&self) -> Option<GameType> {
        self.active.as_ref().map(|game| game.game_type)
    }

    /// Current view, for UI snapshots.
    pub fn view(&self) -> Option<&GameView> {
        self.active.as_ref().map(|game| &game.view)
    }

    /// Scores from the most recent game-end event.
    pub fn final_scores(&self) -> Option<&HashMap<UserId, u32>> {
        self.active.as_ref().map(|game| &game.final_scores)
    }

    /// Decide whether an outbound request should be sent.
    ///
    /// `Ok(true)` means put it on the wire; `Ok(false)` means drop it
    /// silently (already-claimed target, click outside the reaction
    /// window). Turn violations and occupied cells are surfaced as errors
    /// so the caller can report them. Confirmed state is never mutated
    /// here except for the target view's optimistic pending set.
    pub fn prepare_request(&mut self, room_id: RoomId, request: &GameRequest) -> Result<bool> {
        let Some(active) = self.active.as_mut() else {
            return Err(PlazaError::NotInRoom);
        };
        if active.room_id != room_id {
            return Err(PlazaError::NotInRoom);
        }

        match (&mut active.view, request) {
            (GameView::Board(board), GameRequest::BoardMove { position }) => {
                match board.can_move(self.local_user, *position) {
                    MoveCheck::Legal => Ok(true),
                    MoveCheck::NotYourTurn => Err(PlazaError::NotYourTurn),
                    MoveCheck::Occupied | MoveCheck::OutOfBounds | MoveCheck::RoundOver => {
                        debug!(position, "illegal board move dropped");
                        Ok(false)
                    }
                }
            }
            (GameView::Target(targets), GameRequest::TargetHit { target_id }) => {
                Ok(targets.optimistic_hit(*target_id))
            }
            (GameView::Reaction(_), GameRequest::ReactionStart { .. }) => Ok(true),
            (GameView::Reaction(reaction), GameRequest::ReactionHit) => Ok(reaction.can_hit()),
            (view, request) => {
                warn!(?request, active = ?discriminant_name(view), "request does not match active game");
                Ok(false)
            }
        }
    }

    /// Apply a server-confirmed game event. Returns `true` when the event
    /// was applied to the active game; events for another room, or of a
    /// kind the active game cannot consume, are discarded.
    pub fn apply(&mut self, event: &ServerGameEvent) -> bool {
        let Some(active) = self.active.as_mut() else {
            debug!(room_id = %event.room_id(), "game event with no active game discarded");
            return false;
        };
        if active.room_id != event.room_id() {
            debug!(
                event_room = %event.room_id(),
                active_room = %active.room_id,
                "game event for another room discarded"
            );
            return false;
        }

        match event {
            ServerGameEvent::GameStart { .. } => true,
            ServerGameEvent::GameEnd { scores, winner, .. } => {
                active.final_scores = scores.clone();
                match &mut active.view {
                    GameView::Board(board) => board.set_winner(*winner),
                    GameView::Reaction(reaction) => reaction.end(*winner),
                    GameView::Target(targets) => targets.set_scores(scores.clone()),
                }
                true
            }
            ServerGameEvent::BoardMove {
                user_id, position, ..
            } => match &mut active.view {
                GameView::Board(board) => board.apply_confirmed_move(*user_id, *position),
                other => mismatched(event, other),
            },
            ServerGameEvent::SpawnTarget { target, .. } => match &mut active.view {
                GameView::Target(targets) => {
                    targets.spawn(target.clone());
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::TargetRemoved { target_id, .. } => match &mut active.view {
                GameView::Target(targets) => {
                    targets.remove(*target_id);
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::TargetSync { targets, .. } => match &mut active.view {
                GameView::Target(view) => {
                    view.sync(targets.clone());
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::ScoreUpdate { user_id, score, .. } => match &mut active.view {
                GameView::Target(targets) => {
                    targets.set_score(*user_id, *score);
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::ReactionPrepare { .. } => match &mut active.view {
                GameView::Reaction(reaction) => {
                    reaction.prepare();
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::ReactionGo { .. } => match &mut active.view {
                GameView::Reaction(reaction) => {
                    reaction.go();
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::ReactionResult {
                user_id,
                display_name,
                ..
            } => match &mut active.view {
                GameView::Reaction(reaction) => {
                    reaction.result(*user_id, display_name.clone());
                    true
                }
                other => mismatched(event, other),
            },
            ServerGameEvent::ReactionEnd { winner, .. } => match &mut active.view {
                GameView::Reaction(reaction) => {
                    reaction.end(*winner);
                    true
                }
                other => mismatched(event, other),
            },
        }
    }
}

fn mismatched(event: &ServerGameEvent, view: &GameView) -> bool {
    warn!(?event, active = discriminant_name(view), "game event does not match active game type");
    false
}

fn discriminant_name(view: &GameView) -> &'static str {
    match view {
        GameView::Board(_) => "board",
        GameView::Target(_) => "target",
        GameView::Reaction(_) => "reaction",
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
    use crate::protocol::Target;
    use uuid::Uuid;

    fn ids() -> (UserId, UserId, RoomId) {
        (Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(10))
    }

    #[test]
    fn request_without_active_game_is_an_error() {
        let (me, _, room) = ids();
        let mut router = GameRouter::new(me);
        let result = router.prepare_request(room, &GameRequest::BoardMove { position: 0 });
        assert!(matches!(result, Err(PlazaError::NotInRoom)));
    }

    #[test]
    fn board_move_gated_by_turn() {
        let (me, other, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Board, vec![other, me]);

        // Other player's turn: surfaced as an error, nothing sent.
        let result = router.prepare_request(room, &GameRequest::BoardMove { position: 112 });
        assert!(matches!(result, Err(PlazaError::NotYourTurn)));

        // Server confirms the other player's move; now it is our turn.
        assert!(router.apply(&ServerGameEvent::BoardMove {
            room_id: room,
            user_id: other,
            position: 112,
        }));
        assert!(router
            .prepare_request(room, &GameRequest::BoardMove { position: 113 })
            .unwrap());

        // Occupied cell: dropped silently.
        assert!(!router
            .prepare_request(room, &GameRequest::BoardMove { position: 112 })
            .unwrap());
    }

    #[test]
    fn events_for_another_room_are_discarded() {
        let (me, other, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Board, vec![me, other]);

        assert!(!router.apply(&ServerGameEvent::BoardMove {
            room_id: Uuid::from_u128(99),
            user_id: me,
            position: 0,
        }));
        // Board untouched: still our turn.
        assert!(router
            .prepare_request(room, &GameRequest::BoardMove { position: 0 })
            .unwrap());
    }

    #[test]
    fn target_hit_sent_once_per_target() {
        let (me, _, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Target, vec![]);

        let target_id = Uuid::from_u128(50);
        router.apply(&ServerGameEvent::SpawnTarget {
            room_id: room,
            target: Target {
                id: target_id,
                x: 0.3,
                y: 0.4,
                size: 0.1,
                spawned_at_ms: 0,
                lifetime_ms: 2000,
            },
        });

        assert!(router
            .prepare_request(room, &GameRequest::TargetHit { target_id })
            .unwrap());
        assert!(!router
            .prepare_request(room, &GameRequest::TargetHit { target_id })
            .unwrap());
    }

    #[test]
    fn reaction_hit_only_inside_go_window() {
        let (me, _, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Reaction, vec![]);

        assert!(!router.prepare_request(room, &GameRequest::ReactionHit).unwrap());
        router.apply(&ServerGameEvent::ReactionPrepare { room_id: room });
        assert!(!router.prepare_request(room, &GameRequest::ReactionHit).unwrap());
        router.apply(&ServerGameEvent::ReactionGo { room_id: room });
        assert!(router.prepare_request(room, &GameRequest::ReactionHit).unwrap());
    }

    #[test]
    fn mismatched_event_kind_is_discarded() {
        let (me, _, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Board, vec![me]);

        assert!(!router.apply(&ServerGameEvent::ReactionGo { room_id: room }));
    }

    #[test]
    fn game_end_records_scores_verbatim() {
        let (me, other, room) = ids();
        let mut router = GameRouter::new(me);
        router.start(room, GameType::Target, vec![]);

        let mut scores = HashMap::new();
        scores.insert(me, 4);
        scores.insert(other, 7);
        assert!(router.apply(&ServerGameEvent::GameEnd {
            room_id: room,
            scores: scores.clone(),
            winner: Some(other),
        }));
        assert_eq!(router.final_scores(), Some(&scores));
    }
}
