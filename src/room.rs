//! Per-room lifecycle state machine for the locally joined room.
//!
//! The machine owns the single active [`RoomView`]; no other component may
//! write it. It is deliberately pure: every method only mutates local state
//! and reports what happened, while the session loop performs the matching
//! wire side effects (subscribe, unsubscribe, send).
//!
//! Lifecycle: `Lobby → Waiting → Playing → Ended`, with `Ended` returning to
//! `Waiting` (same room, new round) or `Lobby` (explicit leave). Transitions
//! into `Waiting` and `Playing` happen only on server-confirmed messages —
//! join requests and start requests are never client-predicted.

use tracing::debug;

use crate::protocol::{GameType, PlayerSlot, RoomId, RoomStatePayload, RoomSummary, UserId};

/// Lifecycle phase of the local session with respect to rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPhase {
    /// Not in any room.
    #[default]
    Lobby,
    /// Joined a room that has not started playing.
    Waiting,
    /// The server signaled game start.
    Playing,
    /// The server signaled game end; awaiting a new round or leave.
    Ended,
}

/// Cloneable snapshot of the occupied room, emitted on the event bus.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub room_id: RoomId,
    pub game_type: GameType,
    pub host_id: UserId,
    pub players: Vec<PlayerSlot>,
    pub spectators: Vec<PlayerSlot>,
    pub phase: RoomPhase,
}

/// What applying a server room-state broadcast did to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStateOutcome {
    /// A pending join was confirmed; the room is now active.
    JoinConfirmed,
    /// The active room's membership or phase was updated.
    Updated,
    /// The local user is no longer listed; the machine reset to `Lobby`.
    Evicted,
    /// The broadcast did not concern this session.
    Ignored,
}

#[derive(Debug)]
struct ActiveRoom {
    room_id: RoomId,
    game_type: GameType,
    host_id: UserId,
    players: Vec<PlayerSlot>,
    spectators: Vec<PlayerSlot>,
}

/// State machine for the room the local session occupies.
///
/// Only one room may be active per session; beginning a join while another
/// room is active implicitly leaves the first.
#[derive(Debug)]
pub struct RoomSessionMachine {
    local_user: UserId,
    phase: RoomPhase,
    active: Option<ActiveRoom>,
    pending_join: Option<RoomId>,
}

impl RoomSessionMachine {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            phase: RoomPhase::Lobby,
            active: None,
            pending_join: None,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// The room considered occupied: active, or pending confirmation.
    /// This is the room whose state is refreshed after a reconnect.
    pub fn occupied_room_id(&self) -> Option<RoomId> {
        self.active
            .as_ref()
            .map(|room| room.room_id)
            .or(self.pending_join)
    }

    /// The confirmed active room, if any.
    pub fn active_room_id(&self) -> Option<RoomId> {
        self.active.as_ref().map(|room| room.room_id)
    }

    pub fn is_host(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|room| room.host_id == self.local_user)
    }

    pub fn local_is_spectator(&self) -> bool {
        self.active.as_ref().is_some_and(|room| {
            room.spectators
                .iter()
                .any(|slot| slot.user_id == self.local_user)
        })
    }

    /// Record the intent to join `room_id`. Returns the previously occupied
    /// room, if any — the caller must leave it (wire message + unsubscribe)
    /// before subscribing to the new room's topics.
    ///
    /// The caller subscribes to the new room's topics immediately, before
    /// the server confirms, so a fast broadcast is not missed.
    pub fn begin_join(&mut self, room_id: RoomId) -> Option<RoomId> {
        let implicit_leave = self.occupied_room_id().filter(|id| *id != room_id);
        if implicit_leave.is_some() {
            debug!(?implicit_leave, "implicitly leaving previous room");
            self.active = None;
            self.phase = RoomPhase::Lobby;
        }
        self.pending_join = Some(room_id);
        implicit_leave
    }

    /// Roll back a pending join after an explicit server failure. Returns
    /// `true` if there was a matching pending join to roll back (the caller
    /// then unsubscribes from the optimistically opened topics).
    pub fn fail_join(&mut self, room_id: RoomId) -> bool {
        if self.pending_join == Some(room_id) {
            self.pending_join = None;
            true
        } else {
            false
        }
    }

    /// Apply an authoritative room-state broadcast.
    pub fn apply_room_state(&mut self, payload: &RoomStatePayload) -> RoomStateOutcome {
        let is_member = payload
            .players
            .iter()
            .chain(payload.spectators.iter())
            .any(|slot| slot.user_id == self.local_user);

        if self.pending_join == Some(payload.room_id) {
            if !is_member {
                // Broadcast raced ahead of our join being applied; keep
                // waiting for one that lists us or for an explicit failure.
                return RoomStateOutcome::Ignored;
            }
            self.pending_join = None;
            self.active = Some(ActiveRoom {
                room_id: payload.room_id,
                game_type: payload.game_type,
                host_id: payload.host_id,
                players: payload.players.clone(),
                spectators: payload.spectators.clone(),
            });
            self.phase = if payload.is_playing {
                RoomPhase::Playing
            } else {
                RoomPhase::Waiting
            };
            return RoomStateOutcome::JoinConfirmed;
        }

        let Some(active) = self.active.as_mut() else {
            return RoomStateOutcome::Ignored;
        };
        if active.room_id != payload.room_id {
            return RoomStateOutcome::Ignored;
        }

        if !is_member {
            debug!(room_id = %payload.room_id, "no longer a member, resetting to lobby");
            self.active = None;
            self.phase = RoomPhase::Lobby;
            return RoomStateOutcome::Evicted;
        }

        active.game_type = payload.game_type;
        active.host_id = payload.host_id;
        active.players = payload.players.clone();
        active.spectators = payload.spectators.clone();
        self.phase = reevaluate(self.phase, payload.is_playing);
        RoomStateOutcome::Updated
    }

    /// Re-evaluate the phase from a directory diff that concerns the
    /// occupied room (host migration, settings change, playing flag).
    pub fn apply_summary(&mut self, summary: &RoomSummary) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if active.room_id != summary.room_id {
            return false;
        }
        active.host_id = summary.host_id;
        active.game_type = summary.game_type;
        self.phase = reevaluate(self.phase, summary.is_playing);
        true
    }

    /// Server game-start broadcast. The only way into `Playing`.
    pub fn game_started(&mut self, room_id: RoomId) -> bool {
        if self.active_room_id() == Some(room_id) {
            self.phase = RoomPhase::Playing;
            true
        } else {
            false
        }
    }

    /// Server game-end broadcast. Applied unconditionally, regardless of
    /// who requested the end.
    pub fn game_ended(&mut self, room_id: RoomId) -> bool {
        if self.active_room_id() == Some(room_id) {
            self.phase = RoomPhase::Ended;
            true
        } else {
            false
        }
    }

    /// Start a new round in the same room: `Ended → Waiting`.
    pub fn return_to_waiting(&mut self) -> bool {
        if self.phase == RoomPhase::Ended {
            self.phase = RoomPhase::Waiting;
            true
        } else {
            false
        }
    }

    /// Leave from any state. Returns the room that was occupied so the
    /// caller can unsubscribe its topics; resets to `Lobby`.
    pub fn leave(&mut self) -> Option<RoomId> {
        let room_id = self.occupied_room_id();
        self.active = None;
        self.pending_join = None;
        self.phase = RoomPhase::Lobby;
        room_id
    }

    /// Snapshot for the event bus.
    pub fn view(&self) -> Option<RoomView> {
        self.active.as_ref().map(|room| RoomView {
            room_id: room.room_id,
            game_type: room.game_type,
            host_id: room.host_id,
            players: room.players.clone(),
            spectators: room.spectators.clone(),
            phase: self.phase,
        })
    }
}

/// Snapshot-wins phase re-evaluation. `Playing` is entered from any phase
/// when the server says the room is playing; an `Ended` room stays `Ended`
/// until an explicit new round or leave.
fn reevaluate(current: RoomPhase, is_playing: bool) -> RoomPhase {
    match (is_playing, current) {
        (true, _) => RoomPhase::Playing,
        (false, RoomPhase::Playing) => RoomPhase::Waiting,
        (false, other) => other,
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
    use uuid::Uuid;

    fn slot(id: u128, host: bool) -> PlayerSlot {
        PlayerSlot {
            user_id: Uuid::from_u128(id),
            display_name: format!("user-{id}"),
            ready: false,
            is_host: host,
        }
    }

    fn state(room: u128, players: Vec<PlayerSlot>, spectators: Vec<PlayerSlot>) -> RoomStatePayload {
        RoomStatePayload {
            room_id: Uuid::from_u128(room),
            game_type: GameType::Board,
            host_id: Uuid::from_u128(1),
            players,
            spectators,
            is_playing: false,
        }
    }

    #[test]
    fn join_confirms_only_when_listed_as_member() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        assert_eq!(machine.phase(), RoomPhase::Lobby);

        // Broadcast without us: still pending.
        let outcome = machine.apply_room_state(&state(10, vec![slot(1, true)], vec![]));
        assert_eq!(outcome, RoomStateOutcome::Ignored);
        assert_eq!(machine.phase(), RoomPhase::Lobby);

        // Broadcast listing us: confirmed.
        let outcome =
            machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));
        assert_eq!(outcome, RoomStateOutcome::JoinConfirmed);
        assert_eq!(machine.phase(), RoomPhase::Waiting);
        assert_eq!(machine.active_room_id(), Some(Uuid::from_u128(10)));
    }

    #[test]
    fn spectator_membership_also_confirms_join() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(3));
        machine.begin_join(Uuid::from_u128(10));
        let outcome =
            machine.apply_room_state(&state(10, vec![slot(1, true)], vec![slot(3, false)]));
        assert_eq!(outcome, RoomStateOutcome::JoinConfirmed);
        assert!(machine.local_is_spectator());
    }

    #[test]
    fn fail_join_rolls_back_to_lobby() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        assert!(machine.fail_join(Uuid::from_u128(10)));
        assert!(!machine.fail_join(Uuid::from_u128(10)));
        assert_eq!(machine.phase(), RoomPhase::Lobby);
        assert_eq!(machine.occupied_room_id(), None);
    }

    #[test]
    fn joining_second_room_implicitly_leaves_first() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));

        let left = machine.begin_join(Uuid::from_u128(20));
        assert_eq!(left, Some(Uuid::from_u128(10)));
        assert_eq!(machine.occupied_room_id(), Some(Uuid::from_u128(20)));
        assert_eq!(machine.phase(), RoomPhase::Lobby);
    }

    #[test]
    fn game_lifecycle_transitions() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));

        // Start only moves the active room.
        assert!(!machine.game_started(Uuid::from_u128(99)));
        assert!(machine.game_started(Uuid::from_u128(10)));
        assert_eq!(machine.phase(), RoomPhase::Playing);

        // End is unconditional for the active room.
        assert!(machine.game_ended(Uuid::from_u128(10)));
        assert_eq!(machine.phase(), RoomPhase::Ended);

        // New round returns to Waiting in the same room.
        assert!(machine.return_to_waiting());
        assert_eq!(machine.phase(), RoomPhase::Waiting);
        assert_eq!(machine.active_room_id(), Some(Uuid::from_u128(10)));
    }

    #[test]
    fn leave_resets_from_any_phase() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));
        machine.game_started(Uuid::from_u128(10));

        assert_eq!(machine.leave(), Some(Uuid::from_u128(10)));
        assert_eq!(machine.phase(), RoomPhase::Lobby);
        assert!(machine.view().is_none());
    }

    #[test]
    fn eviction_resets_to_lobby() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));

        let outcome = machine.apply_room_state(&state(10, vec![slot(1, true)], vec![]));
        assert_eq!(outcome, RoomStateOutcome::Evicted);
        assert_eq!(machine.phase(), RoomPhase::Lobby);
    }

    #[test]
    fn host_guard_tracks_host_migration() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        machine.apply_room_state(&state(10, vec![slot(1, true), slot(2, false)], vec![]));
        assert!(!machine.is_host());

        let mut migrated = state(10, vec![slot(2, true)], vec![]);
        migrated.host_id = Uuid::from_u128(2);
        machine.apply_room_state(&migrated);
        assert!(machine.is_host());
    }

    #[test]
    fn playing_snapshot_reevaluates_phase() {
        let mut machine = RoomSessionMachine::new(Uuid::from_u128(2));
        machine.begin_join(Uuid::from_u128(10));
        let mut playing = state(10, vec![slot(1, true), slot(2, false)], vec![]);
        playing.is_playing = true;

        // Rejoin into a game already in progress lands in Playing directly.
        assert_eq!(
            machine.apply_room_state(&playing),
            RoomStateOutcome::JoinConfirmed
        );
        assert_eq!(machine.phase(), RoomPhase::Playing);
    }
}
