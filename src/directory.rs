//! Local, eventually-consistent cache of room summaries.
//!
//! The directory is kept in sync by diff events broadcast on the shared
//! room-directory channel. Diff application is structurally idempotent:
//! `create` and `update` both resolve to an upsert keyed by `room_id`, and
//! `join`/`leave` replace occupancy counts from the payload instead of
//! incrementing. Duplicate or reordered delivery therefore never produces
//! two entries for one room and never crashes on a missing entry.

use std::collections::HashMap;

use tracing::debug;

use crate::protocol::{DiffAction, RoomId, RoomSummary};

/// Cache of [`RoomSummary`] entries, exclusively owned by the session.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<RoomId, RoomSummary>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one diff event. Returns `true` when the cache changed.
    ///
    /// A `delete` for an uncached room is dropped — there is nothing to
    /// delete, and trusting it would make reordered `delete`/`create` pairs
    /// resurrect rooms. Any other action for an uncached room inserts it,
    /// which absorbs an `update` arriving before its matching `create`.
    pub fn apply_diff(&mut self, action: DiffAction, room: RoomSummary) -> bool {
        let room_id = room.room_id;
        match action {
            DiffAction::Delete => {
                let removed = self.rooms.remove(&room_id).is_some();
                if !removed {
                    debug!(%room_id, "delete for uncached room dropped");
                }
                removed
            }
            DiffAction::Create | DiffAction::Update | DiffAction::Join | DiffAction::Leave => {
                self.rooms.insert(room_id, clamp(room));
                true
            }
        }
    }

    /// Replace the entire cache from a full room-list snapshot.
    pub fn apply_snapshot(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = rooms
            .into_iter()
            .map(|room| (room.room_id, clamp(room)))
            .collect();
    }

    /// A summary by id.
    pub fn get(&self, room_id: RoomId) -> Option<&RoomSummary> {
        self.rooms.get(&room_id)
    }

    /// All cached summaries.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        self.rooms.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// A room that reports over-capacity from a race is clamped, not trusted.
fn clamp(mut room: RoomSummary) -> RoomSummary {
    if room.current_player_count > room.max_players {
        debug!(
            room_id = %room.room_id,
            count = room.current_player_count,
            max = room.max_players,
            "clamping over-capacity player count"
        );
        room.current_player_count = room.max_players;
    }
    room
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
    use crate::protocol::GameType;
    use uuid::Uuid;

    fn summary(id: u128, current: u8, max: u8) -> RoomSummary {
        RoomSummary {
            room_id: Uuid::from_u128(id),
            name: format!("room-{id}"),
            game_type: GameType::Board,
            host_id: Uuid::from_u128(1000 + id),
            max_players: max,
            current_player_count: current,
            is_locked: false,
            is_playing: false,
            spectator_count: 0,
        }
    }

    #[test]
    fn duplicate_create_keeps_one_entry_and_does_not_double_counts() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Create, summary(1, 1, 4));
        directory.apply_diff(DiffAction::Create, summary(1, 1, 4));

        assert_eq!(directory.len(), 1);
        let room = directory.get(Uuid::from_u128(1)).unwrap();
        assert_eq!(room.current_player_count, 1);
    }

    #[test]
    fn update_before_create_inserts_the_room() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Update, summary(2, 2, 4));

        assert_eq!(directory.len(), 1);
        assert_eq!(
            directory.get(Uuid::from_u128(2)).unwrap().current_player_count,
            2
        );
    }

    #[test]
    fn create_then_join_replaces_count() {
        // Create with count 1, then join with count 2: one room, count
        // exactly 2.
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Create, summary(7, 1, 2));
        directory.apply_diff(DiffAction::Join, summary(7, 2, 2));

        let rooms = directory.rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, Uuid::from_u128(7));
        assert_eq!(rooms[0].current_player_count, 2);
    }

    #[test]
    fn duplicate_join_does_not_increment() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Create, summary(3, 1, 4));
        directory.apply_diff(DiffAction::Join, summary(3, 2, 4));
        directory.apply_diff(DiffAction::Join, summary(3, 2, 4));

        assert_eq!(
            directory.get(Uuid::from_u128(3)).unwrap().current_player_count,
            2
        );
    }

    #[test]
    fn delete_for_uncached_room_is_dropped() {
        let mut directory = RoomDirectory::new();
        assert!(!directory.apply_diff(DiffAction::Delete, summary(4, 0, 4)));
        assert!(directory.is_empty());
    }

    #[test]
    fn delete_removes_the_entry() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Create, summary(5, 1, 4));
        assert!(directory.apply_diff(DiffAction::Delete, summary(5, 1, 4)));
        assert!(directory.is_empty());
    }

    #[test]
    fn over_capacity_count_is_clamped() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Join, summary(6, 5, 2));

        assert_eq!(
            directory.get(Uuid::from_u128(6)).unwrap().current_player_count,
            2
        );
    }

    #[test]
    fn snapshot_replaces_cache() {
        let mut directory = RoomDirectory::new();
        directory.apply_diff(DiffAction::Create, summary(1, 1, 4));
        directory.apply_snapshot(vec![summary(8, 1, 4), summary(9, 2, 4)]);

        assert_eq!(directory.len(), 2);
        assert!(directory.get(Uuid::from_u128(1)).is_none());
    }
}
