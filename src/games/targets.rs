//! View model for the target-based reflex game.
//!
//! Target spawns and removals are server-driven. A local click applies an
//! *optimistic* removal for immediate feedback and sends a hit request; if
//! the server never confirms (another player hit the target first), the next
//! authoritative sync silently reinstates the target. Scores come verbatim
//! from server score updates and are never computed locally.

use std::collections::{HashMap, HashSet};

use crate::protocol::{Target, TargetId, UserId};

/// Active targets, optimistic pending hits, and the score table.
#[derive(Debug, Clone, Default)]
pub struct TargetView {
    /// Targets the server considers active.
    active: HashMap<TargetId, Target>,
    /// Targets hidden locally while a hit request awaits confirmation.
    /// Structurally separate from `active` so an optimistic change can
    /// never leak into confirmed state.
    pending_hits: HashSet<TargetId>,
    /// Authoritative scores.
    scores: HashMap<UserId, u32>,
}

impl TargetView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server spawned a target.
    pub fn spawn(&mut self, target: Target) {
        self.pending_hits.remove(&target.id);
        self.active.insert(target.id, target);
    }

    /// Server removed a target (hit or expired).
    pub fn remove(&mut self, target_id: TargetId) -> bool {
        self.pending_hits.remove(&target_id);
        self.active.remove(&target_id).is_some()
    }

    /// Authoritative list of active targets. Replaces the active set and
    /// discards every pending optimistic hit: a target the server still
    /// lists must be re-displayed, one it no longer lists is gone.
    pub fn sync(&mut self, targets: Vec<Target>) {
        self.active = targets.into_iter().map(|t| (t.id, t)).collect();
        self.pending_hits.clear();
    }

    /// Record an optimistic local hit. Returns `true` when a hit request
    /// should be sent: the target is active and not already claimed
    /// locally.
    pub fn optimistic_hit(&mut self, target_id: TargetId) -> bool {
        if !self.active.contains_key(&target_id) {
            return false;
        }
        self.pending_hits.insert(target_id)
    }

    /// Set a player's score verbatim from a server update.
    pub fn set_score(&mut self, user_id: UserId, score: u32) {
        self.scores.insert(user_id, score);
    }

    /// Replace the whole score table (end-of-round).
    pub fn set_scores(&mut self, scores: HashMap<UserId, u32>) {
        self.scores = scores;
    }

    pub fn score(&self, user_id: UserId) -> u32 {
        self.scores.get(&user_id).copied().unwrap_or(0)
    }

    /// Targets a UI should draw: active minus optimistically hidden.
    pub fn visible(&self) -> Vec<&Target> {
        self.active
            .values()
            .filter(|t| !self.pending_hits.contains(&t.id))
            .collect()
    }

    /// Whether a target is drawn right now.
    pub fn is_visible(&self, target_id: TargetId) -> bool {
        self.active.contains_key(&target_id) && !self.pending_hits.contains(&target_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
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

    fn target(id: u128) -> Target {
        Target {
            id: Uuid::from_u128(id),
            x: 0.5,
            y: 0.5,
            size: 0.08,
            spawned_at_ms: 0,
            lifetime_ms: 2000,
        }
    }

    #[test]
    fn optimistic_hit_hides_target_until_confirmation() {
        let mut view = TargetView::new();
        view.spawn(target(1));

        assert!(view.optimistic_hit(Uuid::from_u128(1)));
        assert!(!view.is_visible(Uuid::from_u128(1)));
        // Second click on the same target sends nothing.
        assert!(!view.optimistic_hit(Uuid::from_u128(1)));

        // Server confirms: target actually removed.
        assert!(view.remove(Uuid::from_u128(1)));
        assert_eq!(view.active_count(), 0);
    }

    #[test]
    fn unconfirmed_hit_is_reinstated_by_sync() {
        // The client optimistically removes "t1", but the next server sync
        // still lists it (someone else hit faster, our claim lost), so the
        // view must re-display it.
        let mut view = TargetView::new();
        view.spawn(target(1));
        view.optimistic_hit(Uuid::from_u128(1));
        assert!(!view.is_visible(Uuid::from_u128(1)));

        view.sync(vec![target(1)]);
        assert!(view.is_visible(Uuid::from_u128(1)));
    }

    #[test]
    fn sync_drops_targets_the_server_no_longer_lists() {
        let mut view = TargetView::new();
        view.spawn(target(1));
        view.spawn(target(2));

        view.sync(vec![target(2)]);
        assert!(!view.is_visible(Uuid::from_u128(1)));
        assert!(view.is_visible(Uuid::from_u128(2)));
        assert_eq!(view.active_count(), 1);
    }

    #[test]
    fn hit_on_unknown_target_sends_nothing() {
        let mut view = TargetView::new();
        assert!(!view.optimistic_hit(Uuid::from_u128(9)));
    }

    #[test]
    fn scores_are_taken_verbatim() {
        let mut view = TargetView::new();
        let player = Uuid::from_u128(5);
        view.set_score(player, 3);
        view.set_score(player, 2); // server said 2; no local max() logic
        assert_eq!(view.score(player), 2);
    }
}
