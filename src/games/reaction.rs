//! View model for the timed reaction race.
//!
//! The round phase is driven entirely by server events: `prepare` arms the
//! round, `go` opens the claim window after a server-chosen delay, and a
//! result or end message closes it. A hit is only worth sending during the
//! `go` window.

use crate::protocol::UserId;

/// Phase of the current reaction round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReactionPhase {
    /// No round running.
    #[default]
    Idle,
    /// Round armed; GO follows.
    Prepare,
    /// Claim window open.
    Go,
    /// Round over.
    Ended,
}

/// Reaction round view.
#[derive(Debug, Clone, Default)]
pub struct ReactionView {
    phase: ReactionPhase,
    winner: Option<UserId>,
    winner_name: Option<String>,
}

impl ReactionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server armed a round; clears any previous winner.
    pub fn prepare(&mut self) {
        self.phase = ReactionPhase::Prepare;
        self.winner = None;
        self.winner_name = None;
    }

    /// Server opened the claim window.
    pub fn go(&mut self) {
        self.phase = ReactionPhase::Go;
    }

    /// Server declared a winner.
    pub fn result(&mut self, user_id: UserId, display_name: String) {
        self.phase = ReactionPhase::Ended;
        self.winner = Some(user_id);
        self.winner_name = Some(display_name);
    }

    /// Round timed out; `winner` is the server's final word (possibly
    /// nobody clicked in time).
    pub fn end(&mut self, winner: Option<UserId>) {
        self.phase = ReactionPhase::Ended;
        if self.winner.is_none() {
            self.winner = winner;
        }
    }

    /// Whether a hit request is worth sending right now.
    pub fn can_hit(&self) -> bool {
        self.phase == ReactionPhase::Go
    }

    pub fn phase(&self) -> ReactionPhase {
        self.phase
    }

    pub fn winner(&self) -> Option<UserId> {
        self.winner
    }

    pub fn winner_name(&self) -> Option<&str> {
        self.winner_name.as_deref()
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

    #[test]
    fn hit_only_sent_during_go_window() {
        let mut view = ReactionView::new();
        assert!(!view.can_hit());

        view.prepare();
        assert!(!view.can_hit()); // clicking early sends nothing

        view.go();
        assert!(view.can_hit());

        view.end(None);
        assert!(!view.can_hit());
    }

    #[test]
    fn result_records_the_winner() {
        let mut view = ReactionView::new();
        view.prepare();
        view.go();
        view.result(Uuid::from_u128(4), "Dana".into());

        assert_eq!(view.phase(), ReactionPhase::Ended);
        assert_eq!(view.winner(), Some(Uuid::from_u128(4)));
        assert_eq!(view.winner_name(), Some("Dana"));
    }

    #[test]
    fn new_round_clears_previous_winner() {
        let mut view = ReactionView::new();
        view.go();
        view.result(Uuid::from_u128(4), "Dana".into());

        view.prepare();
        assert_eq!(view.winner(), None);
        assert_eq!(view.phase(), ReactionPhase::Prepare);
    }

    #[test]
    fn end_without_result_keeps_server_verdict() {
        let mut view = ReactionView::new();
        view.go();
        view.end(Some(Uuid::from_u128(7)));
        assert_eq!(view.winner(), Some(Uuid::from_u128(7)));
    }
}
