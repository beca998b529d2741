//! View model for the turn-based stone placement game.
//!
//! The board is a 15×15 occupancy grid addressed by flat index
//! (`row * 15 + col`). The local board is never mutated on send: a move
//! request is only legal to issue on the local player's turn, and the board
//! changes only when the server echoes the move back — the echo confirms
//! the placement and advances the turn pointer from one source. Win
//! detection is entirely server-side.

use crate::protocol::UserId;

/// Side length of the board.
pub const BOARD_SIZE: usize = 15;

/// Total number of cells.
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// Result of a local legality check before sending a move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveCheck {
    Legal,
    NotYourTurn,
    Occupied,
    OutOfBounds,
    RoundOver,
}

/// Occupancy grid plus turn pointer for one round.
#[derive(Debug, Clone)]
pub struct BoardView {
    /// `None` = vacant, `Some(seat)` = stone of the player at that seat.
    cells: Vec<Option<u8>>,
    /// Seat order, as listed by the server at game start.
    seats: Vec<UserId>,
    /// Index into `seats` of the player whose turn it is.
    current_turn: usize,
    /// Confirmed moves in order, by flat index.
    moves: Vec<u16>,
    /// Winner as declared by the server's game-end event.
    winner: Option<UserId>,
}

impl BoardView {
    /// New empty board with the given seat order. The first seat moves
    /// first.
    pub fn new(seats: Vec<UserId>) -> Self {
        Self {
            cells: vec![None; CELL_COUNT],
            seats,
            current_turn: 0,
            moves: Vec::new(),
            winner: None,
        }
    }

    fn seat_of(&self, user_id: UserId) -> Option<usize> {
        self.seats.iter().position(|id| *id == user_id)
    }

    /// Whether the local player may issue a move request right now:
    /// it is their turn, the position is on the board, and the cell is
    /// vacant.
    pub fn can_move(&self, user_id: UserId, position: u16) -> MoveCheck {
        if self.winner.is_some() {
            return MoveCheck::RoundOver;
        }
        if self.seat_of(user_id) != Some(self.current_turn) {
            return MoveCheck::NotYourTurn;
        }
        match self.cells.get(usize::from(position)) {
            None => MoveCheck::OutOfBounds,
            Some(Some(_)) => MoveCheck::Occupied,
            Some(None) => MoveCheck::Legal,
        }
    }

    /// Apply a server-confirmed move (including the local player's own
    /// echo). Returns `false` when the echo cannot be applied — unknown
    /// mover, out-of-bounds position, or an already-occupied cell from a
    /// duplicate echo — and leaves the board untouched in that case.
    pub fn apply_confirmed_move(&mut self, user_id: UserId, position: u16) -> bool {
        let Some(seat) = self.seat_of(user_id) else {
            return false;
        };
        let Some(cell) = self.cells.get_mut(usize::from(position)) else {
            return false;
        };
        if cell.is_some() {
            // Duplicate or conflicting echo for a settled cell.
            return false;
        }
        *cell = Some(seat as u8);
        self.moves.push(position);
        // Confirmation and turn advance come from the same message.
        if !self.seats.is_empty() {
            self.current_turn = (seat + 1) % self.seats.len();
        }
        true
    }

    /// Record the server-declared winner.
    pub fn set_winner(&mut self, winner: Option<UserId>) {
        self.winner = winner;
    }

    pub fn winner(&self) -> Option<UserId> {
        self.winner
    }

    /// Seat occupying a cell, if any.
    pub fn stone_at(&self, position: u16) -> Option<u8> {
        self.cells.get(usize::from(position)).copied().flatten()
    }

    /// The user whose turn it is.
    pub fn current_turn_user(&self) -> Option<UserId> {
        self.seats.get(self.current_turn).copied()
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
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

    fn players() -> (UserId, UserId) {
        (Uuid::from_u128(1), Uuid::from_u128(2))
    }

    #[test]
    fn move_refused_out_of_turn() {
        let (a, b) = players();
        let board = BoardView::new(vec![a, b]);
        assert_eq!(board.can_move(b, 112), MoveCheck::NotYourTurn);
        assert_eq!(board.can_move(a, 112), MoveCheck::Legal);
    }

    #[test]
    fn board_mutates_only_on_echo_and_advances_turn() {
        let (a, b) = players();
        let mut board = BoardView::new(vec![a, b]);

        assert!(board.apply_confirmed_move(a, 112));
        assert_eq!(board.stone_at(112), Some(0));
        assert_eq!(board.current_turn_user(), Some(b));
    }

    #[test]
    fn duplicate_echo_for_settled_cell_is_rejected() {
        // Both clients raced a move to position 112; the server confirmed
        // only the first. A second echo must not mutate the board again.
        let (a, b) = players();
        let mut board = BoardView::new(vec![a, b]);

        assert!(board.apply_confirmed_move(a, 112));
        assert!(!board.apply_confirmed_move(b, 112));
        assert_eq!(board.stone_at(112), Some(0));
        assert_eq!(board.move_count(), 1);
        assert_eq!(board.current_turn_user(), Some(b));
    }

    #[test]
    fn out_of_bounds_positions_are_rejected() {
        let (a, b) = players();
        let mut board = BoardView::new(vec![a, b]);
        assert_eq!(board.can_move(a, CELL_COUNT as u16), MoveCheck::OutOfBounds);
        assert!(!board.apply_confirmed_move(a, 10_000));
    }

    #[test]
    fn unknown_mover_is_rejected() {
        let (a, b) = players();
        let mut board = BoardView::new(vec![a, b]);
        assert!(!board.apply_confirmed_move(Uuid::from_u128(99), 0));
    }

    #[test]
    fn no_moves_after_winner_declared() {
        let (a, b) = players();
        let mut board = BoardView::new(vec![a, b]);
        board.set_winner(Some(a));
        assert_eq!(board.can_move(a, 0), MoveCheck::RoundOver);
    }
}
