//! Iterative Tower-of-Hanoi move generation and replay validation.
//!
//! Moves are produced lazily by [`HanoiMoves`] using the three-peg iterative
//! algorithm: the k-th move (0-based) acts on a fixed peg pair chosen by
//! `k % 3`, and within the pair the only legal move is taken. The pair cycle
//! depends on disc-count parity so that the tower always ends on peg C.
//!
//! Peg contents are stored bottom to top, so `[3, 2, 1]` has disc 1 on top.

use waystone_types::benchmark::{HanoiMove, Peg};

/// Peg that holds the full tower once every move has been applied.
pub const FINAL_PEG: Peg = Peg::C;

/// Number of moves in the optimal solution: `2^n - 1`.
pub fn expected_move_count(disc_count: u32) -> u64 {
    match disc_count {
        0 => 0,
        n if n >= 64 => u64::MAX,
        n => (1u64 << n) - 1,
    }
}

/// Collect the full optimal move sequence for `disc_count` discs.
pub fn generate_move_sequence(disc_count: u32) -> Vec<HanoiMove> {
    HanoiMoves::new(disc_count).collect()
}

// ---------------------------------------------------------------------------
// Move validation
// ---------------------------------------------------------------------------

/// A move that would break the puzzle's rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("cannot move disc {disc} from peg {from}: peg is empty")]
    EmptySource { disc: u32, from: Peg },

    #[error("cannot move disc {disc} from peg {from}: top disc is {top}")]
    NotOnTop { disc: u32, from: Peg, top: u32 },

    #[error("cannot place disc {disc} on peg {to}: smaller disc {top} is on top")]
    LargerOnSmaller { disc: u32, to: Peg, top: u32 },
}

/// Check a move against the source and target peg contents (bottom to top).
pub fn validate_move(source: &[u32], target: &[u32], mv: &HanoiMove) -> Result<(), MoveError> {
    match source.last() {
        None => {
            return Err(MoveError::EmptySource {
                disc: mv.disc,
                from: mv.from,
            });
        }
        Some(&top) if top != mv.disc => {
            return Err(MoveError::NotOnTop {
                disc: mv.disc,
                from: mv.from,
                top,
            });
        }
        Some(_) => {}
    }
    if let Some(&top) = target.last() {
        if top < mv.disc {
            return Err(MoveError::LargerOnSmaller {
                disc: mv.disc,
                to: mv.to,
                top,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PegBoard
// ---------------------------------------------------------------------------

/// Three pegs with every rule enforced on each move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PegBoard {
    pegs: [Vec<u32>; 3],
}

impl PegBoard {
    /// All `disc_count` discs stacked on peg A, largest at the bottom.
    pub fn new(disc_count: u32) -> Self {
        Self {
            pegs: [(1..=disc_count).rev().collect(), Vec::new(), Vec::new()],
        }
    }

    pub fn peg(&self, peg: Peg) -> &[u32] {
        &self.pegs[peg.index()]
    }

    /// Top disc of a peg, if any.
    pub fn top(&self, peg: Peg) -> Option<u32> {
        self.pegs[peg.index()].last().copied()
    }

    /// Validate and apply a move.
    pub fn apply(&mut self, mv: &HanoiMove) -> Result<(), MoveError> {
        validate_move(self.peg(mv.from), self.peg(mv.to), mv)?;
        self.pegs[mv.from.index()].pop();
        self.pegs[mv.to.index()].push(mv.disc);
        Ok(())
    }

    /// Whether every disc sits on `peg`.
    pub fn is_solved_on(&self, peg: Peg) -> bool {
        Peg::ALL
            .iter()
            .filter(|p| **p != peg)
            .all(|p| self.pegs[p.index()].is_empty())
    }
}

// ---------------------------------------------------------------------------
// HanoiMoves
// ---------------------------------------------------------------------------

/// Lazy iterator over the optimal move sequence.
///
/// Memory stays at `O(n)` regardless of how many moves are produced, so
/// large disc counts can be validated without collecting the sequence.
#[derive(Debug, Clone)]
pub struct HanoiMoves {
    board: PegBoard,
    pairs: [(Peg, Peg); 3],
    index: u64,
    total: u64,
}

impl HanoiMoves {
    pub fn new(disc_count: u32) -> Self {
        let pairs = if disc_count % 2 == 0 {
            [(Peg::A, Peg::B), (Peg::A, Peg::C), (Peg::B, Peg::C)]
        } else {
            [(Peg::A, Peg::C), (Peg::A, Peg::B), (Peg::B, Peg::C)]
        };
        Self {
            board: PegBoard::new(disc_count),
            pairs,
            index: 0,
            total: expected_move_count(disc_count),
        }
    }
}

impl Iterator for HanoiMoves {
    type Item = HanoiMove;

    fn next(&mut self) -> Option<HanoiMove> {
        if self.index >= self.total {
            return None;
        }
        let (x, y) = self.pairs[(self.index % 3) as usize];
        let (from, to) = match (self.board.top(x), self.board.top(y)) {
            (None, None) => return None,
            (Some(_), None) => (x, y),
            (None, Some(_)) => (y, x),
            (Some(a), Some(b)) if a < b => (x, y),
            (Some(_), Some(_)) => (y, x),
        };
        let disc = self.board.top(from)?;
        let mv = HanoiMove { disc, from, to };
        self.board.apply(&mv).ok()?;
        self.index += 1;
        Some(mv)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total - self.index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
