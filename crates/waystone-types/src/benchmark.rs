//! Tower-of-Hanoi benchmark data types.
//!
//! The benchmark drives one workflow step per disc move, so these types are
//! both the generator's output and the shape persisted in step outputs.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pegs and moves
// ---------------------------------------------------------------------------

/// One of the three benchmark pegs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peg {
    A,
    B,
    C,
}

impl Peg {
    pub const ALL: [Peg; 3] = [Peg::A, Peg::B, Peg::C];

    /// Index into a three-element peg array.
    pub fn index(&self) -> usize {
        match self {
            Peg::A => 0,
            Peg::B => 1,
            Peg::C => 2,
        }
    }

    /// Key under which the peg's disc list is stored in workflow state.
    pub fn state_key(&self) -> &'static str {
        match self {
            Peg::A => "peg_A",
            Peg::B => "peg_B",
            Peg::C => "peg_C",
        }
    }
}

impl std::fmt::Display for Peg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Peg::A => "A",
            Peg::B => "B",
            Peg::C => "C",
        };
        f.write_str(s)
    }
}

/// A single disc move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HanoiMove {
    /// Disc size, 1 being the smallest.
    pub disc: u32,
    pub from: Peg,
    pub to: Peg,
}

impl std::fmt::Display for HanoiMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "disc {} {}->{}", self.disc, self.from, self.to)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one benchmark run at a fixed disc count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub workflow_id: String,
    pub disc_count: u32,
    pub total_steps: u64,
    pub completed_steps: u64,
    pub success: bool,
    pub duration_ms: u64,
    pub score: f64,
    pub completion_ratio: f64,
    pub steps_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a progressive run over increasing disc counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveReport {
    /// Largest disc count whose run fully completed (0 if none did).
    pub max_completed_discs: u32,
    /// One report per disc count attempted, in order.
    pub runs: Vec<BenchmarkReport>,
}

impl ProgressiveReport {
    /// Sum of scores across all attempted runs.
    pub fn total_score(&self) -> f64 {
        self.runs.iter().map(|r| r.score).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peg_keys_and_indices() {
        assert_eq!(Peg::A.state_key(), "peg_A");
        assert_eq!(Peg::C.state_key(), "peg_C");
        let indices: Vec<usize> = Peg::ALL.iter().map(Peg::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn move_display() {
        let mv = HanoiMove {
            disc: 1,
            from: Peg::A,
            to: Peg::C,
        };
        assert_eq!(mv.to_string(), "disc 1 A->C");
    }

    #[test]
    fn progressive_total_score() {
        let run = |score: f64| BenchmarkReport {
            workflow_id: "w".to_string(),
            disc_count: 1,
            total_steps: 1,
            completed_steps: 1,
            success: true,
            duration_ms: 1,
            score,
            completion_ratio: 1.0,
            steps_per_second: 1000.0,
            error: None,
        };
        let report = ProgressiveReport {
            max_completed_discs: 2,
            runs: vec![run(10.0), run(20.0)],
        };
        assert_eq!(report.total_score(), 30.0);
    }
}
