//! Benchmark scoring.

use std::time::Duration;

/// Score breakdown for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkScore {
    pub score: f64,
    pub completion_ratio: f64,
    pub steps_per_second: f64,
}

/// Score a run.
///
/// `completion_ratio * 100`, at least 100 on full success, scaled by
/// `log2(total_steps + 1) / 10` so larger problems earn more for the same
/// ratio.
pub fn score(total_steps: u64, completed_steps: u64, success: bool, duration: Duration) -> BenchmarkScore {
    if total_steps == 0 {
        return BenchmarkScore {
            score: 0.0,
            completion_ratio: 0.0,
            steps_per_second: 0.0,
        };
    }

    let completion_ratio = (completed_steps as f64 / total_steps as f64).min(1.0);
    let mut base = completion_ratio * 100.0;
    if success {
        base = base.max(100.0);
    }
    let difficulty = (total_steps as f64 + 1.0).log2() / 10.0;

    let secs = duration.as_secs_f64();
    let steps_per_second = if secs > 0.0 {
        completed_steps as f64 / secs
    } else {
        0.0
    };

    BenchmarkScore {
        score: base * difficulty,
        completion_ratio,
        steps_per_second,
    }
}
