//! Benchmark harness driving Hanoi workflows through a `WorkflowExecutor`.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use waystone_types::benchmark::{BenchmarkReport, ProgressiveReport};
use waystone_types::config::EngineConfig;
use waystone_types::workflow::WorkflowResult;

use crate::workflow::executor::{EngineError, WorkflowExecutor};

use super::hanoi::{expected_move_count, generate_move_sequence};
use super::score::score;
use super::workflow::{build_workflow, workflow_id};

/// Largest accepted disc count (about a billion steps).
pub const MAX_DISC_COUNT: u32 = 30;

/// Runs the Tower-of-Hanoi benchmark against an engine.
pub struct BenchmarkHarness<E: WorkflowExecutor> {
    engine: Arc<E>,
    config: EngineConfig,
}

impl<E: WorkflowExecutor> BenchmarkHarness<E> {
    pub fn new(engine: Arc<E>, config: EngineConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Run the benchmark for `disc_count` discs from the first move.
    pub async fn run(
        &self,
        disc_count: u32,
        cancel: CancellationToken,
    ) -> Result<BenchmarkReport, BenchmarkError> {
        check_disc_count(disc_count)?;
        let moves = generate_move_sequence(disc_count);
        let definition = build_workflow(disc_count, &moves, &self.config);
        drop(moves);

        tracing::info!(disc_count, steps = definition.steps.len(), "starting benchmark run");
        let started = Instant::now();
        let result = self.engine.execute_workflow(definition, cancel).await?;
        Ok(report(disc_count, &result, started))
    }

    /// Resume the benchmark workflow for `disc_count` from its checkpoints.
    ///
    /// The definition is rebuilt deterministically and registered first, so
    /// this works in a fresh process.
    pub async fn resume(
        &self,
        disc_count: u32,
        cancel: CancellationToken,
    ) -> Result<BenchmarkReport, BenchmarkError> {
        check_disc_count(disc_count)?;
        let moves = generate_move_sequence(disc_count);
        self.engine
            .register_definition(build_workflow(disc_count, &moves, &self.config))?;
        drop(moves);

        tracing::info!(disc_count, "resuming benchmark run");
        let started = Instant::now();
        let result = self
            .engine
            .resume_workflow(&workflow_id(disc_count), cancel)
            .await?;
        Ok(report(disc_count, &result, started))
    }

    /// Run increasing disc counts until the first failure.
    pub async fn run_progressive(
        &self,
        max_disc_count: u32,
        cancel: CancellationToken,
    ) -> Result<ProgressiveReport, BenchmarkError> {
        check_disc_count(max_disc_count)?;
        let mut progressive = ProgressiveReport {
            max_completed_discs: 0,
            runs: Vec::new(),
        };

        for disc_count in 1..=max_disc_count {
            let run = self.run(disc_count, cancel.clone()).await?;
            let success = run.success;
            progressive.runs.push(run);
            if !success {
                tracing::info!(disc_count, "progressive benchmark stopped at first failure");
                break;
            }
            progressive.max_completed_discs = disc_count;
        }

        tracing::info!(
            max_completed_discs = progressive.max_completed_discs,
            total_score = progressive.total_score(),
            "progressive benchmark finished"
        );
        Ok(progressive)
    }
}

fn check_disc_count(disc_count: u32) -> Result<(), BenchmarkError> {
    if disc_count == 0 || disc_count > MAX_DISC_COUNT {
        return Err(BenchmarkError::InvalidDiscCount {
            disc_count,
            max: MAX_DISC_COUNT,
        });
    }
    Ok(())
}

/// Build a report from a run's result.
///
/// Steps are numbered 1..=N in order, so a failure at step `k` means `k - 1`
/// moves are durably complete, whichever run completed them.
fn report(disc_count: u32, result: &WorkflowResult, started: Instant) -> BenchmarkReport {
    let total_steps = expected_move_count(disc_count);
    let completed_steps = if result.success {
        total_steps
    } else {
        result
            .checkpoints
            .last()
            .map(|cp| u64::from(cp.step_number).saturating_sub(1))
            .unwrap_or(0)
    };
    let duration = started.elapsed();
    let s = score(total_steps, completed_steps, result.success, duration);

    BenchmarkReport {
        workflow_id: result.workflow_id.clone(),
        disc_count,
        total_steps,
        completed_steps,
        success: result.success,
        duration_ms: duration.as_millis() as u64,
        score: s.score,
        completion_ratio: s.completion_ratio,
        steps_per_second: s.steps_per_second,
        error: result.error.clone(),
    }
}

/// Errors from the benchmark harness.
#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    #[error("disc count {disc_count} out of range (1..={max})")]
    InvalidDiscCount { disc_count: u32, max: u32 },

    #[error(transparent)]
    Engine(#[from] EngineError),
}
