//! Tower-of-Hanoi workflow construction.
//!
//! One step per move. Each step re-validates its move against the peg lists
//! held in workflow state, so a bad generator or a corrupted resume shows up
//! as a failed step instead of a silently wrong tower.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use waystone_types::benchmark::{HanoiMove, Peg};
use waystone_types::config::EngineConfig;
use waystone_types::workflow::StateMap;

use crate::workflow::definition::{
    BoxStepUnit, StepError, StepUnit, WorkflowDefinition, WorkflowStepContext,
    WorkflowStepDefinition, WorkflowStepResult,
};

use super::hanoi::validate_move;

/// State key holding the disc count.
pub const DISC_COUNT_KEY: &str = "disc_count";

/// Workflow id used for a given disc count.
pub fn workflow_id(disc_count: u32) -> String {
    format!("maker-hanoi-{disc_count}")
}

/// Initial state: every disc on peg A, bottom to top.
pub fn initial_state(disc_count: u32) -> StateMap {
    let mut state = StateMap::new();
    let tower: Vec<u32> = (1..=disc_count).rev().collect();
    state.insert(Peg::A.state_key().to_string(), json!(tower));
    state.insert(Peg::B.state_key().to_string(), json!([]));
    state.insert(Peg::C.state_key().to_string(), json!([]));
    state.insert(DISC_COUNT_KEY.to_string(), json!(disc_count));
    state
}

/// Build the pre-approved benchmark workflow for `moves`.
///
/// Steps are numbered from 1 in move order.
pub fn build_workflow(
    disc_count: u32,
    moves: &[HanoiMove],
    config: &EngineConfig,
) -> WorkflowDefinition {
    let steps = moves.iter().zip(1u32..).map(|(mv, step_number)| {
        WorkflowStepDefinition::new(
            step_number,
            format!("Move disc {} {}->{}", mv.disc, mv.from, mv.to),
            BoxStepUnit::new(HanoiMoveStep { mv: *mv }),
        )
    });

    WorkflowDefinition::builder(
        workflow_id(disc_count),
        format!("MAKER Tower of Hanoi ({disc_count} discs)"),
    )
    .with_config(config)
    .pre_approved(true)
    .initial_state(initial_state(disc_count))
    .steps(steps)
    .build()
}

/// Read a peg's disc list out of state.
pub fn read_peg(state: &StateMap, peg: Peg) -> Result<Vec<u32>, String> {
    let key = peg.state_key();
    let value = state
        .get(key)
        .ok_or_else(|| format!("state is missing '{key}'"))?;
    let discs = value
        .as_array()
        .ok_or_else(|| format!("'{key}' is not a list"))?;
    discs
        .iter()
        .map(|d| {
            d.as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| format!("'{key}' holds a non-disc value: {d}"))
        })
        .collect()
}

/// Step unit that applies a single move.
#[derive(Debug, Clone, Copy)]
pub struct HanoiMoveStep {
    pub mv: HanoiMove,
}

impl StepUnit for HanoiMoveStep {
    async fn run(
        &self,
        ctx: WorkflowStepContext,
        _token: CancellationToken,
    ) -> Result<WorkflowStepResult, StepError> {
        let mv = self.mv;
        let (mut source, mut target) =
            match (read_peg(&ctx.state, mv.from), read_peg(&ctx.state, mv.to)) {
                (Ok(s), Ok(t)) => (s, t),
                (Err(e), _) | (_, Err(e)) => {
                    return Ok(WorkflowStepResult::failure(format!(
                        "Step {}: {e}",
                        ctx.step_number
                    )));
                }
            };

        if let Err(e) = validate_move(&source, &target, &mv) {
            return Ok(WorkflowStepResult::failure(format!(
                "Step {}: {e}",
                ctx.step_number
            )));
        }

        source.pop();
        target.push(mv.disc);

        Ok(WorkflowStepResult::success(Some(json!({
            "step": ctx.step_number,
            "disc": mv.disc,
            "from": mv.from,
            "to": mv.to,
        })))
        .with_update(mv.from.state_key(), Value::from(source))
        .with_update(mv.to.state_key(), Value::from(target)))
    }
}
