//! Engine lifecycle events.

use serde::{Deserialize, Serialize};

/// Events emitted while the engine drives a workflow.
///
/// Published on the engine's event bus for progress reporting. Publishing is
/// fire-and-forget; the checkpoint trail remains the durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A fresh run of a workflow has started.
    WorkflowStarted {
        workflow_id: String,
        workflow_name: String,
        total_steps: usize,
    },

    /// A run has re-entered the step loop from a checkpoint.
    WorkflowResumed {
        workflow_id: String,
        from_step: u32,
        total_steps: usize,
    },

    /// A step finished successfully and its checkpoint was written.
    StepCompleted {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        attempts: u32,
        duration_ms: u64,
    },

    /// A step attempt failed.
    StepFailed {
        workflow_id: String,
        step_number: u32,
        step_name: String,
        error: String,
        will_retry: bool,
    },

    /// Every step of the run succeeded.
    WorkflowCompleted {
        workflow_id: String,
        completed_steps: u32,
        duration_ms: u64,
    },

    /// The run stopped at a failing step.
    WorkflowFailed {
        workflow_id: String,
        step_number: u32,
        error: String,
    },

    /// The run observed its cancellation signal.
    WorkflowCancelled { workflow_id: String, step_number: u32 },
}

impl EngineEvent {
    /// The workflow id every variant carries.
    pub fn workflow_id(&self) -> &str {
        match self {
            EngineEvent::WorkflowStarted { workflow_id, .. }
            | EngineEvent::WorkflowResumed { workflow_id, .. }
            | EngineEvent::StepCompleted { workflow_id, .. }
            | EngineEvent::StepFailed { workflow_id, .. }
            | EngineEvent::WorkflowCompleted { workflow_id, .. }
            | EngineEvent::WorkflowFailed { workflow_id, .. }
            | EngineEvent::WorkflowCancelled { workflow_id, .. } => workflow_id,
        }
    }
}
