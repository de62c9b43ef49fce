//! Workflow execution types for Waystone.
//!
//! Defines the durable checkpoint record, the live in-memory status view and
//! the terminal result returned to callers. Step definitions themselves live
//! in `waystone-core` because they carry executable step units.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Accumulated workflow state: arbitrary JSON values keyed by name.
pub type StateMap = HashMap<String, Value>;

/// Step name recorded on the synthetic checkpoint written when a run is cancelled.
pub const CANCELLED_STEP_NAME: &str = "Cancelled";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow instance.
///
/// `Pending -> Running -> {Completed | Failed | Cancelled}`. `Suspended` is
/// reserved for a run that is parked between executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Suspended,
}

impl WorkflowState {
    /// Whether the state ends a run. A new run for the same id starts a fresh
    /// `Running` span rather than reopening a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed
                | WorkflowState::Failed
                | WorkflowState::Cancelled
                | WorkflowState::Suspended
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowState::Pending => "pending",
            WorkflowState::Running => "running",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
            WorkflowState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Outcome recorded on a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Completed,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Completed => "completed",
            CheckpointStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(CheckpointStatus::Completed),
            "failed" => Ok(CheckpointStatus::Failed),
            other => Err(format!("invalid checkpoint status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionCheckpoint
// ---------------------------------------------------------------------------

/// Durable record of one step's attempt group.
///
/// Written once per step after its retry loop concludes, never mutated
/// afterwards. State, input, output and state updates are stored as JSON
/// text so the store can treat them as opaque blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCheckpoint {
    /// UUIDv7 checkpoint ID (time-sortable).
    pub id: Uuid,
    /// Workflow instance this checkpoint belongs to.
    pub workflow_id: String,
    /// Step number the checkpoint describes.
    pub step_number: u32,
    /// Step name (or [`CANCELLED_STEP_NAME`] for the cancellation marker).
    pub step_name: String,
    /// Whether the step group succeeded.
    pub status: CheckpointStatus,
    /// Full workflow state *before* the step's updates were merged.
    pub state: String,
    /// Output of the previous step, `null` when there was none.
    pub input: String,
    /// Output of this step, empty when it produced none.
    pub output: String,
    /// Partial state update produced by the step, empty when it failed.
    #[serde(default)]
    pub state_updates: String,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of attempts the step group used.
    #[serde(default)]
    pub attempts: u32,
    /// Wall-clock duration of the step group in milliseconds.
    pub duration_ms: u64,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

impl ExecutionCheckpoint {
    pub fn is_completed(&self) -> bool {
        self.status == CheckpointStatus::Completed
    }

    /// Whether this is the synthetic marker written on cancellation.
    pub fn is_cancellation(&self) -> bool {
        self.step_name == CANCELLED_STEP_NAME
    }

    /// Decode the pre-step state snapshot.
    pub fn decode_state(&self) -> Result<StateMap, serde_json::Error> {
        if self.state.is_empty() {
            return Ok(StateMap::new());
        }
        serde_json::from_str(&self.state)
    }

    /// Decode the step's output, `None` when empty or `null`.
    pub fn decode_output(&self) -> Result<Option<Value>, serde_json::Error> {
        decode_optional(&self.output)
    }

    /// Decode the previous output the step was given.
    pub fn decode_input(&self) -> Result<Option<Value>, serde_json::Error> {
        decode_optional(&self.input)
    }

    /// Decode the partial state update the step produced.
    pub fn decode_state_updates(&self) -> Result<StateMap, serde_json::Error> {
        if self.state_updates.is_empty() {
            return Ok(StateMap::new());
        }
        serde_json::from_str(&self.state_updates)
    }
}

fn decode_optional(raw: &str) -> Result<Option<Value>, serde_json::Error> {
    if raw.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Null => Ok(None),
        v => Ok(Some(v)),
    }
}

// ---------------------------------------------------------------------------
// WorkflowStatus
// ---------------------------------------------------------------------------

/// Live, in-memory view of a workflow instance. Not durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: String,
    pub state: WorkflowState,
    /// Number of steps in the definition.
    pub total_steps: usize,
    /// Step number currently (or last) executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStatus {
    /// Synthesized record for an id the engine has never seen.
    pub fn pending(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            state: WorkflowState::Pending,
            total_steps: 0,
            current_step: None,
            current_step_name: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Fresh `Running` record for a run that is starting now.
    pub fn running(workflow_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            state: WorkflowState::Running,
            total_steps,
            current_step: None,
            current_step_name: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowResult
// ---------------------------------------------------------------------------

/// Terminal summary of one run, returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub success: bool,
    pub completed_steps: u32,
    pub failed_steps: u32,
    /// Output of the last step that ran successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Checkpoints written during this run, in write order.
    pub checkpoints: Vec<ExecutionCheckpoint>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
