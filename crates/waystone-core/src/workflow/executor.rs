//! Workflow engine: sequential step execution with durable checkpointing.
//!
//! The `WorkflowEngine` runs a definition's steps in ascending step-number
//! order. Each step runs under bounded retry, then exactly one checkpoint is
//! written for the step's attempt group before the loop advances. A run can
//! be resumed from its latest checkpoint after a crash, a failure or a
//! cancellation.
//!
//! # Execution flow
//!
//! 1. Validate and register the definition, install a cancellation handle.
//! 2. Mark the id `Running` (a fresh span, even for a reused id).
//! 3. For each step at or after the resume cursor:
//!    status update -> approval gate -> retry loop -> checkpoint.
//! 4. On success merge `state_updates` and advance; on failure stop and mark
//!    `Failed`; on cancellation write a terminal checkpoint, mark `Cancelled`
//!    and return [`EngineError::Cancelled`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use waystone_types::config::EngineConfig;
use waystone_types::event::EngineEvent;
use waystone_types::workflow::{
    ExecutionCheckpoint, StateMap, WorkflowResult, WorkflowState, WorkflowStatus,
};

use crate::event::bus::EventBus;
use crate::repository::checkpoint::CheckpointStore;

use super::checkpoint::{CheckpointError, CheckpointManager, build_cancellation_checkpoint};
use super::definition::{
    WorkflowDefinition, WorkflowStepContext, WorkflowStepDefinition, WorkflowStepResult,
};
use super::gate::{GateDecision, StepGate};
use super::registry::WorkflowRegistry;
use super::retry::{AttemptOutcome, RetryPolicy, exhausted_result, run_attempt};

// ---------------------------------------------------------------------------
// WorkflowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for workflow execution engines.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods,
/// consistent with the project's Rust 2024 edition approach.
pub trait WorkflowExecutor: Send + Sync {
    /// Register a definition without running it, so its id can be resumed.
    fn register_definition(&self, definition: WorkflowDefinition) -> Result<(), EngineError>;

    /// Run a definition from its first step.
    fn execute_workflow(
        &self,
        definition: WorkflowDefinition,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<WorkflowResult, EngineError>> + Send;

    /// Resume a registered workflow id from its latest checkpoint.
    fn resume_workflow(
        &self,
        workflow_id: &str,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<WorkflowResult, EngineError>> + Send;

    /// Live status, or a synthesized `Pending` record for unknown ids.
    fn get_workflow_status(&self, workflow_id: &str) -> WorkflowStatus;

    /// Trigger the id's cancellation handle. Idempotent; no-op when absent.
    fn cancel_workflow(&self, workflow_id: &str);

    /// Checkpoint trail for an id, in write order.
    fn checkpoints(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionCheckpoint>, EngineError>> + Send;
}

// ---------------------------------------------------------------------------
// Resume cursor
// ---------------------------------------------------------------------------

/// Where and with what a resumed run re-enters the step loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    /// First step number to run. `u64` so a completed `u32::MAX` step can
    /// resume past the end.
    pub cursor: u64,
    pub state: StateMap,
    pub previous_output: Option<Value>,
}

/// Compute the resume point from the latest checkpoint.
///
/// A `Completed` checkpoint resumes at the next step with the post-step state
/// (pre-step snapshot plus the recorded updates) and the step's output. A
/// `Failed` checkpoint retries the same step from its pre-step state with no
/// previous output.
pub fn resume_point(checkpoint: &ExecutionCheckpoint) -> Result<ResumePoint, EngineError> {
    let mut state = checkpoint
        .decode_state()
        .map_err(|e| EngineError::Serialization(e.to_string()))?;

    if checkpoint.is_completed() {
        let updates = checkpoint
            .decode_state_updates()
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        state.extend(updates);
        let previous_output = checkpoint
            .decode_output()
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(ResumePoint {
            cursor: u64::from(checkpoint.step_number) + 1,
            state,
            previous_output,
        })
    } else {
        Ok(ResumePoint {
            cursor: u64::from(checkpoint.step_number),
            state,
            previous_output: None,
        })
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Durable sequential workflow engine.
///
/// Generic over `S: CheckpointStore` for storage flexibility.
pub struct WorkflowEngine<S: CheckpointStore> {
    checkpoint: Arc<CheckpointManager<S>>,
    registry: WorkflowRegistry,
    event_bus: EventBus,
    config: EngineConfig,
    gate: Option<Arc<dyn StepGate>>,
}

/// Mutable bookkeeping carried through one pass of the step loop.
struct RunState {
    /// Registry generation of this run's handle and status entry.
    generation: u64,
    state: StateMap,
    previous_output: Option<Value>,
    completed_steps: u32,
    checkpoints: Vec<ExecutionCheckpoint>,
    started: Instant,
}

/// Result of a step's retry loop.
enum StepOutcome {
    Finished { result: WorkflowStepResult, attempts: u32 },
    Cancelled,
}

/// Releases the run's cancellation handle when the run ends or is dropped.
struct HandleGuard<'a> {
    registry: &'a WorkflowRegistry,
    workflow_id: &'a str,
    generation: u64,
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        self.registry.release_handle(self.workflow_id, self.generation);
    }
}

impl<S: CheckpointStore + 'static> WorkflowEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            checkpoint: Arc::new(CheckpointManager::new(store)),
            registry: WorkflowRegistry::new(),
            event_bus: EventBus::new(config.event_capacity),
            config,
            gate: None,
        }
    }

    /// Consult `gate` before each step of workflows that are not pre-approved.
    pub fn with_gate(mut self, gate: Arc<dyn StepGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to engine lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_bus.subscribe()
    }

    pub fn checkpoint_manager(&self) -> &CheckpointManager<S> {
        &self.checkpoint
    }

    fn validate(definition: &WorkflowDefinition) -> Result<(), EngineError> {
        if definition.steps.is_empty() {
            return Err(EngineError::EmptyWorkflow(definition.id.clone()));
        }
        if let Some(step_number) = definition.duplicate_step() {
            return Err(EngineError::DuplicateStep {
                workflow_id: definition.id.clone(),
                step_number,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        cursor: u64,
        mut run: RunState,
        token: &CancellationToken,
    ) -> Result<WorkflowResult, EngineError> {
        let workflow_id = definition.id.as_str();
        let steps = definition
            .sorted_steps()
            .into_iter()
            .filter(|s| u64::from(s.step_number) >= cursor);

        for step in steps {
            if token.is_cancelled() {
                return self.finish_cancelled(workflow_id, step.step_number, run).await;
            }

            self.registry
                .set_current_step(workflow_id, run.generation, step.step_number, &step.name);
            tracing::debug!(workflow_id, step = step.step_number, name = %step.name, "running step");

            let step_started = Instant::now();
            let outcome = match self.check_gate(definition, step, &run, token).await {
                Some(outcome) => outcome,
                None => self.run_step_with_retry(definition, step, &run, token).await,
            };

            let (result, attempts) = match outcome {
                StepOutcome::Finished { result, attempts } => (result, attempts),
                StepOutcome::Cancelled => {
                    return self.finish_cancelled(workflow_id, step.step_number, run).await;
                }
            };

            let checkpoint = match self
                .checkpoint
                .checkpoint_step(
                    workflow_id,
                    step.step_number,
                    &step.name,
                    &run.state,
                    run.previous_output.as_ref(),
                    &result,
                    attempts,
                    step_started.elapsed(),
                )
                .await
            {
                Ok(cp) => cp,
                Err(e) => {
                    tracing::error!(
                        workflow_id,
                        step = step.step_number,
                        error = %e,
                        "checkpoint write failed"
                    );
                    self.registry.finish(workflow_id, run.generation, WorkflowState::Failed);
                    self.event_bus.publish(EngineEvent::WorkflowFailed {
                        workflow_id: workflow_id.to_string(),
                        step_number: step.step_number,
                        error: e.to_string(),
                    });
                    return Err(EngineError::Checkpoint(e));
                }
            };
            let step_duration_ms = checkpoint.duration_ms;
            run.checkpoints.push(checkpoint);

            if !result.success {
                let error = result
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Step '{}' failed", step.name));
                tracing::info!(
                    workflow_id,
                    step = step.step_number,
                    error = %error,
                    "workflow failed"
                );
                self.registry.finish(workflow_id, run.generation, WorkflowState::Failed);
                self.event_bus.publish(EngineEvent::WorkflowFailed {
                    workflow_id: workflow_id.to_string(),
                    step_number: step.step_number,
                    error: error.clone(),
                });
                return Ok(WorkflowResult {
                    workflow_id: workflow_id.to_string(),
                    success: false,
                    completed_steps: run.completed_steps,
                    failed_steps: 1,
                    final_output: result.output,
                    error: Some(error),
                    duration_ms: run.started.elapsed().as_millis() as u64,
                    checkpoints: run.checkpoints,
                });
            }

            run.state.extend(result.state_updates);
            run.previous_output = result.output;
            run.completed_steps = run.completed_steps.saturating_add(1);

            self.event_bus.publish(EngineEvent::StepCompleted {
                workflow_id: workflow_id.to_string(),
                step_number: step.step_number,
                step_name: step.name.clone(),
                attempts,
                duration_ms: step_duration_ms,
            });
        }

        let duration_ms = run.started.elapsed().as_millis() as u64;
        self.registry.finish(workflow_id, run.generation, WorkflowState::Completed);
        self.event_bus.publish(EngineEvent::WorkflowCompleted {
            workflow_id: workflow_id.to_string(),
            completed_steps: run.completed_steps,
            duration_ms,
        });
        tracing::info!(
            workflow_id,
            completed_steps = run.completed_steps,
            duration_ms,
            "workflow completed"
        );

        Ok(WorkflowResult {
            workflow_id: workflow_id.to_string(),
            success: true,
            completed_steps: run.completed_steps,
            failed_steps: 0,
            final_output: run.previous_output,
            error: None,
            duration_ms,
            checkpoints: run.checkpoints,
        })
    }

    /// Consult the approval gate. `None` means the step may run.
    async fn check_gate(
        &self,
        definition: &WorkflowDefinition,
        step: &WorkflowStepDefinition,
        run: &RunState,
        token: &CancellationToken,
    ) -> Option<StepOutcome> {
        if definition.pre_approved {
            return None;
        }
        let gate = self.gate.as_ref()?;
        let ctx = step_context(definition, step, run, 0);

        let decision = tokio::select! {
            biased;
            _ = token.cancelled() => return Some(StepOutcome::Cancelled),
            decision = gate.check(&ctx) => decision,
        };

        match decision {
            GateDecision::Allow => None,
            GateDecision::Deny(reason) => {
                tracing::warn!(
                    workflow_id = %definition.id,
                    step = step.step_number,
                    reason = %reason,
                    "step denied by approval gate"
                );
                self.event_bus.publish(EngineEvent::StepFailed {
                    workflow_id: definition.id.clone(),
                    step_number: step.step_number,
                    step_name: step.name.clone(),
                    error: reason.clone(),
                    will_retry: false,
                });
                Some(StepOutcome::Finished {
                    result: WorkflowStepResult::failure(format!(
                        "Step '{}' denied: {reason}",
                        step.name
                    )),
                    attempts: 0,
                })
            }
        }
    }

    /// Run one step through its bounded retry loop.
    async fn run_step_with_retry(
        &self,
        definition: &WorkflowDefinition,
        step: &WorkflowStepDefinition,
        run: &RunState,
        token: &CancellationToken,
    ) -> StepOutcome {
        let policy = RetryPolicy::for_workflow(definition, &self.config);
        let mut attempt = 0u32;

        loop {
            let ctx = step_context(definition, step, run, attempt);
            let (kind, message, result) =
                match run_attempt(&step.unit, ctx, token, definition.step_timeout).await {
                    AttemptOutcome::Success(result) => {
                        return StepOutcome::Finished {
                            result,
                            attempts: attempt.saturating_add(1),
                        };
                    }
                    AttemptOutcome::Cancelled => return StepOutcome::Cancelled,
                    AttemptOutcome::RetryableFailure {
                        kind,
                        message,
                        result,
                    } => (kind, message, result),
                };

            let will_retry = policy.should_retry(attempt);
            self.event_bus.publish(EngineEvent::StepFailed {
                workflow_id: definition.id.clone(),
                step_number: step.step_number,
                step_name: step.name.clone(),
                error: message.clone(),
                will_retry,
            });

            if !will_retry {
                let attempts = attempt.saturating_add(1);
                tracing::warn!(
                    workflow_id = %definition.id,
                    step = step.step_number,
                    attempts,
                    error = %message,
                    "step attempts exhausted"
                );
                return StepOutcome::Finished {
                    result: exhausted_result(
                        &step.name,
                        kind,
                        message,
                        result,
                        attempts,
                        definition.step_timeout,
                    ),
                    attempts,
                };
            }

            let delay = policy.backoff(attempt);
            tracing::warn!(
                workflow_id = %definition.id,
                step = step.step_number,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "step attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => return StepOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Write the terminal cancellation checkpoint and report cancellation.
    async fn finish_cancelled(
        &self,
        workflow_id: &str,
        step_number: u32,
        run: RunState,
    ) -> Result<WorkflowResult, EngineError> {
        match build_cancellation_checkpoint(
            workflow_id,
            step_number,
            &run.state,
            run.previous_output.as_ref(),
            run.started.elapsed(),
        ) {
            Ok(checkpoint) => {
                if let Err(e) = self.checkpoint.write_detached(checkpoint).await {
                    tracing::error!(
                        workflow_id,
                        step = step_number,
                        error = %e,
                        "failed to write cancellation checkpoint"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    workflow_id,
                    step = step_number,
                    error = %e,
                    "failed to build cancellation checkpoint"
                );
            }
        }

        self.registry.finish(workflow_id, run.generation, WorkflowState::Cancelled);
        self.event_bus.publish(EngineEvent::WorkflowCancelled {
            workflow_id: workflow_id.to_string(),
            step_number,
        });
        tracing::info!(workflow_id, step = step_number, "workflow cancelled");

        Err(EngineError::Cancelled {
            workflow_id: workflow_id.to_string(),
            step_number,
        })
    }

    /// Install a handle, mark the id running and drive the step loop.
    async fn start_run(
        &self,
        definition: &WorkflowDefinition,
        cursor: u64,
        state: StateMap,
        previous_output: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, EngineError> {
        let token = cancel.child_token();
        let handle = self.registry.install_handle(&definition.id, token.clone());
        let _guard = HandleGuard {
            registry: &self.registry,
            workflow_id: &definition.id,
            generation: handle.generation,
        };

        self.registry
            .start_run(&definition.id, handle.generation, definition.steps.len());

        let run = RunState {
            generation: handle.generation,
            state,
            previous_output,
            completed_steps: 0,
            checkpoints: Vec::new(),
            started: Instant::now(),
        };
        self.run_steps(definition, cursor, run, &token).await
    }
}

fn step_context(
    definition: &WorkflowDefinition,
    step: &WorkflowStepDefinition,
    run: &RunState,
    attempt: u32,
) -> WorkflowStepContext {
    WorkflowStepContext {
        workflow_id: definition.id.clone(),
        step_number: step.step_number,
        step_name: step.name.clone(),
        state: run.state.clone(),
        previous_output: run.previous_output.clone(),
        attempt,
    }
}

impl<S: CheckpointStore + 'static> WorkflowExecutor for WorkflowEngine<S> {
    fn register_definition(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        Self::validate(&definition)?;
        tracing::debug!(workflow_id = %definition.id, steps = definition.steps.len(), "registered definition");
        self.registry.register_definition(Arc::new(definition));
        Ok(())
    }

    async fn execute_workflow(
        &self,
        definition: WorkflowDefinition,
        cancel: CancellationToken,
    ) -> Result<WorkflowResult, EngineError> {
        Self::validate(&definition)?;
        let definition = Arc::new(definition);
        self.registry.register_definition(Arc::clone(&definition));

        tracing::info!(
            workflow_id = %definition.id,
            name = %definition.name,
            steps = definition.steps.len(),
            "starting workflow"
        );
        self.event_bus.publish(EngineEvent::WorkflowStarted {
            workflow_id: definition.id.clone(),
            workflow_name: definition.name.clone(),
            total_steps: definition.steps.len(),
        });

        self.start_run(
            &definition,
            0,
            definition.initial_state.clone(),
            None,
            &cancel,
        )
        .await
    }

    async fn resume_workflow(
        &self,
        workflow_id: &str,
        cancel: CancellationToken,
    ) -> Result<WorkflowResult, EngineError> {
        let definition = self
            .registry
            .definition(workflow_id)
            .ok_or_else(|| EngineError::DefinitionNotFound(workflow_id.to_string()))?;

        let latest = self
            .checkpoint
            .latest(workflow_id)
            .await?
            .ok_or_else(|| EngineError::NoCheckpoints(workflow_id.to_string()))?;

        let point = resume_point(&latest)?;
        if !latest.is_completed()
            && !definition
                .steps
                .iter()
                .any(|s| s.step_number == latest.step_number)
        {
            return Err(EngineError::InvalidResumePoint {
                workflow_id: workflow_id.to_string(),
                step_number: latest.step_number,
            });
        }

        let from_step = u32::try_from(point.cursor).unwrap_or(u32::MAX);
        tracing::info!(
            workflow_id,
            from_step,
            latest_status = latest.status.as_str(),
            "resuming workflow"
        );
        self.event_bus.publish(EngineEvent::WorkflowResumed {
            workflow_id: workflow_id.to_string(),
            from_step,
            total_steps: definition.steps.len(),
        });

        self.start_run(
            &definition,
            point.cursor,
            point.state,
            point.previous_output,
            &cancel,
        )
        .await
    }

    fn get_workflow_status(&self, workflow_id: &str) -> WorkflowStatus {
        self.registry.status(workflow_id)
    }

    fn cancel_workflow(&self, workflow_id: &str) {
        if self.registry.cancel(workflow_id) {
            tracing::info!(workflow_id, "cancellation requested");
        } else {
            tracing::debug!(workflow_id, "cancel requested for workflow with no active run");
        }
    }

    async fn checkpoints(&self, workflow_id: &str) -> Result<Vec<ExecutionCheckpoint>, EngineError> {
        Ok(self.checkpoint.all(workflow_id).await?)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors that can occur during workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The definition has no steps.
    #[error("workflow '{0}' has no steps")]
    EmptyWorkflow(String),

    /// Two steps share a step number.
    #[error("workflow '{workflow_id}' has duplicate step number {step_number}")]
    DuplicateStep { workflow_id: String, step_number: u32 },

    /// No definition registered for the id (resume).
    #[error("workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// Nothing durable to resume from.
    #[error("no checkpoints found for workflow: {0}")]
    NoCheckpoints(String),

    /// The latest checkpoint names a step the definition does not have.
    #[error("cannot resume workflow '{workflow_id}' at step {step_number}: step not in definition")]
    InvalidResumePoint { workflow_id: String, step_number: u32 },

    /// The run observed its cancellation signal.
    #[error("workflow '{workflow_id}' cancelled at step {step_number}")]
    Cancelled { workflow_id: String, step_number: u32 },

    /// Checkpoint persistence error.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A stored checkpoint could not be decoded.
    #[error("checkpoint decode error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
