//! In-memory registries keyed by workflow id.
//!
//! Three independent `DashMap`s hold live status, cancellation handles and
//! registered definitions. They never need joint atomicity, so there is no
//! lock spanning them. Guards returned by `DashMap` are never held across an
//! `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use waystone_types::workflow::{WorkflowState, WorkflowStatus};

use super::definition::WorkflowDefinition;

/// Cancellation handle installed for one run of a workflow id.
///
/// The generation distinguishes runs that reuse the same id, so a finishing
/// run only ever releases its own handle.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub generation: u64,
    pub token: CancellationToken,
}

/// Live status owned by the run that installed it.
#[derive(Debug, Clone)]
struct StatusEntry {
    generation: u64,
    status: WorkflowStatus,
}

/// Thread-safe registries for live workflow bookkeeping.
///
/// Status entries and handles share the run generation, so a run that
/// outlives a newer run of the same id can update neither.
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    statuses: DashMap<String, StatusEntry>,
    cancellations: DashMap<String, RunHandle>,
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
    next_generation: AtomicU64,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Definitions
    // -----------------------------------------------------------------------

    /// Register (or replace) the definition for its id.
    pub fn register_definition(&self, definition: Arc<WorkflowDefinition>) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn definition(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(workflow_id).map(|d| Arc::clone(d.value()))
    }

    // -----------------------------------------------------------------------
    // Cancellation handles
    // -----------------------------------------------------------------------

    /// Install a fresh handle for a run, replacing any prior one.
    ///
    /// The replaced handle is dropped without being cancelled: a run still
    /// holding it simply loses its registry entry.
    pub fn install_handle(&self, workflow_id: &str, token: CancellationToken) -> RunHandle {
        let handle = RunHandle {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            token,
        };
        if self
            .cancellations
            .insert(workflow_id.to_string(), handle.clone())
            .is_some()
        {
            tracing::debug!(workflow_id, "replaced cancellation handle of a previous run");
        }
        handle
    }

    /// Remove the handle for a run if it is still the installed one.
    pub fn release_handle(&self, workflow_id: &str, generation: u64) {
        self.cancellations
            .remove_if(workflow_id, |_, handle| handle.generation == generation);
    }

    /// Trigger the installed handle, if any. Returns whether one was found.
    pub fn cancel(&self, workflow_id: &str) -> bool {
        // Clone out of the guard before cancelling so waking tasks never
        // contend with a held shard lock.
        let token = self
            .cancellations
            .get(workflow_id)
            .map(|h| h.token.clone());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_handle(&self, workflow_id: &str) -> bool {
        self.cancellations.contains_key(workflow_id)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Start a fresh `Running` span for the id, owned by `generation`.
    pub fn start_run(&self, workflow_id: &str, generation: u64, total_steps: usize) {
        self.statuses.insert(
            workflow_id.to_string(),
            StatusEntry {
                generation,
                status: WorkflowStatus::running(workflow_id, total_steps),
            },
        );
    }

    /// Record the step currently executing. No-op for a superseded run.
    pub fn set_current_step(&self, workflow_id: &str, generation: u64, step_number: u32, step_name: &str) {
        if let Some(mut entry) = self.statuses.get_mut(workflow_id) {
            if entry.generation != generation {
                return;
            }
            entry.status.current_step = Some(step_number);
            entry.status.current_step_name = Some(step_name.to_string());
        }
    }

    /// Move the id to a terminal state and stamp its completion time.
    ///
    /// Returns false, leaving the status untouched, when a newer run owns it.
    pub fn finish(&self, workflow_id: &str, generation: u64, state: WorkflowState) -> bool {
        if !state.is_terminal() {
            tracing::debug!(workflow_id, ?state, "ignoring non-terminal finish");
            return false;
        }
        match self.statuses.get_mut(workflow_id) {
            Some(mut entry) if entry.generation == generation => {
                entry.status.state = state;
                entry.status.completed_at = Some(Utc::now());
                true
            }
            Some(_) => {
                tracing::debug!(workflow_id, generation, "superseded run left status untouched");
                false
            }
            None => false,
        }
    }

    /// Live status for the id, or a synthesized `Pending` record.
    pub fn status(&self, workflow_id: &str) -> WorkflowStatus {
        self.statuses
            .get(workflow_id)
            .map(|entry| entry.status.clone())
            .unwrap_or_else(|| WorkflowStatus::pending(workflow_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_is_pending() {
        let registry = WorkflowRegistry::new();
        let status = registry.status("missing");
        assert_eq!(status.state, WorkflowState::Pending);
        assert_eq!(status.workflow_id, "missing");
    }

    #[test]
    fn status_lifecycle() {
        let registry = WorkflowRegistry::new();
        registry.start_run("wf", 0, 3);
        registry.set_current_step("wf", 0, 2, "second");

        let status = registry.status("wf");
        assert_eq!(status.state, WorkflowState::Running);
        assert_eq!(status.total_steps, 3);
        assert_eq!(status.current_step, Some(2));
        assert_eq!(status.current_step_name.as_deref(), Some("second"));
        assert!(status.started_at.is_some());

        assert!(registry.finish("wf", 0, WorkflowState::Completed));
        let status = registry.status("wf");
        assert_eq!(status.state, WorkflowState::Completed);
        assert!(status.completed_at.is_some());
    }

    #[test]
    fn new_run_resets_terminal_status() {
        let registry = WorkflowRegistry::new();
        registry.start_run("wf", 0, 1);
        registry.finish("wf", 0, WorkflowState::Failed);
        registry.start_run("wf", 1, 1);
        let status = registry.status("wf");
        assert_eq!(status.state, WorkflowState::Running);
        assert!(status.completed_at.is_none());
    }

    #[test]
    fn superseded_run_cannot_touch_newer_status() {
        let registry = WorkflowRegistry::new();
        let older = registry.install_handle("wf", CancellationToken::new());
        registry.start_run("wf", older.generation, 2);
        let newer = registry.install_handle("wf", CancellationToken::new());
        registry.start_run("wf", newer.generation, 5);

        registry.set_current_step("wf", older.generation, 2, "old step");
        assert!(!registry.finish("wf", older.generation, WorkflowState::Completed));

        let status = registry.status("wf");
        assert_eq!(status.state, WorkflowState::Running);
        assert_eq!(status.total_steps, 5);
        assert_eq!(status.current_step, None);
        assert!(status.completed_at.is_none());

        assert!(!registry.finish("wf", newer.generation, WorkflowState::Running));
        assert!(registry.finish("wf", newer.generation, WorkflowState::Failed));
        assert_eq!(registry.status("wf").state, WorkflowState::Failed);
    }

    #[test]
    fn cancel_is_idempotent() {
        let registry = WorkflowRegistry::new();
        assert!(!registry.cancel("wf"));

        let handle = registry.install_handle("wf", CancellationToken::new());
        assert!(registry.cancel("wf"));
        assert!(registry.cancel("wf"));
        assert!(handle.token.is_cancelled());
    }

    #[test]
    fn stale_release_keeps_newer_handle() {
        let registry = WorkflowRegistry::new();
        let first = registry.install_handle("wf", CancellationToken::new());
        let second = registry.install_handle("wf", CancellationToken::new());
        assert_ne!(first.generation, second.generation);

        registry.release_handle("wf", first.generation);
        assert!(registry.has_handle("wf"));

        registry.cancel("wf");
        assert!(second.token.is_cancelled());
        assert!(!first.token.is_cancelled());

        registry.release_handle("wf", second.generation);
        assert!(!registry.has_handle("wf"));
    }

    #[test]
    fn definitions_are_replaced_by_id() {
        let registry = WorkflowRegistry::new();
        registry.register_definition(Arc::new(
            WorkflowDefinition::builder("wf", "first").build(),
        ));
        registry.register_definition(Arc::new(
            WorkflowDefinition::builder("wf", "second").build(),
        ));
        assert_eq!(registry.definition("wf").map(|d| d.name.clone()).as_deref(), Some("second"));
        assert!(registry.definition("other").is_none());
    }
}
