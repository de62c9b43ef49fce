//! Workflow definitions and the step unit capability.
//!
//! A workflow is an ordered list of numbered steps, each carrying a
//! caller-supplied unit of work. Step units follow the same object-safety
//! pattern used for other async capabilities in the codebase:
//! 1. `StepUnit` uses RPITIT for ergonomic implementations
//! 2. `StepUnitDyn` is its object-safe twin with boxed futures
//! 3. `BoxStepUnit` wraps `Arc<dyn StepUnitDyn>` and delegates
//!
//! Plain async closures are adapted through [`step_fn`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use waystone_types::config::EngineConfig;
use waystone_types::workflow::StateMap;

// ---------------------------------------------------------------------------
// Step context and result
// ---------------------------------------------------------------------------

/// Input handed to a step unit for one attempt.
///
/// `state` is a copy of the engine's running state; mutations made to it are
/// discarded. Steps communicate changes through
/// [`WorkflowStepResult::state_updates`].
#[derive(Debug, Clone)]
pub struct WorkflowStepContext {
    pub workflow_id: String,
    pub step_number: u32,
    pub step_name: String,
    pub state: StateMap,
    pub previous_output: Option<Value>,
    /// Zero-based attempt index within the step's retry loop.
    pub attempt: u32,
}

/// Output of a step unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowStepResult {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Changed keys only. Merged into workflow state on success, never on failure.
    pub state_updates: StateMap,
}

impl WorkflowStepResult {
    /// A successful result carrying `output`.
    pub fn success(output: Option<Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            state_updates: StateMap::new(),
        }
    }

    /// A structured failure carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            state_updates: StateMap::new(),
        }
    }

    /// Add a state update (builder style).
    pub fn with_update(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state_updates.insert(key.into(), value);
        self
    }
}

/// A fault raised by a step unit instead of returning a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    /// The step could not complete its work.
    #[error("{0}")]
    Failed(String),

    /// The step observed its cancellation token and gave up.
    #[error("step cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// StepUnit
// ---------------------------------------------------------------------------

/// A caller-supplied unit of work invoked once per attempt.
///
/// The token fires when the step's timeout elapses or when the workflow is
/// cancelled. Implementations must not retain the context's state beyond the
/// call.
pub trait StepUnit: Send + Sync {
    fn run(
        &self,
        ctx: WorkflowStepContext,
        token: CancellationToken,
    ) -> impl Future<Output = Result<WorkflowStepResult, StepError>> + Send;
}

/// Object-safe version of [`StepUnit`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `StepUnit`.
pub trait StepUnitDyn: Send + Sync {
    fn run_boxed<'a>(
        &'a self,
        ctx: WorkflowStepContext,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<WorkflowStepResult, StepError>> + Send + 'a>>;
}

impl<T: StepUnit> StepUnitDyn for T {
    fn run_boxed<'a>(
        &'a self,
        ctx: WorkflowStepContext,
        token: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<WorkflowStepResult, StepError>> + Send + 'a>> {
        Box::pin(self.run(ctx, token))
    }
}

/// Type-erased, cheaply clonable step unit.
#[derive(Clone)]
pub struct BoxStepUnit {
    inner: Arc<dyn StepUnitDyn>,
}

impl BoxStepUnit {
    /// Wrap a concrete `StepUnit` in a type-erased box.
    pub fn new<T: StepUnit + 'static>(unit: T) -> Self {
        Self {
            inner: Arc::new(unit),
        }
    }

    pub async fn run(
        &self,
        ctx: WorkflowStepContext,
        token: CancellationToken,
    ) -> Result<WorkflowStepResult, StepError> {
        self.inner.run_boxed(ctx, token).await
    }
}

impl std::fmt::Debug for BoxStepUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BoxStepUnit")
    }
}

/// Adapter turning an async closure into a [`StepUnit`].
pub struct FnStep<F>(F);

impl<F, Fut> StepUnit for FnStep<F>
where
    F: Fn(WorkflowStepContext, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<WorkflowStepResult, StepError>> + Send,
{
    fn run(
        &self,
        ctx: WorkflowStepContext,
        token: CancellationToken,
    ) -> impl Future<Output = Result<WorkflowStepResult, StepError>> + Send {
        (self.0)(ctx, token)
    }
}

/// Build a [`BoxStepUnit`] from an async closure.
pub fn step_fn<F, Fut>(f: F) -> BoxStepUnit
where
    F: Fn(WorkflowStepContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkflowStepResult, StepError>> + Send + 'static,
{
    BoxStepUnit::new(FnStep(f))
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A single numbered step. Identity is the step number.
#[derive(Debug, Clone)]
pub struct WorkflowStepDefinition {
    pub step_number: u32,
    pub name: String,
    pub unit: BoxStepUnit,
}

impl WorkflowStepDefinition {
    pub fn new(step_number: u32, name: impl Into<String>, unit: BoxStepUnit) -> Self {
        Self {
            step_number,
            name: name.into(),
            unit,
        }
    }
}

impl PartialEq for WorkflowStepDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.step_number == other.step_number
    }
}

impl Eq for WorkflowStepDefinition {}

/// A linear workflow. Immutable once handed to the engine.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    /// Steps in any order; the engine runs them by ascending step number.
    pub steps: Vec<WorkflowStepDefinition>,
    /// Skip the engine's approval gate for every step.
    pub pre_approved: bool,
    /// Retries after the first attempt, so `max_retries + 1` attempts in total.
    pub max_retries: u32,
    pub step_timeout: Duration,
    pub initial_state: StateMap,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> WorkflowDefinitionBuilder {
        WorkflowDefinitionBuilder::new(id.into(), name.into())
    }

    /// Steps sorted by ascending step number.
    pub fn sorted_steps(&self) -> Vec<&WorkflowStepDefinition> {
        let mut steps: Vec<&WorkflowStepDefinition> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }

    /// First step number that appears more than once, if any.
    pub fn duplicate_step(&self) -> Option<u32> {
        let sorted = self.sorted_steps();
        sorted
            .windows(2)
            .find(|pair| pair[0].step_number == pair[1].step_number)
            .map(|pair| pair[0].step_number)
    }
}

/// Builder for [`WorkflowDefinition`].
pub struct WorkflowDefinitionBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowDefinitionBuilder {
    fn new(id: String, name: String) -> Self {
        let defaults = EngineConfig::default();
        Self {
            definition: WorkflowDefinition {
                id,
                name,
                steps: Vec::new(),
                pre_approved: false,
                max_retries: defaults.default_max_retries,
                step_timeout: defaults.step_timeout(),
                initial_state: StateMap::new(),
            },
        }
    }

    /// Take retry and timeout defaults from an engine configuration.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.definition.max_retries = config.default_max_retries;
        self.definition.step_timeout = config.step_timeout();
        self
    }

    pub fn step(mut self, step_number: u32, name: impl Into<String>, unit: BoxStepUnit) -> Self {
        self.definition
            .steps
            .push(WorkflowStepDefinition::new(step_number, name, unit));
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = WorkflowStepDefinition>) -> Self {
        self.definition.steps.extend(steps);
        self
    }

    pub fn pre_approved(mut self, pre_approved: bool) -> Self {
        self.definition.pre_approved = pre_approved;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.definition.max_retries = max_retries;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.definition.step_timeout = timeout;
        self
    }

    pub fn initial_state(mut self, state: StateMap) -> Self {
        self.definition.initial_state = state;
        self
    }

    pub fn state(mut self, key: impl Into<String>, value: Value) -> Self {
        self.definition.initial_state.insert(key.into(), value);
        self
    }

    pub fn build(self) -> WorkflowDefinition {
        self.definition
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> BoxStepUnit {
        step_fn(|_ctx, _token| async { Ok(WorkflowStepResult::success(None)) })
    }

    #[test]
    fn builder_applies_defaults() {
        let def = WorkflowDefinition::builder("wf", "Test").build();
        assert_eq!(def.max_retries, 3);
        assert_eq!(def.step_timeout, Duration::from_secs(30));
        assert!(!def.pre_approved);
        assert!(def.steps.is_empty());
    }

    #[test]
    fn builder_with_config_overrides_defaults() {
        let config = EngineConfig {
            default_max_retries: 7,
            default_step_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let def = WorkflowDefinition::builder("wf", "Test")
            .with_config(&config)
            .state("counter", json!(0))
            .build();
        assert_eq!(def.max_retries, 7);
        assert_eq!(def.step_timeout, Duration::from_secs(2));
        assert_eq!(def.initial_state["counter"], json!(0));
    }

    #[test]
    fn sorted_steps_orders_by_number() {
        let def = WorkflowDefinition::builder("wf", "Test")
            .step(30, "third", noop())
            .step(10, "first", noop())
            .step(20, "second", noop())
            .build();
        let names: Vec<&str> = def.sorted_steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(def.duplicate_step(), None);
    }

    #[test]
    fn duplicate_step_numbers_detected() {
        let def = WorkflowDefinition::builder("wf", "Test")
            .step(1, "a", noop())
            .step(2, "b", noop())
            .step(1, "c", noop())
            .build();
        assert_eq!(def.duplicate_step(), Some(1));
    }

    #[test]
    fn step_identity_is_step_number() {
        let a = WorkflowStepDefinition::new(4, "a", noop());
        let b = WorkflowStepDefinition::new(4, "b", noop());
        let c = WorkflowStepDefinition::new(5, "a", noop());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn result_builders() {
        let ok = WorkflowStepResult::success(Some(json!(1))).with_update("k", json!("v"));
        assert!(ok.success);
        assert_eq!(ok.state_updates["k"], json!("v"));

        let failed = WorkflowStepResult::failure("boom");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn step_fn_receives_context() {
        let unit = step_fn(|ctx, _token| async move {
            let seen = ctx.state.get("x").cloned().unwrap_or(Value::Null);
            Ok(WorkflowStepResult::success(Some(json!({
                "step": ctx.step_number,
                "seen": seen,
            }))))
        });
        let mut state = StateMap::new();
        state.insert("x".to_string(), json!(42));
        let ctx = WorkflowStepContext {
            workflow_id: "wf".to_string(),
            step_number: 9,
            step_name: "inspect".to_string(),
            state,
            previous_output: None,
            attempt: 0,
        };
        let result = unit.run(ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(result.output, Some(json!({"step": 9, "seen": 42})));
    }
}
