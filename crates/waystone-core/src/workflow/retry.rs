//! Retry policy and per-attempt outcome classification.
//!
//! Every attempt runs under two signals: the workflow-level cancellation
//! token and a step-level timeout derived fresh for the attempt. The outcome
//! of an attempt is reduced to a tagged [`AttemptOutcome`] so the retry loop
//! never has to inspect error identity:
//! - workflow cancellation always yields `Cancelled` and is never retried
//! - a step timeout, a reported failure or a raised fault are retryable

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use waystone_types::config::EngineConfig;

use super::definition::{BoxStepUnit, WorkflowDefinition, WorkflowStepContext, WorkflowStepResult};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry with exponential backoff: `base * 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Optional ceiling on a single delay. `None` leaves the formula uncapped.
    pub max_backoff: Option<Duration>,
}

impl RetryPolicy {
    /// Policy for a workflow: its retry ceiling plus the engine's backoff timing.
    pub fn for_workflow(definition: &WorkflowDefinition, config: &EngineConfig) -> Self {
        Self {
            max_retries: definition.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            max_backoff: config.max_backoff_ms.map(Duration::from_millis),
        }
    }

    /// Whether another attempt may follow the zero-based `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(0);
        let delay = if factor == 0 {
            Duration::MAX
        } else {
            self.backoff_base.saturating_mul(factor)
        };
        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

// ---------------------------------------------------------------------------
// AttemptOutcome
// ---------------------------------------------------------------------------

/// Why an attempt failed in a way that may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The unit returned `success = false`.
    Reported,
    /// The step-level timeout fired.
    TimedOut,
    /// The unit raised a fault.
    Fault,
}

/// Tagged outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(WorkflowStepResult),
    RetryableFailure {
        kind: FailureKind,
        message: String,
        /// The unit's own result for `Reported` failures.
        result: Option<WorkflowStepResult>,
    },
    /// The workflow-level signal fired. Never retried.
    Cancelled,
}

/// Run one attempt of a step unit under the workflow token and a fresh timeout.
///
/// The unit receives a child of `workflow_token`, cancelled when the timeout
/// elapses, so it can observe either signal. Workflow cancellation wins when
/// both could apply.
pub async fn run_attempt(
    unit: &BoxStepUnit,
    ctx: WorkflowStepContext,
    workflow_token: &CancellationToken,
    step_timeout: Duration,
) -> AttemptOutcome {
    if workflow_token.is_cancelled() {
        return AttemptOutcome::Cancelled;
    }

    let step_token = workflow_token.child_token();
    let attempt = tokio::time::timeout(step_timeout, unit.run(ctx, step_token.clone()));

    tokio::select! {
        biased;
        _ = workflow_token.cancelled() => AttemptOutcome::Cancelled,
        result = attempt => match result {
            Ok(Ok(step_result)) if step_result.success => AttemptOutcome::Success(step_result),
            Ok(Ok(step_result)) => AttemptOutcome::RetryableFailure {
                kind: FailureKind::Reported,
                message: step_result
                    .error
                    .clone()
                    .unwrap_or_else(|| "step reported failure".to_string()),
                result: Some(step_result),
            },
            Ok(Err(fault)) => {
                if workflow_token.is_cancelled() {
                    AttemptOutcome::Cancelled
                } else {
                    AttemptOutcome::RetryableFailure {
                        kind: FailureKind::Fault,
                        message: fault.to_string(),
                        result: None,
                    }
                }
            }
            Err(_elapsed) => {
                step_token.cancel();
                if workflow_token.is_cancelled() {
                    AttemptOutcome::Cancelled
                } else {
                    AttemptOutcome::RetryableFailure {
                        kind: FailureKind::TimedOut,
                        message: format!("step timed out after {}ms", step_timeout.as_millis()),
                        result: None,
                    }
                }
            }
        },
    }
}

/// Final failure result once attempts are exhausted.
pub fn exhausted_result(
    step_name: &str,
    kind: FailureKind,
    message: String,
    result: Option<WorkflowStepResult>,
    attempts: u32,
    step_timeout: Duration,
) -> WorkflowStepResult {
    match (kind, result) {
        (FailureKind::Reported, Some(result)) => result,
        (FailureKind::TimedOut, _) => WorkflowStepResult::failure(format!(
            "Step '{step_name}' timed out after {}ms ({attempts} attempts)",
            step_timeout.as_millis()
        )),
        (_, _) => WorkflowStepResult::failure(format!(
            "Step '{step_name}' failed after {attempts} attempts: {message}"
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::{StepError, step_fn};
    use serde_json::json;
    use waystone_types::workflow::StateMap;

    fn ctx() -> WorkflowStepContext {
        WorkflowStepContext {
            workflow_id: "wf".to_string(),
            step_number: 1,
            step_name: "step".to_string(),
            state: StateMap::new(),
            previous_output: None,
            attempt: 0,
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(100),
            max_backoff: None,
        }
    }

    // -------------------------------------------------------------------
    // RetryPolicy
    // -------------------------------------------------------------------

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
        assert_eq!(p.backoff(5), Duration::from_millis(3200));
    }

    #[test]
    fn backoff_respects_cap() {
        let p = RetryPolicy {
            max_backoff: Some(Duration::from_millis(250)),
            ..policy(5)
        };
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(250));
    }

    #[test]
    fn backoff_saturates_on_huge_attempts() {
        let p = policy(100);
        assert_eq!(p.backoff(40), Duration::MAX);
    }

    #[test]
    fn max_retries_means_one_more_attempt() {
        let p = policy(2);
        assert!(p.should_retry(0));
        assert!(p.should_retry(1));
        assert!(!p.should_retry(2));

        let none = policy(0);
        assert!(!none.should_retry(0));
    }

    #[test]
    fn policy_from_workflow_and_config() {
        let def = WorkflowDefinition::builder("wf", "t").max_retries(4).build();
        let config = EngineConfig {
            backoff_base_ms: 5,
            max_backoff_ms: Some(50),
            ..EngineConfig::default()
        };
        let p = RetryPolicy::for_workflow(&def, &config);
        assert_eq!(p.max_retries, 4);
        assert_eq!(p.backoff_base, Duration::from_millis(5));
        assert_eq!(p.max_backoff, Some(Duration::from_millis(50)));
    }

    // -------------------------------------------------------------------
    // run_attempt
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn success_is_classified() {
        let unit = step_fn(|_c, _t| async { Ok(WorkflowStepResult::success(Some(json!(1)))) });
        let outcome = run_attempt(&unit, ctx(), &CancellationToken::new(), Duration::from_secs(1)).await;
        assert!(matches!(outcome, AttemptOutcome::Success(r) if r.output == Some(json!(1))));
    }

    #[tokio::test]
    async fn reported_failure_is_retryable() {
        let unit = step_fn(|_c, _t| async { Ok(WorkflowStepResult::failure("bad input")) });
        let outcome = run_attempt(&unit, ctx(), &CancellationToken::new(), Duration::from_secs(1)).await;
        match outcome {
            AttemptOutcome::RetryableFailure { kind, message, result } => {
                assert_eq!(kind, FailureKind::Reported);
                assert_eq!(message, "bad input");
                assert!(result.is_some());
            }
            other => panic!("expected retryable failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fault_is_retryable() {
        let unit = step_fn(|_c, _t| async { Err(StepError::Failed("disk full".to_string())) });
        let outcome = run_attempt(&unit, ctx(), &CancellationToken::new(), Duration::from_secs(1)).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::RetryableFailure { kind: FailureKind::Fault, ref message, .. } if message == "disk full"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_retryable() {
        let unit = step_fn(|_c, _t| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(WorkflowStepResult::success(None))
        });
        let outcome = run_attempt(
            &unit,
            ctx(),
            &CancellationToken::new(),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(
            outcome,
            AttemptOutcome::RetryableFailure { kind: FailureKind::TimedOut, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn workflow_cancellation_wins() {
        let workflow_token = CancellationToken::new();
        let trigger = workflow_token.clone();
        let unit = step_fn(move |_c, token: CancellationToken| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                token.cancelled().await;
                Err(StepError::Cancelled)
            }
        });
        let outcome = run_attempt(&unit, ctx(), &workflow_token, Duration::from_secs(10)).await;
        assert_eq!(outcome, AttemptOutcome::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_unit() {
        let token = CancellationToken::new();
        token.cancel();
        let unit = step_fn(|_c, _t| async {
            Err(StepError::Failed("unit must not run".to_string()))
        });
        let outcome = run_attempt(&unit, ctx(), &token, Duration::from_secs(1)).await;
        assert_eq!(outcome, AttemptOutcome::Cancelled);
    }

    // -------------------------------------------------------------------
    // exhausted_result
    // -------------------------------------------------------------------

    #[test]
    fn exhausted_messages() {
        let timeout = exhausted_result(
            "slow",
            FailureKind::TimedOut,
            String::new(),
            None,
            3,
            Duration::from_millis(500),
        );
        assert!(!timeout.success);
        assert!(timeout.error.as_deref().unwrap().contains("timed out after 500ms"));

        let fault = exhausted_result(
            "io",
            FailureKind::Fault,
            "disk full".to_string(),
            None,
            2,
            Duration::from_secs(1),
        );
        let msg = fault.error.unwrap();
        assert!(msg.contains("failed after 2 attempts"));
        assert!(msg.contains("disk full"));

        let reported = exhausted_result(
            "r",
            FailureKind::Reported,
            "x".to_string(),
            Some(WorkflowStepResult::failure("own message")),
            1,
            Duration::from_secs(1),
        );
        assert_eq!(reported.error.as_deref(), Some("own message"));
    }
}
