//! Approval gate consulted before steps of workflows that are not pre-approved.
//!
//! The engine never decides approval itself; the surrounding application
//! plugs its governance check in through [`StepGate`].

use std::future::Future;
use std::pin::Pin;

use super::definition::WorkflowStepContext;

/// Verdict returned by a [`StepGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(String),
}

/// Object-safe approval hook.
pub trait StepGate: Send + Sync {
    fn check<'a>(
        &'a self,
        ctx: &'a WorkflowStepContext,
    ) -> Pin<Box<dyn Future<Output = GateDecision> + Send + 'a>>;
}

/// Gate that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl StepGate for AllowAll {
    fn check<'a>(
        &'a self,
        _ctx: &'a WorkflowStepContext,
    ) -> Pin<Box<dyn Future<Output = GateDecision> + Send + 'a>> {
        Box::pin(std::future::ready(GateDecision::Allow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waystone_types::workflow::StateMap;

    #[tokio::test]
    async fn allow_all_allows() {
        let ctx = WorkflowStepContext {
            workflow_id: "wf".to_string(),
            step_number: 1,
            step_name: "s".to_string(),
            state: StateMap::new(),
            previous_output: None,
            attempt: 0,
        };
        assert_eq!(AllowAll.check(&ctx).await, GateDecision::Allow);
    }
}
