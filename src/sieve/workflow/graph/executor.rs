// SPDX-License-Identifier: MIT

//! Stage executor
//!
//! Runs one stage against the state and commits its update. A failing stage
//! (error, timeout or panic) never reaches the caller: the executor records
//! the failure, applies the stage's fallback update and moves on.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use crate::adk::error::StageError;
use crate::sieve::stages::{Stage, StageOutput};
use crate::sieve::workflow::state::{merge, StateUpdate, WorkflowState};

/// Result of one stage invocation
#[derive(Debug, Clone)]
pub struct StageRun {
    /// State after the update was merged
    pub state: WorkflowState,
    /// Step-log description (without the stage prefix)
    pub description: String,
    /// Contained failure, if the stage failed
    pub failure: Option<String>,
}

/// Wraps stage invocation with step logging and failure containment
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run `stage` and return the merged state
    pub async fn run(&self, stage: &dyn Stage, state: &WorkflowState) -> WorkflowState {
        self.execute(stage, state).await.state
    }

    /// Run `stage`, returning the merged state and what happened
    pub async fn execute(&self, stage: &dyn Stage, state: &WorkflowState) -> StageRun {
        let name = stage.name().to_string();

        match self.invoke(stage, state).await {
            Ok(output) => {
                log::info!("Stage {} completed: {}", name, output.description);
                log::debug!(
                    "Stage {} touched {:?}, directive {:?}",
                    name,
                    output.update.touched_fields(),
                    output.update.pending_directive()
                );

                let update = output
                    .update
                    .current_stage(name.as_str())
                    .step(format!("[{}] {}", name, output.description));
                StageRun {
                    state: merge(state, update),
                    description: output.description,
                    failure: None,
                }
            }
            Err(err) => {
                log::error!("Stage {} failed: {}", name, err);
                let fallback = self.fallback(stage, state, &err);
                if fallback.update.is_empty() {
                    log::warn!("Stage {} has no safe default, state left unchanged", name);
                }
                let description = format!("failed, fell back: {}", fallback.description);

                let update = fallback
                    .update
                    .current_stage(name.as_str())
                    .error(format!("[{}] failed: {}", name, err))
                    .step(format!("[{}] {}", name, description));
                StageRun {
                    state: merge(state, update),
                    description,
                    failure: Some(err.to_string()),
                }
            }
        }
    }

    async fn invoke(
        &self,
        stage: &dyn Stage,
        state: &WorkflowState,
    ) -> Result<StageOutput, StageError> {
        let call = AssertUnwindSafe(stage.process(state)).catch_unwind();

        let caught = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => return Err(StageError::Timeout { limit }),
            },
            None => call.await,
        };

        caught.unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(panic.as_ref()))))
    }

    fn fallback(&self, stage: &dyn Stage, state: &WorkflowState, err: &StageError) -> StageOutput {
        std::panic::catch_unwind(AssertUnwindSafe(|| stage.fallback(state, err))).unwrap_or_else(
            |panic| {
                log::error!(
                    "Fallback of stage {} panicked: {}",
                    stage.name(),
                    panic_message(panic.as_ref())
                );
                StageOutput::new(StateUpdate::new(), "no fallback available")
            },
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;
    use async_trait::async_trait;

    enum Behaviour {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct MockStage {
        behaviour: Behaviour,
    }

    impl MockStage {
        fn new(behaviour: Behaviour) -> Self {
            Self { behaviour }
        }
    }

    #[async_trait]
    impl Stage for MockStage {
        fn name(&self) -> &str {
            "mock"
        }

        async fn process(&self, _state: &WorkflowState) -> Result<StageOutput, StageError> {
            match self.behaviour {
                Behaviour::Succeed => Ok(StageOutput::new(
                    StateUpdate::new().confidence(0.9).directive("next"),
                    "did the thing",
                )),
                Behaviour::Fail => Err(ModelError::InvalidResponse("garbled".to_string()).into()),
                Behaviour::Panic => panic!("stage exploded"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(StageOutput::default())
                }
            }
        }

        fn fallback(&self, _state: &WorkflowState, _error: &StageError) -> StageOutput {
            StageOutput::new(StateUpdate::new().directive("extract"), "directive extract")
        }
    }

    #[tokio::test]
    async fn test_success_records_step() {
        let executor = StageExecutor::default();
        let state = WorkflowState::new("d", "text");

        let run = executor.execute(&MockStage::new(Behaviour::Succeed), &state).await;

        assert!(run.failure.is_none());
        assert_eq!(run.state.steps, vec!["[mock] did the thing"]);
        assert!(run.state.errors.is_empty());
        assert_eq!(run.state.confidence, 0.9);
        assert_eq!(run.state.current_stage.as_deref(), Some("mock"));
        assert_eq!(run.state.directive.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let executor = StageExecutor::default();
        let mut state = WorkflowState::new("d", "text");
        state.steps.push("[earlier] ok".to_string());

        let next = executor.run(&MockStage::new(Behaviour::Fail), &state).await;

        assert_eq!(next.errors.len(), 1);
        assert_eq!(
            next.errors[0],
            "[mock] failed: oracle invocation failed: Invalid response from model: garbled"
        );
        assert_eq!(next.steps.len(), 2);
        assert!(next.steps[1].starts_with("[mock] failed"));
        assert_eq!(next.directive.as_deref(), Some("extract"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let executor = StageExecutor::default();
        let run = executor
            .execute(&MockStage::new(Behaviour::Panic), &WorkflowState::default())
            .await;

        assert_eq!(run.failure.as_deref(), Some("panicked: stage exploded"));
        assert_eq!(run.state.errors.len(), 1);
        assert_eq!(run.state.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_contained() {
        let executor = StageExecutor::new(Some(Duration::from_millis(20)));
        let run = executor
            .execute(&MockStage::new(Behaviour::Hang), &WorkflowState::default())
            .await;

        assert_eq!(run.failure.as_deref(), Some("timed out after 20ms"));
        assert_eq!(run.state.errors, vec!["[mock] failed: timed out after 20ms"]);
        assert_eq!(run.state.directive.as_deref(), Some("extract"));
    }
}
