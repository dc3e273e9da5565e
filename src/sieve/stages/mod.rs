// SPDX-License-Identifier: MIT

//! Stage module - the processing units the engine drives
//!
//! This module provides the core [`Stage`] trait and the built-in stages:
//! - `PlannerStage` - drafts an extraction plan
//! - `ClassifyStage` - determines the document kind
//! - `ExtractStage` - pulls type-specific fields into the payload
//! - `TablesStage` - detects or analyses tables
//! - `CoordinatorStage` - picks the next stage
//! - `QualityGateStage` - reviews the payload and may request rework

mod classify;
mod coordinator;
mod extraction;
pub(crate) mod parse;
mod planner;
mod quality_gate;
mod tables;

pub use classify::ClassifyStage;
pub use coordinator::{CoordinatorStage, Decision};
pub use extraction::ExtractStage;
pub use planner::PlannerStage;
pub use quality_gate::{QualityGateStage, Verdict};
pub use tables::TablesStage;

use crate::adk::error::StageError;
use crate::sieve::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;

/// Names the built-in stages register under; also their directive strings
pub mod names {
    pub const PLANNER: &str = "planner";
    pub const CLASSIFY: &str = "classify";
    pub const EXTRACT: &str = "extract";
    pub const TABLES: &str = "tables";
    pub const COORDINATOR: &str = "coordinator";
    pub const QUALITY_GATE: &str = "quality_gate";
}

/// What a stage proposes after one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub update: StateUpdate,
    /// Human-readable summary for the step log
    pub description: String,
}

impl StageOutput {
    pub fn new(update: StateUpdate, description: impl Into<String>) -> Self {
        Self {
            update,
            description: description.into(),
        }
    }
}

/// Core stage trait for all processing stages
#[async_trait]
pub trait Stage: Send + Sync {
    /// Returns the stage name
    fn name(&self) -> &str;

    /// Inspect the state and propose an update
    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError>;

    /// Update applied in place of a failed `process`
    ///
    /// The default writes nothing, which leaves the directive unset so the
    /// routing table's default entry decides.
    fn fallback(&self, _state: &WorkflowState, error: &StageError) -> StageOutput {
        StageOutput::new(StateUpdate::new(), format!("no safe default after: {}", error))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ModelError;

    struct EchoStage;

    #[async_trait]
    impl Stage for EchoStage {
        fn name(&self) -> &str {
            "echo"
        }

        async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
            Ok(StageOutput::new(
                StateUpdate::new().directive("complete"),
                format!("echoed {} chars", state.content.len()),
            ))
        }
    }

    #[tokio::test]
    async fn test_stage_process() {
        let stage = EchoStage;
        let out = stage
            .process(&WorkflowState::new("d", "hello"))
            .await
            .unwrap();
        assert_eq!(out.description, "echoed 5 chars");
        assert_eq!(out.update.pending_directive(), Some("complete"));
    }

    #[test]
    fn test_default_fallback_leaves_directive_unset() {
        let err = StageError::Oracle(ModelError::InvalidResponse("boom".to_string()));
        let out = EchoStage.fallback(&WorkflowState::default(), &err);
        assert!(out.update.is_empty());
        assert!(out.description.contains("boom"));
    }
}
