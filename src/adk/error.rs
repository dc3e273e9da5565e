// SPDX-License-Identifier: MIT

//! Typed error handling for sieve-rs
//!
//! Errors split by who can recover from them:
//! - [`ModelError`] is raised by oracle transports and recovered by stages.
//! - [`StageError`] is raised by stages and contained by the stage executor.
//! - [`WorkflowError`] is raised while loading or validating a topology,
//!   before any run starts.
//!
//! Nothing in this module can abort a run that has already started.

use std::time::Duration;
use thiserror::Error;

/// Errors from loading and building a workflow
#[derive(Debug, Error)]
pub enum SieveError {
    /// Workflow definition errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Workflow topology and engine configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    /// A stage named by the topology is not registered
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A route points at a stage that does not exist
    #[error("Route '{directive}' of stage '{from}' targets unknown stage '{target}'")]
    UnknownRouteTarget {
        from: String,
        directive: String,
        target: String,
    },

    /// Stage ids must already be in directive form (lowercase, `_` separated)
    #[error("Invalid stage id '{id}', expected '{normalized}'")]
    InvalidStageId { id: String, normalized: String },

    /// The same stage id appears twice in a topology
    #[error("Duplicate stage definition: {0}")]
    DuplicateStage(String),

    /// Budget relations violated
    #[error("Invalid budget: step_budget={step_budget}, rework_ceiling={rework_ceiling} (need 1 <= step_budget and rework_ceiling < step_budget)")]
    InvalidBudget {
        step_budget: usize,
        rework_ceiling: usize,
    },

    /// Correction threshold outside [0, 1]
    #[error("Invalid correction threshold: {0}")]
    InvalidThreshold(f64),

    /// File not found when loading a workflow
    #[error("Workflow file not found: {0}")]
    FileNotFound(String),

    /// No built-in topology with this name
    #[error("Unknown topology: {0}")]
    UnknownTopology(String),
}

/// Oracle/model errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Non-success HTTP status from the provider
    #[error("API error from {provider} (status {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network/transport failure
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Invalid or empty response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Failure signalled by a stage to the executor
#[derive(Debug, Error)]
pub enum StageError {
    /// The oracle call failed
    #[error("oracle invocation failed: {0}")]
    Oracle(#[from] ModelError),

    /// The stage exceeded its time allowance
    #[error("timed out after {limit:?}")]
    Timeout { limit: Duration },

    /// The stage panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

impl ModelError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_from_model_error() {
        let err: StageError = ModelError::ApiKeyMissing("openai".to_string()).into();
        assert!(matches!(err, StageError::Oracle(_)));
        assert_eq!(
            err.to_string(),
            "oracle invocation failed: API key not configured for provider: openai"
        );
    }

    #[test]
    fn test_invalid_budget_display() {
        let err = WorkflowError::InvalidBudget {
            step_budget: 3,
            rework_ceiling: 3,
        };
        assert!(err.to_string().contains("step_budget=3"));
    }

    #[test]
    fn test_workflow_error_into_sieve_error() {
        let err: SieveError = WorkflowError::UnknownStage("ocr".to_string()).into();
        assert_eq!(err.to_string(), "Workflow error: Unknown stage: ocr");
    }

    #[test]
    fn test_sub_second_timeout_display() {
        let err = StageError::Timeout {
            limit: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "timed out after 250ms");
    }

    #[test]
    fn test_api_error_constructor() {
        let err = ModelError::api("anthropic", 500, "overloaded");
        assert_eq!(
            err.to_string(),
            "API error from anthropic (status 500): overloaded"
        );
    }
}
