// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Budgets are configuration rather than constants: the defaults come from
//! hand-tuned values with no derivation behind them.

use crate::adk::error::WorkflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for an engine run. Embeddable under `engine:` in a workflow file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum completed stage invocations before the forced review
    pub step_budget: usize,
    /// Quality gate may only request rework below this step count
    pub rework_ceiling: usize,
    /// Verdict confidence a correction needs to be merged (strictly above)
    pub correction_threshold: f64,
    /// Coordinator heuristic only routes to table parsing below this step count
    pub table_step_limit: usize,
    /// Stage forced once when the budget runs out
    pub review_stage: String,
    /// Per-stage timeout; expiry is a contained stage failure
    pub stage_timeout_secs: Option<u64>,
    /// Run-level deadline, checked before each invocation
    pub run_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: 10,
            rework_ceiling: 8,
            correction_threshold: 0.8,
            table_step_limit: 6,
            review_stage: "quality_gate".to_string(),
            stage_timeout_secs: None,
            run_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.step_budget == 0 || self.rework_ceiling >= self.step_budget {
            return Err(WorkflowError::InvalidBudget {
                step_budget: self.step_budget,
                rework_ceiling: self.rework_ceiling,
            });
        }
        if !(0.0..=1.0).contains(&self.correction_threshold) {
            return Err(WorkflowError::InvalidThreshold(self.correction_threshold));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `SIEVE_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("Ignoring {}={:?}: not a valid value", key, raw);
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "SIEVE_STEP_BUDGET") {
            self.step_budget = v;
        }
        if let Some(v) = parsed(&lookup, "SIEVE_REWORK_CEILING") {
            self.rework_ceiling = v;
        }
        if let Some(v) = parsed(&lookup, "SIEVE_CORRECTION_THRESHOLD") {
            self.correction_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "SIEVE_TABLE_STEP_LIMIT") {
            self.table_step_limit = v;
        }
        if let Some(v) = parsed(&lookup, "SIEVE_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs = Some(v);
        }
        if let Some(v) = parsed(&lookup, "SIEVE_RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = Some(v);
        }
        self
    }
}
