// SPDX-License-Identifier: MIT

//! Workflow topology definitions
//!
//! A topology names an entry stage and, per stage, a routing table from
//! directive strings to target stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::sieve::config::EngineConfig;

use super::routing::TERMINAL;

/// A workflow topology as written in YAML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    /// Name of the workflow
    pub name: String,
    /// Description of the workflow
    #[serde(default)]
    pub description: String,
    /// Stage the run starts at
    pub entry: String,
    /// Engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
    /// Stages and their routing tables
    #[serde(default)]
    pub stages: Vec<StageNode>,
}

/// A stage in the topology
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StageNode {
    /// Registered stage name
    pub id: String,
    /// Directive -> target stage (or `complete`)
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    /// Target for a missing or unrecognised directive
    #[serde(default = "default_route")]
    pub default: String,
}

fn default_route() -> String {
    TERMINAL.to_string()
}

impl WorkflowDefinition {
    pub fn stage(&self, id: &str) -> Option<&StageNode> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }
}
