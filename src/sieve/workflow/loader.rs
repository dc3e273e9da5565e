// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and parsing
//!
//! This module handles loading topology definitions from YAML files and the
//! built-in topologies embedded in the binary.

use crate::adk::error::{SieveError, WorkflowError};
use crate::sieve::workflow::graph::WorkflowDefinition;
use std::fs;
use std::path::Path;

const SUPERVISED: &str = include_str!("../../../workflows/supervised.yaml");
const LINEAR: &str = include_str!("../../../workflows/linear.yaml");

/// Loads workflow definitions from YAML
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Names accepted by [`WorkflowLoader::builtin`]
    pub const BUILTIN: [&'static str; 2] = ["supervised", "linear"];

    /// Load a workflow definition from a YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowDefinition, SieveError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a workflow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, SieveError> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(def)
    }

    /// Load one of the embedded topologies
    pub fn builtin(&self, name: &str) -> Result<WorkflowDefinition, SieveError> {
        let source = match name.trim().to_lowercase().as_str() {
            "supervised" => SUPERVISED,
            "linear" => LINEAR,
            other => return Err(WorkflowError::UnknownTopology(other.to_string()).into()),
        };
        Self::parse_yaml(source)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
