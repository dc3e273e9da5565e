// SPDX-License-Identifier: MIT

//! Cyclic workflow execution
//!
//! This module provides the engine that runs stages one at a time, routing
//! between them by directive under a bounded step budget.

pub mod engine;
pub mod executor;
pub mod routing;
pub mod types;

pub use engine::{EngineEvent, ExecutionEngine, RunOutcome, Termination};
pub use executor::{StageExecutor, StageRun};
pub use routing::{normalize_directive, Lookup, RouteTarget, Router, RoutingTable, TERMINAL};
pub use types::{StageNode, WorkflowDefinition};
