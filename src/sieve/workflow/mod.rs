// SPDX-License-Identifier: MIT

pub mod builder;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod state;

pub use builder::Builder;
pub use graph::{EngineEvent, ExecutionEngine, RunOutcome, Termination, WorkflowDefinition};
pub use loader::WorkflowLoader;
pub use registry::StageRegistry;
pub use state::{merge, InitialDocument, StateUpdate, WorkflowState};
