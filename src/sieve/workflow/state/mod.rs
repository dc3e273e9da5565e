// SPDX-License-Identifier: MIT

//! Workflow state: a statically declared schema and the merge engine

pub mod schema;
pub mod store;

pub use schema::{MergePolicy, StateField};
pub use store::{merge, InitialDocument, StateUpdate, WorkflowState, RESERVED_PAYLOAD_KEYS};
