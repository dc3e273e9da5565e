// SPDX-License-Identifier: MIT

//! sieve-rs: staged document extraction driven by a bounded workflow engine.
//!
//! - [`adk`] holds the oracle side: typed errors, text-generation models and
//!   the [`adk::oracle::Oracle`] adapter stages consult.
//! - [`sieve`] holds the product: workflow state, merge, routing, the
//!   execution engine and the built-in extraction stages.

pub mod adk;
pub mod sieve;
