// SPDX-License-Identifier: MIT

pub mod config;
pub mod report;
pub mod stages;
pub mod types;
pub mod workflow;
