// SPDX-License-Identifier: MIT

pub mod error;
pub mod model;
pub mod oracle;
