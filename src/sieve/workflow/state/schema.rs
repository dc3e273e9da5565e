// SPDX-License-Identifier: MIT

//! State schema definitions
//!
//! The set of state fields is closed and each one carries exactly one merge
//! policy. [`super::merge`] dispatches on these policies, so adding a field
//! means adding it here first.

use serde::{Deserialize, Serialize};

/// How a write to a field combines with the existing value
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Replace the value
    Overwrite,
    /// Concatenate after the existing sequence
    Append,
}

/// Every field of the workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    DocumentId,
    Content,
    Classification,
    Payload,
    Tables,
    Entities,
    Confidence,
    Steps,
    Errors,
    CurrentStage,
    Directive,
}

impl StateField {
    pub const ALL: [StateField; 11] = [
        StateField::DocumentId,
        StateField::Content,
        StateField::Classification,
        StateField::Payload,
        StateField::Tables,
        StateField::Entities,
        StateField::Confidence,
        StateField::Steps,
        StateField::Errors,
        StateField::CurrentStage,
        StateField::Directive,
    ];

    pub const fn policy(self) -> MergePolicy {
        match self {
            StateField::Tables | StateField::Entities | StateField::Steps | StateField::Errors => {
                MergePolicy::Append
            }
            StateField::DocumentId
            | StateField::Content
            | StateField::Classification
            | StateField::Payload
            | StateField::Confidence
            | StateField::CurrentStage
            | StateField::Directive => MergePolicy::Overwrite,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StateField::DocumentId => "document_id",
            StateField::Content => "content",
            StateField::Classification => "classification",
            StateField::Payload => "payload",
            StateField::Tables => "tables",
            StateField::Entities => "entities",
            StateField::Confidence => "confidence",
            StateField::Steps => "steps",
            StateField::Errors => "errors",
            StateField::CurrentStage => "current_stage",
            StateField::Directive => "directive",
        }
    }
}
