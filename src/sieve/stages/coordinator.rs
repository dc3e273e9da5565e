// SPDX-License-Identifier: MIT

//! Coordinator stage - decides which stage runs next
//!
//! The decision is a three-tier chain, each tier independently testable:
//! 1. [`parse_strict`] reads a structured reply naming a stage
//! 2. [`keyword_scan`] looks for a known stage name in the raw text
//! 3. [`heuristic`] derives the next stage from the state alone
//!
//! The chain always yields a valid directive, so the stage never fails.

use async_trait::async_trait;
use std::sync::Arc;

use super::parse::{extract_json_object, strip_reasoning};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::workflow::graph::{normalize_directive, TERMINAL};
use crate::sieve::workflow::state::{StateUpdate, WorkflowState};

/// Candidates with the words that select them in a keyword scan, in priority order
const CANDIDATES: [(&str, &[&str]); 5] = [
    (names::CLASSIFY, &["classify", "schema"]),
    (names::EXTRACT, &["extract"]),
    (names::TABLES, &["tables", "table_parser"]),
    (names::QUALITY_GATE, &["quality_gate", "critic"]),
    (TERMINAL, &["complete"]),
];

const INSTRUCTION: &str = r#"You coordinate document extraction stages.

Available stages:
1. classify - detect the document type
2. extract - extract key-value fields
3. tables - parse tables
4. quality_gate - review extraction quality
5. complete - finish the workflow

Based on the current state, decide which stage should run next.

Respond with JSON:
{
  "next_stage": "stage_name",
  "reason": "why this stage"
}"#;

/// How the next stage was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Structured reply named a known stage
    Parsed {
        target: &'static str,
        rationale: Option<String>,
    },
    /// A known stage name appeared in free text
    KeywordMatched { target: &'static str },
    /// Derived from the state without the oracle
    HeuristicDefault { target: &'static str },
}

impl Decision {
    pub fn target(&self) -> &'static str {
        match self {
            Decision::Parsed { target, .. }
            | Decision::KeywordMatched { target }
            | Decision::HeuristicDefault { target } => *target,
        }
    }

    fn describe(&self) -> String {
        match self {
            Decision::Parsed {
                target,
                rationale: Some(why),
            } => format!("Routing to {}: {}", target, why),
            Decision::Parsed { target, .. } => format!("Routing to {}", target),
            Decision::KeywordMatched { target } => {
                format!("Routing to {} (keyword match)", target)
            }
            Decision::HeuristicDefault { target } => {
                format!("Fallback routing to {}", target)
            }
        }
    }
}

/// Map a stage name or common alias to its candidate
pub fn canonical_stage(name: &str) -> Option<&'static str> {
    match normalize_directive(name).as_str() {
        "classify" | "classification" | "schema" => Some(names::CLASSIFY),
        "extract" | "extraction" => Some(names::EXTRACT),
        "tables" | "table" | "table_parser" => Some(names::TABLES),
        "quality_gate" | "critic" | "review" | "validate" | "validation" => {
            Some(names::QUALITY_GATE)
        }
        "complete" | "end" | "done" | "finish" => Some(TERMINAL),
        _ => None,
    }
}

/// Tier 1: a JSON reply whose `next_stage` (or `next_agent`/`target`) is known
pub fn parse_strict(response: &str) -> Option<Decision> {
    let map = extract_json_object(response)?;
    let name = ["next_stage", "next_agent", "target"]
        .iter()
        .find_map(|key| map.get(*key).and_then(|v| v.as_str()))?;
    let target = canonical_stage(name)?;
    let rationale = ["reason", "rationale"]
        .iter()
        .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
        .map(|s| s.to_string());
    Some(Decision::Parsed { target, rationale })
}

/// Tier 2: first candidate, in priority order, whose keyword appears in the text
pub fn keyword_scan(response: &str) -> Option<Decision> {
    let text = normalize_directive(&strip_reasoning(response));
    CANDIDATES
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(target, _)| Decision::KeywordMatched { target: *target })
}

/// Tier 3: state machine over what has been done so far
pub fn heuristic(state: &WorkflowState, table_step_limit: usize) -> Decision {
    let tables_pending = state
        .classification
        .as_ref()
        .map(|c| c.has_tables)
        .unwrap_or(false)
        || !state.tables.is_empty();

    let target = if state.classification.is_none() {
        names::CLASSIFY
    } else if state.extracted_field_count() == 0 {
        names::EXTRACT
    } else if tables_pending
        && !state.has_payload_key("table_analysis")
        && state.step_count() < table_step_limit
    {
        names::TABLES
    } else if state.confidence == 0.0 {
        names::QUALITY_GATE
    } else {
        TERMINAL
    };
    Decision::HeuristicDefault { target }
}

/// Full chain over an oracle reply (or its absence)
pub fn decide(response: Option<&str>, state: &WorkflowState, table_step_limit: usize) -> Decision {
    response
        .and_then(|text| parse_strict(text).or_else(|| keyword_scan(text)))
        .unwrap_or_else(|| heuristic(state, table_step_limit))
}

/// What the coordinator tells the oracle about the state
pub fn summarize(state: &WorkflowState) -> String {
    let mut lines = vec![format!("Steps completed: {}", state.step_count())];

    match &state.classification {
        Some(c) => lines.push(format!(
            "Document type: {} (confidence {:.0}%)",
            c.document_kind.as_str(),
            c.confidence * 100.0
        )),
        None => lines.push("Document type: NOT YET DETECTED".to_string()),
    }

    match state.extracted_field_count() {
        0 => lines.push("Structured data: NOT YET EXTRACTED".to_string()),
        n => lines.push(format!("Structured fields: {} extracted", n)),
    }

    if !state.entities.is_empty() {
        lines.push(format!("Entities: {} found", state.entities.len()));
    }
    if !state.tables.is_empty() {
        lines.push(format!("Tables: {} detected", state.tables.len()));
    }
    if state.has_payload_key("table_analysis") {
        lines.push("Tables: analysed".to_string());
    }
    if state.confidence > 0.0 {
        lines.push(format!("Confidence: {:.1}%", state.confidence * 100.0));
    }
    if !state.errors.is_empty() {
        lines.push(format!("Errors so far: {}", state.errors.len()));
    }
    lines.join("\n")
}

pub struct CoordinatorStage {
    oracle: Arc<dyn Oracle>,
    table_step_limit: usize,
}

impl CoordinatorStage {
    pub fn new(oracle: Arc<dyn Oracle>, table_step_limit: usize) -> Self {
        Self {
            oracle,
            table_step_limit,
        }
    }
}

#[async_trait]
impl Stage for CoordinatorStage {
    fn name(&self) -> &str {
        names::COORDINATOR
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        let input = format!(
            "Current workflow state:\n{}\n\nWhich stage should run next?",
            summarize(state)
        );
        let response = match self
            .oracle
            .invoke(&Prompt::new(names::COORDINATOR, INSTRUCTION, input))
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("Coordinator oracle failed, using heuristic: {}", e);
                None
            }
        };

        let decision = decide(response.as_deref(), state, self.table_step_limit);
        log::debug!("Coordinator decision: {:?}", decision);
        Ok(StageOutput::new(
            StateUpdate::new().directive(decision.target()),
            decision.describe(),
        ))
    }

    fn fallback(&self, state: &WorkflowState, _error: &StageError) -> StageOutput {
        let decision = heuristic(state, self.table_step_limit);
        StageOutput::new(
            StateUpdate::new().directive(decision.target()),
            decision.describe(),
        )
    }
}
