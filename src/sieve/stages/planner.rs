// SPDX-License-Identifier: MIT

//! Planner stage - drafts an extraction plan before anything else runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::parse::{extract_json_object, truncate_chars};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::workflow::state::{StateUpdate, WorkflowState};

const PLAN_KEY: &str = "extraction_plan";
const PREVIEW_CHARS: usize = 800;

const INSTRUCTION: &str = r#"You plan structured data extraction from documents.
Skim the document and decide what must be extracted and how hard it will be.

Respond in JSON:
{
  "document_category": "invoice/form/letter/report/ticket/etc",
  "extraction_approach": "basic/advanced",
  "key_fields_to_extract": ["field1", "field2"],
  "has_tabular_data": true/false,
  "has_form_fields": true/false,
  "complexity": "simple/medium/complex",
  "recommended_stages": ["classify", "extract", "tables"],
  "estimated_accuracy": 0.0-1.0,
  "notes": "anything unusual"
}"#;

/// Extraction plan stored at payload key `extraction_plan`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPlan {
    pub document_category: String,
    pub extraction_approach: String,
    pub key_fields_to_extract: Vec<String>,
    pub has_tabular_data: bool,
    pub has_form_fields: bool,
    pub complexity: String,
    #[serde(alias = "recommended_agents")]
    pub recommended_stages: Vec<String>,
    pub estimated_accuracy: f64,
    pub notes: String,
}

impl Default for ExtractionPlan {
    fn default() -> Self {
        Self {
            document_category: "unknown".to_string(),
            extraction_approach: "advanced".to_string(),
            key_fields_to_extract: vec![],
            has_tabular_data: false,
            has_form_fields: false,
            complexity: "medium".to_string(),
            recommended_stages: vec![
                names::CLASSIFY.to_string(),
                names::EXTRACT.to_string(),
                names::QUALITY_GATE.to_string(),
            ],
            estimated_accuracy: 0.8,
            notes: "Default plan".to_string(),
        }
    }
}

impl ExtractionPlan {
    /// Parse a plan from an oracle response, if it holds one
    pub fn from_response(text: &str) -> Option<Self> {
        let map = extract_json_object(text)?;
        serde_json::from_value(Value::Object(map)).ok()
    }
}

pub struct PlannerStage {
    oracle: Arc<dyn Oracle>,
}

impl PlannerStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    fn plan_update(state: &WorkflowState, plan: &ExtractionPlan) -> StateUpdate {
        let value = serde_json::to_value(plan).unwrap_or(Value::Null);
        StateUpdate::new()
            .merge_payload(&state.payload, [(PLAN_KEY, value)])
            .directive(names::CLASSIFY)
    }
}

#[async_trait]
impl Stage for PlannerStage {
    fn name(&self) -> &str {
        names::PLANNER
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        if state.has_payload_key(PLAN_KEY) {
            return Ok(StageOutput::new(
                StateUpdate::new().directive(names::CLASSIFY),
                "Plan already present, skipping",
            ));
        }

        let input = format!(
            "Create an extraction plan for this document (id {}).\n\nDocument preview:\n{}",
            state.document_id,
            truncate_chars(&state.content, PREVIEW_CHARS)
        );
        let response = self
            .oracle
            .invoke(&Prompt::new(names::PLANNER, INSTRUCTION, input))
            .await?;

        let plan = ExtractionPlan::from_response(&response).unwrap_or_else(|| {
            log::warn!("Planner response was not a plan, using the default");
            ExtractionPlan::default()
        });

        let description = format!(
            "Created extraction plan: {} document, {} complexity",
            plan.document_category, plan.complexity
        );
        Ok(StageOutput::new(Self::plan_update(state, &plan), description))
    }

    fn fallback(&self, state: &WorkflowState, _error: &StageError) -> StageOutput {
        StageOutput::new(
            Self::plan_update(state, &ExtractionPlan::default()),
            "using default plan",
        )
    }
}
