// SPDX-License-Identifier: MIT

//! Serialisable snapshot of a finished run for downstream report builders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::sieve::types::{Classification, ExtractedEntity, ExtractedTable};
use crate::sieve::workflow::graph::{RunOutcome, Termination};
use crate::sieve::workflow::state::RESERVED_PAYLOAD_KEYS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub document_id: String,
    pub classification: Option<Classification>,
    pub payload: Map<String, Value>,
    pub extracted_fields: usize,
    pub tables: Vec<ExtractedTable>,
    pub entities: Vec<ExtractedEntity>,
    pub confidence: f64,
    pub steps: Vec<String>,
    pub errors: Vec<String>,
    pub termination: Termination,
    pub generated_at: DateTime<Utc>,
}

impl ExtractionReport {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let state = &outcome.state;
        Self {
            document_id: state.document_id.clone(),
            classification: state.classification.clone(),
            payload: state.payload.clone(),
            extracted_fields: state.extracted_field_count(),
            tables: state.tables.clone(),
            entities: state.entities.clone(),
            confidence: state.confidence,
            steps: state.steps.clone(),
            errors: state.errors.clone(),
            termination: outcome.termination,
            generated_at: Utc::now(),
        }
    }

    /// Payload without stage bookkeeping keys
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.payload
            .iter()
            .filter(|(k, _)| !RESERVED_PAYLOAD_KEYS.contains(&k.as_str()))
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::workflow::state::WorkflowState;
    use serde_json::json;

    #[test]
    fn test_report_from_outcome() {
        let mut state = WorkflowState::new("inv-1", "Invoice #1001");
        state.payload.insert("total".to_string(), json!("$50"));
        state
            .payload
            .insert("quality_review".to_string(), json!({"verdict": "accept"}));
        state.confidence = 0.9;
        state.steps.push("[classify] done".to_string());

        let report = ExtractionReport::from_outcome(&RunOutcome {
            state,
            termination: Termination::Completed,
        });

        assert_eq!(report.document_id, "inv-1");
        assert_eq!(report.extracted_fields, 1);
        assert_eq!(report.fields().count(), 1);

        let value: Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["termination"], json!("completed"));
        assert_eq!(value["payload"]["total"], json!("$50"));
        assert!(value["generated_at"].is_string());
    }
}
