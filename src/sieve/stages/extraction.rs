// SPDX-License-Identifier: MIT

//! Extract stage - pulls type-specific fields into the structured payload

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::parse::{extract_json_object, key_value_lines, truncate_chars};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::types::{DocumentKind, ExtractedEntity};
use crate::sieve::workflow::state::{StateUpdate, WorkflowState, RESERVED_PAYLOAD_KEYS};

const CONTENT_CHARS: usize = 3000;
const ENTITY_CONFIDENCE: f64 = 0.8;

/// Entity type by key keyword; first match wins
const ENTITY_KEYWORDS: &[(&str, &[&str])] = &[
    ("person", &["name", "candidate", "applicant", "customer", "vendor"]),
    ("date", &["date", "time"]),
    ("location", &["address", "city", "state", "country", "centre"]),
    ("organization", &["company", "organization", "school", "institution"]),
    ("number", &["number", "id", "phone", "registration"]),
    ("money", &["amount", "price", "total", "tax", "subtotal"]),
];

/// Field checklist for a document kind
fn field_guide(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Invoice => {
            "For invoices, extract:\n\
             - invoice_number, invoice_date, due_date\n\
             - vendor_name, vendor_address, customer_name, customer_address\n\
             - line_items (description, quantity, price)\n\
             - subtotal, tax, total, payment_terms"
        }
        DocumentKind::Receipt => {
            "For receipts, extract:\n\
             - merchant_name, merchant_address\n\
             - transaction_date, transaction_time\n\
             - items, subtotal, tax, total, payment_method"
        }
        DocumentKind::Form => {
            "For forms, extract every filled field as a key-value pair, plus\n\
             form_title, form_number, submission_date and applicant details."
        }
        DocumentKind::Contract => {
            "For contracts, extract:\n\
             - parties, effective_date, expiration_date\n\
             - key obligations and payment terms"
        }
        DocumentKind::Letter => {
            "For letters, extract:\n\
             - sender_name, sender_address, recipient_name, recipient_address\n\
             - date, subject and the key points of the body"
        }
        DocumentKind::AdmissionTicket => {
            "For admission tickets, extract:\n\
             - candidate_name, register_number, roll_number\n\
             - exam_name, exam_date, exam_time, exam_session\n\
             - exam_centre, centre_address, special_instructions"
        }
        DocumentKind::Report | DocumentKind::Resume | DocumentKind::Unknown => {
            "Extract all key information as structured key-value pairs."
        }
    }
}

fn instruction(kind: DocumentKind) -> String {
    format!(
        "You extract structured data from documents. {}\n\nRespond with a single JSON object.",
        field_guide(kind)
    )
}

/// Parse extracted fields: JSON object first, then `key: value` lines
pub fn parse_fields(response: &str) -> Map<String, Value> {
    extract_json_object(response).unwrap_or_else(|| key_value_lines(response))
}

/// Entities for the string-valued fields, typed by key keyword
pub fn entities_from_fields(fields: &Map<String, Value>) -> Vec<ExtractedEntity> {
    fields
        .iter()
        .filter_map(|(key, value)| {
            let text = value.as_str()?;
            let key = key.to_lowercase();
            let entity_type = ENTITY_KEYWORDS
                .iter()
                .find(|(_, words)| words.iter().any(|w| key.contains(w)))
                .map(|(t, _)| *t)
                .unwrap_or("other");
            Some(ExtractedEntity {
                text: text.to_string(),
                entity_type: entity_type.to_string(),
                confidence: Some(ENTITY_CONFIDENCE),
            })
        })
        .collect()
}

pub struct ExtractStage {
    oracle: Arc<dyn Oracle>,
}

impl ExtractStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Fields to focus on: the classification's, else the plan's
    fn focus_fields(state: &WorkflowState) -> Vec<String> {
        if let Some(c) = &state.classification {
            if !c.key_fields.is_empty() {
                return c.key_fields.clone();
            }
        }
        state
            .payload
            .get("extraction_plan")
            .and_then(|plan| plan.get("key_fields_to_extract"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        names::EXTRACT
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        let kind = state
            .classification
            .as_ref()
            .map(|c| c.document_kind)
            .unwrap_or_default();
        let focus = Self::focus_fields(state);
        let focus = if focus.is_empty() {
            "all relevant fields".to_string()
        } else {
            focus.join(", ")
        };

        let input = format!(
            "Extract structured information from this {} document.\n\
             Focus on these fields if present: {}\n\nDocument text:\n{}",
            kind.as_str(),
            focus,
            truncate_chars(&state.content, CONTENT_CHARS)
        );
        let response = self
            .oracle
            .invoke(&Prompt::new(names::EXTRACT, instruction(kind), input))
            .await?;

        let mut fields = parse_fields(&response);
        // Stage bookkeeping keys are not the oracle's to overwrite
        fields.retain(|k, _| !RESERVED_PAYLOAD_KEYS.contains(&k.as_str()));
        let entities = entities_from_fields(&fields);

        let has_tables = state
            .classification
            .as_ref()
            .map(|c| c.has_tables)
            .unwrap_or(false);
        let directive = if has_tables {
            names::TABLES
        } else {
            names::QUALITY_GATE
        };

        let description = format!(
            "Extracted {} fields and {} entities",
            fields.len(),
            entities.len()
        );
        Ok(StageOutput::new(
            StateUpdate::new()
                .merge_payload(&state.payload, fields)
                .entities(entities)
                .directive(directive),
            description,
        ))
    }

    fn fallback(&self, _state: &WorkflowState, _error: &StageError) -> StageOutput {
        StageOutput::new(
            StateUpdate::new().directive(names::QUALITY_GATE),
            "proceeding to quality gate",
        )
    }
}
