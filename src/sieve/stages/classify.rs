// SPDX-License-Identifier: MIT

//! Classify stage - determines the document kind and its key fields

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::parse::{extract_json_object, strip_reasoning, truncate_chars};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::types::{Classification, DocumentKind};
use crate::sieve::workflow::state::{StateUpdate, WorkflowState};

const PREVIEW_CHARS: usize = 1000;

const INSTRUCTION: &str = r#"You classify documents. Determine:
1. Document type (invoice, receipt, form, contract, letter, report, admission ticket, resume, ...)
2. Key fields that should be extracted
3. Whether the document contains tables or form fields

Respond in JSON:
{
  "document_type": "type here",
  "confidence": 0.0-1.0,
  "key_fields": ["field1", "field2"],
  "has_tables": true/false,
  "has_forms": true/false,
  "language": "en/other"
}"#;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ClassificationReply {
    document_type: String,
    confidence: Option<f64>,
    key_fields: Vec<String>,
    has_tables: bool,
    has_forms: bool,
    language: Option<String>,
}

impl Default for ClassificationReply {
    fn default() -> Self {
        Self {
            document_type: "unknown".to_string(),
            confidence: None,
            key_fields: vec![],
            has_tables: false,
            has_forms: false,
            language: None,
        }
    }
}

/// Turn an oracle response into a classification.
///
/// A structured reply is used as-is; anything else is scanned for document
/// kind keywords and gets confidence 0.5.
pub fn parse_classification(response: &str) -> Classification {
    let structured = extract_json_object(response)
        .and_then(|map| serde_json::from_value::<ClassificationReply>(Value::Object(map)).ok());

    match structured {
        Some(reply) => {
            let mut kind = DocumentKind::from_label(&reply.document_type);
            if kind == DocumentKind::Unknown {
                kind = DocumentKind::infer_from_text(&reply.document_type);
            }
            Classification {
                document_kind: kind,
                confidence: reply.confidence.unwrap_or(0.7).clamp(0.0, 1.0),
                key_fields: reply.key_fields,
                has_tables: reply.has_tables,
                has_forms: reply.has_forms,
                language: reply.language.unwrap_or_else(|| "en".to_string()),
            }
        }
        None => {
            let text = strip_reasoning(response).to_lowercase();
            Classification {
                document_kind: DocumentKind::infer_from_text(&text),
                has_tables: text.contains("table"),
                has_forms: text.contains("form"),
                ..Classification::unknown(0.5)
            }
        }
    }
}

pub struct ClassifyStage {
    oracle: Arc<dyn Oracle>,
}

impl ClassifyStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> &str {
        names::CLASSIFY
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        if state.classification.is_some() {
            return Ok(StageOutput::new(
                StateUpdate::new().directive(names::EXTRACT),
                "Classification already present, skipping",
            ));
        }

        let input = format!(
            "Classify this document and list the key fields to extract.\n\nText preview:\n{}",
            truncate_chars(&state.content, PREVIEW_CHARS)
        );
        let response = self
            .oracle
            .invoke(&Prompt::new(names::CLASSIFY, INSTRUCTION, input))
            .await?;

        let classification = parse_classification(&response);
        let description = format!(
            "Detected document type: {} (confidence: {:.0}%)",
            classification.document_kind.as_str(),
            classification.confidence * 100.0
        );
        Ok(StageOutput::new(
            StateUpdate::new()
                .classification(classification)
                .directive(names::EXTRACT),
            description,
        ))
    }

    fn fallback(&self, _state: &WorkflowState, _error: &StageError) -> StageOutput {
        StageOutput::new(
            StateUpdate::new()
                .classification(Classification::unknown(0.5))
                .directive(names::EXTRACT),
            "classified as unknown",
        )
    }
}
