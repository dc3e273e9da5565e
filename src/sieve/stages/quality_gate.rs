// SPDX-License-Identifier: MIT

//! Quality gate stage - reviews the payload and may request bounded rework

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::parse::{extract_json_object, strip_reasoning, truncate_chars};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::workflow::graph::TERMINAL;
use crate::sieve::workflow::state::{StateUpdate, WorkflowState, RESERVED_PAYLOAD_KEYS};

const REVIEW_KEY: &str = "quality_review";
const CONTENT_CHARS: usize = 1500;
const DEFAULT_CONFIDENCE: f64 = 0.8;
const FAILURE_CONFIDENCE: f64 = 0.75;

const INSTRUCTION: &str = r#"You review document extractions for quality.
1. Completeness - are all important fields extracted?
2. Accuracy - does the extracted data match the original text?
3. Consistency - are data formats correct?
4. Gaps - what is missing?
5. Corrections - which values should change?

Respond in JSON:
{
  "overall_quality": "excellent/good/fair/poor",
  "confidence": 0.0-1.0,
  "issues_found": ["issue1"],
  "missing_fields": ["field1"],
  "corrections": {"field": "corrected_value"},
  "recommendations": ["recommendation1"],
  "verdict": "accept/request_rework/needs_review"
}"#;

/// Review outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    RequestRework,
    NeedsReview,
}

impl Verdict {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "accept" | "approve" | "approved" => Some(Verdict::Accept),
            "request_rework" | "request_reextraction" | "rework" => Some(Verdict::RequestRework),
            "needs_review" => Some(Verdict::NeedsReview),
            _ => None,
        }
    }
}

/// Critique stored at payload key `quality_review`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub overall_quality: String,
    pub confidence: f64,
    pub issues_found: Vec<String>,
    pub missing_fields: Vec<String>,
    pub corrections: Map<String, Value>,
    pub recommendations: Vec<String>,
    pub verdict: Verdict,
}

impl Critique {
    /// Critique inferred from unstructured text: verdict accept, confidence
    /// from quality words.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let (quality, confidence) = if has(&["excellent", "complete", "accurate"]) {
            ("good", 0.85)
        } else if has(&["poor", "incomplete", "missing"]) {
            ("fair", 0.65)
        } else {
            ("good", 0.75)
        };
        Self {
            overall_quality: quality.to_string(),
            confidence,
            issues_found: vec![],
            missing_fields: vec![],
            corrections: Map::new(),
            recommendations: vec![],
            verdict: Verdict::Accept,
        }
    }

    /// Parse a structured critique, falling back to [`Critique::from_text`]
    pub fn from_response(response: &str) -> Self {
        let Some(map) = extract_json_object(response) else {
            return Self::from_text(&strip_reasoning(response));
        };

        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };
        let list = |key: &str| -> Vec<String> {
            map.get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let confidence = ["confidence", "confidence_score"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_f64))
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        let verdict = text(&["verdict", "final_verdict"])
            .and_then(|v| Verdict::parse(&v))
            .unwrap_or(Verdict::Accept);

        Self {
            overall_quality: text(&["overall_quality"]).unwrap_or_else(|| "good".to_string()),
            confidence,
            issues_found: list("issues_found"),
            missing_fields: list("missing_fields"),
            corrections: map
                .get("corrections")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            recommendations: list("recommendations"),
            verdict,
        }
    }
}

pub struct QualityGateStage {
    oracle: Arc<dyn Oracle>,
    rework_ceiling: usize,
    correction_threshold: f64,
}

impl QualityGateStage {
    pub fn new(oracle: Arc<dyn Oracle>, rework_ceiling: usize, correction_threshold: f64) -> Self {
        Self {
            oracle,
            rework_ceiling,
            correction_threshold,
        }
    }

    fn review_input(state: &WorkflowState) -> String {
        let extracted: Map<String, Value> = state
            .payload
            .iter()
            .filter(|(k, _)| !RESERVED_PAYLOAD_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let expected = state
            .payload
            .get("extraction_plan")
            .and_then(|p| p.get("key_fields_to_extract"))
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        format!(
            "Review this document extraction.\n\n\
             ORIGINAL TEXT (excerpt):\n{}\n\n\
             EXTRACTED DATA:\n{}\n\n\
             ENTITIES FOUND: {}\nTABLES FOUND: {}\nEXPECTED FIELDS: {}",
            truncate_chars(&state.content, CONTENT_CHARS),
            serde_json::to_string_pretty(&extracted).unwrap_or_default(),
            state.entities.len(),
            state.tables.len(),
            expected
        )
    }

    /// Directive for a verdict, given completed steps before this review
    pub fn route(&self, verdict: Verdict, steps: usize) -> &'static str {
        match verdict {
            Verdict::RequestRework if steps < self.rework_ceiling => names::EXTRACT,
            Verdict::RequestRework => {
                log::info!(
                    "Rework requested at step {} but ceiling is {}, completing",
                    steps,
                    self.rework_ceiling
                );
                TERMINAL
            }
            Verdict::Accept | Verdict::NeedsReview => TERMINAL,
        }
    }
}

#[async_trait]
impl Stage for QualityGateStage {
    fn name(&self) -> &str {
        names::QUALITY_GATE
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        let response = self
            .oracle
            .invoke(&Prompt::new(
                names::QUALITY_GATE,
                INSTRUCTION,
                Self::review_input(state),
            ))
            .await?;

        let critique = Critique::from_response(&response);
        let directive = self.route(critique.verdict, state.step_count());

        let mut entries: Vec<(String, Value)> = Vec::new();
        let apply = critique.confidence > self.correction_threshold;
        if apply {
            entries.extend(
                critique
                    .corrections
                    .iter()
                    .filter(|(k, _)| !RESERVED_PAYLOAD_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        let applied = entries.len();
        entries.push((
            REVIEW_KEY.to_string(),
            serde_json::to_value(&critique).unwrap_or(Value::Null),
        ));

        let mut description = format!(
            "Critique complete: {} (confidence: {:.0}%), verdict {:?}",
            critique.overall_quality,
            critique.confidence * 100.0,
            critique.verdict
        );
        if applied > 0 {
            description.push_str(&format!(", applied {} corrections", applied));
        }
        if critique.verdict == Verdict::RequestRework && directive == TERMINAL {
            description.push_str(", rework request overridden");
        }

        Ok(StageOutput::new(
            StateUpdate::new()
                .merge_payload(&state.payload, entries)
                .confidence(critique.confidence)
                .directive(directive),
            description,
        ))
    }

    fn fallback(&self, _state: &WorkflowState, _error: &StageError) -> StageOutput {
        StageOutput::new(
            StateUpdate::new()
                .confidence(FAILURE_CONFIDENCE)
                .directive(TERMINAL),
            "accepting extraction as-is",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::stages::testing::ScriptedOracle;
    use crate::sieve::workflow::state::merge;
    use serde_json::json;

    fn gate(reply: &str) -> QualityGateStage {
        QualityGateStage::new(ScriptedOracle::replying(reply), 3, 0.8)
    }

    fn state_with_steps(n: usize) -> WorkflowState {
        let mut state = WorkflowState::new("d", "Invoice #1001, total $50");
        state.payload.insert("total".to_string(), json!("$5"));
        state.steps = (0..n).map(|i| format!("[s] {}", i)).collect();
        state
    }

    #[test]
    fn test_verdict_parse() {
        assert_eq!(Verdict::parse("approve"), Some(Verdict::Accept));
        assert_eq!(Verdict::parse("request-rework"), Some(Verdict::RequestRework));
        assert_eq!(Verdict::parse("request_reextraction"), Some(Verdict::RequestRework));
        assert_eq!(Verdict::parse("Needs Review"), Some(Verdict::NeedsReview));
        assert_eq!(Verdict::parse("maybe"), None);
    }

    #[test]
    fn test_critique_from_text() {
        assert_eq!(Critique::from_text("Extraction looks accurate").confidence, 0.85);
        assert_eq!(Critique::from_text("Several fields missing").confidence, 0.65);
        let neutral = Critique::from_text("ok");
        assert_eq!(neutral.confidence, 0.75);
        assert_eq!(neutral.verdict, Verdict::Accept);
    }

    #[test]
    fn test_critique_defaults() {
        let c = Critique::from_response(r#"{"final_verdict": "needs_review"}"#);
        assert_eq!(c.confidence, 0.8);
        assert_eq!(c.verdict, Verdict::NeedsReview);
        assert_eq!(c.overall_quality, "good");
    }

    #[tokio::test]
    async fn test_accept_applies_confident_corrections() {
        let stage = gate(
            r#"{"overall_quality": "good", "confidence": 0.9, "corrections": {"total": "$50", "quality_review": "x"}, "verdict": "accept"}"#,
        );
        let state = state_with_steps(2);

        let out = stage.process(&state).await.unwrap();
        assert!(out.description.contains("applied 1 corrections"));

        let next = merge(&state, out.update);
        assert_eq!(next.payload["total"], json!("$50"));
        assert_eq!(next.payload[REVIEW_KEY]["verdict"], json!("accept"));
        assert_eq!(next.confidence, 0.9);
        assert_eq!(next.directive.as_deref(), Some("complete"));
    }

    #[tokio::test]
    async fn test_low_confidence_corrections_ignored() {
        let stage = gate(r#"{"confidence": 0.8, "corrections": {"total": "$50"}}"#);
        let state = state_with_steps(1);
        let next = merge(&state, stage.process(&state).await.unwrap().update);
        assert_eq!(next.payload["total"], json!("$5"));
        assert_eq!(next.confidence, 0.8);
    }

    #[tokio::test]
    async fn test_rework_below_ceiling() {
        let stage = gate(r#"{"verdict": "request_rework", "confidence": 0.4}"#);
        let out = stage.process(&state_with_steps(2)).await.unwrap();
        assert_eq!(out.update.pending_directive(), Some("extract"));
    }

    #[tokio::test]
    async fn test_rework_at_ceiling_is_terminal() {
        let stage = gate(r#"{"verdict": "request_rework", "confidence": 0.4}"#);
        let out = stage.process(&state_with_steps(3)).await.unwrap();
        assert_eq!(out.update.pending_directive(), Some("complete"));
        assert!(out.description.ends_with("rework request overridden"));
    }

    #[tokio::test]
    async fn test_prompt_excludes_reserved_keys() {
        let oracle = ScriptedOracle::replying("fine");
        let stage = QualityGateStage::new(oracle.clone(), 3, 0.8);
        let mut state = state_with_steps(0);
        state
            .payload
            .insert("extraction_plan".to_string(), json!({"key_fields_to_extract": ["total"]}));

        stage.process(&state).await.unwrap();
        let input = oracle.prompts.lock().unwrap()[0].input.clone();
        assert!(input.contains("\"total\": \"$5\""));
        assert!(!input.contains("\"extraction_plan\""));
        assert!(input.contains("EXPECTED FIELDS: [\"total\"]"));
    }

    #[tokio::test]
    async fn test_oracle_failure_fallback() {
        let stage = QualityGateStage::new(ScriptedOracle::failing(), 3, 0.8);
        let state = state_with_steps(1);
        let err = stage.process(&state).await.unwrap_err();

        let next = merge(&state, stage.fallback(&state, &err).update);
        assert_eq!(next.confidence, 0.75);
        assert_eq!(next.directive.as_deref(), Some("complete"));
    }
}
