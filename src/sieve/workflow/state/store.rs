// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution
//!
//! Stages never mutate a [`WorkflowState`]. They return a [`StateUpdate`] and
//! the engine folds it in with [`merge`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::StateField;
use crate::sieve::types::{Classification, ExtractedEntity, ExtractedTable};

/// Payload keys written by the built-in stages for their own bookkeeping
pub const RESERVED_PAYLOAD_KEYS: [&str; 3] = ["extraction_plan", "table_analysis", "quality_review"];

/// Output of the upstream reader/OCR pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialDocument {
    #[serde(default)]
    pub document_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub tables: Vec<ExtractedTable>,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
}

impl InitialDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }
}

/// Canonical state of one document run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub document_id: String,
    pub content: String,
    pub classification: Option<Classification>,
    pub payload: Map<String, Value>,
    pub tables: Vec<ExtractedTable>,
    pub entities: Vec<ExtractedEntity>,
    pub confidence: f64,
    pub steps: Vec<String>,
    pub errors: Vec<String>,
    pub current_stage: Option<String>,
    pub directive: Option<String>,
}

impl WorkflowState {
    pub fn new(document_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Build the entry state; a missing or blank document id gets a fresh UUID.
    pub fn from_initial(doc: InitialDocument) -> Self {
        let document_id = doc
            .document_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        merge(
            &Self::default(),
            StateUpdate::new()
                .document_id(document_id)
                .content(doc.content)
                .payload(doc.payload)
                .tables(doc.tables)
                .entities(doc.entities),
        )
    }

    /// Completed stage invocations so far
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Payload entries that are extraction results rather than stage bookkeeping
    pub fn extracted_field_count(&self) -> usize {
        self.payload
            .keys()
            .filter(|k| !RESERVED_PAYLOAD_KEYS.contains(&k.as_str()))
            .count()
    }

    pub fn has_payload_key(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }
}

/// A stage's proposed change to the state
///
/// Overwrite fields are `Option`s (absent means untouched); append fields are
/// the elements to add. The directive is doubly optional so an update can
/// clear it explicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    document_id: Option<String>,
    content: Option<String>,
    classification: Option<Classification>,
    payload: Option<Map<String, Value>>,
    tables: Vec<ExtractedTable>,
    entities: Vec<ExtractedEntity>,
    confidence: Option<f64>,
    steps: Vec<String>,
    errors: Vec<String>,
    current_stage: Option<String>,
    directive: Option<Option<String>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Replace the whole payload
    pub fn payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Write `entries` key-by-key on top of `current`.
    ///
    /// If this update already carries a payload the entries go into that one
    /// instead, so repeated calls accumulate.
    pub fn merge_payload<I, K>(mut self, current: &Map<String, Value>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut payload = self.payload.take().unwrap_or_else(|| current.clone());
        for (key, value) in entries {
            payload.insert(key.into(), value);
        }
        self.payload = Some(payload);
        self
    }

    pub fn tables(mut self, tables: impl IntoIterator<Item = ExtractedTable>) -> Self {
        self.tables.extend(tables);
        self
    }

    pub fn table(mut self, table: ExtractedTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn entities(mut self, entities: impl IntoIterator<Item = ExtractedEntity>) -> Self {
        self.entities.extend(entities);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn current_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }

    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(Some(directive.into()));
        self
    }

    pub fn clear_directive(mut self) -> Self {
        self.directive = Some(None);
        self
    }

    // Step and error entries are owned by the executor and engine so the log
    // lengths keep matching invocation and failure counts.
    pub(crate) fn step(mut self, entry: impl Into<String>) -> Self {
        self.steps.push(entry.into());
        self
    }

    pub(crate) fn error(mut self, entry: impl Into<String>) -> Self {
        self.errors.push(entry.into());
        self
    }

    /// Directive this update would write, if any
    pub fn pending_directive(&self) -> Option<&str> {
        self.directive.as_ref().and_then(|d| d.as_deref())
    }

    /// Fields this update writes to
    pub fn touched_fields(&self) -> Vec<StateField> {
        StateField::ALL
            .into_iter()
            .filter(|field| match field {
                StateField::DocumentId => self.document_id.is_some(),
                StateField::Content => self.content.is_some(),
                StateField::Classification => self.classification.is_some(),
                StateField::Payload => self.payload.is_some(),
                StateField::Tables => !self.tables.is_empty(),
                StateField::Entities => !self.entities.is_empty(),
                StateField::Confidence => self.confidence.is_some(),
                StateField::Steps => !self.steps.is_empty(),
                StateField::Errors => !self.errors.is_empty(),
                StateField::CurrentStage => self.current_stage.is_some(),
                StateField::Directive => self.directive.is_some(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }
}

fn overwrite<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn append<T>(slot: &mut Vec<T>, values: Vec<T>) {
    slot.extend(values);
}

/// Apply `update` to `current`, returning the new state.
///
/// Each field follows its [`StateField::policy`]; fields the update does not
/// touch are carried over unchanged.
pub fn merge(current: &WorkflowState, update: StateUpdate) -> WorkflowState {
    let StateUpdate {
        document_id,
        content,
        classification,
        payload,
        tables,
        entities,
        confidence,
        steps,
        errors,
        current_stage,
        directive,
    } = update;

    let mut next = current.clone();
    overwrite(&mut next.document_id, document_id);
    overwrite(&mut next.content, content);
    overwrite(&mut next.classification, classification.map(Some));
    overwrite(&mut next.payload, payload);
    append(&mut next.tables, tables);
    append(&mut next.entities, entities);
    overwrite(&mut next.confidence, confidence);
    append(&mut next.steps, steps);
    append(&mut next.errors, errors);
    overwrite(&mut next.current_stage, current_stage.map(Some));
    overwrite(&mut next.directive, directive);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::types::DocumentKind;
    use crate::sieve::workflow::state::MergePolicy;
    use serde_json::json;

    fn table(tag: &str) -> ExtractedTable {
        ExtractedTable::new(vec![tag.to_string()], vec![])
    }

    #[test]
    fn test_absent_fields_untouched() {
        let mut state = WorkflowState::new("doc-1", "Invoice #1001");
        state.confidence = 0.4;
        state.directive = Some("extract".to_string());

        let next = merge(&state, StateUpdate::new());
        assert_eq!(next, state);
    }

    #[test]
    fn test_merge_is_pure() {
        let state = WorkflowState::new("doc-1", "text");
        let update = StateUpdate::new().confidence(0.9).step("[x] done");

        let a = merge(&state, update.clone());
        let b = merge(&state, update);
        assert_eq!(a, b);
        assert_eq!(state.confidence, 0.0);
        assert!(state.steps.is_empty());
    }

    #[test]
    fn test_append_sums_contributions_in_order() {
        let contributions = [vec!["a", "b"], vec![], vec!["c"], vec!["d", "e", "f"]];
        let mut state = WorkflowState::default();
        for batch in &contributions {
            let update = StateUpdate::new().tables(batch.iter().map(|t| table(t)));
            state = merge(&state, update);
        }

        let expected: Vec<&str> = contributions.iter().flatten().copied().collect();
        let actual: Vec<&str> = state.tables.iter().map(|t| t.headers[0].as_str()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_overwrite_keeps_last_writer() {
        let writes = [Some(0.2), None, Some(0.7), None, None];
        let mut state = WorkflowState::default();
        for w in writes {
            let mut update = StateUpdate::new();
            if let Some(c) = w {
                update = update.confidence(c);
            }
            state = merge(&state, update);
        }
        assert_eq!(state.confidence, 0.7);
    }

    #[test]
    fn test_directive_set_and_clear() {
        let state = merge(&WorkflowState::default(), StateUpdate::new().directive("tables"));
        assert_eq!(state.directive.as_deref(), Some("tables"));

        let untouched = merge(&state, StateUpdate::new().confidence(0.1));
        assert_eq!(untouched.directive.as_deref(), Some("tables"));

        let cleared = merge(&state, StateUpdate::new().clear_directive());
        assert_eq!(cleared.directive, None);
    }

    #[test]
    fn test_merge_payload_key_by_key() {
        let mut state = WorkflowState::default();
        state.payload.insert("vendor".to_string(), json!("ACME"));
        state.payload.insert("total".to_string(), json!("$40"));

        let update = StateUpdate::new()
            .merge_payload(&state.payload, [("total", json!("$50"))])
            .merge_payload(&state.payload, [("invoice_number", json!("1001"))]);
        let next = merge(&state, update);

        assert_eq!(next.payload["vendor"], json!("ACME"));
        assert_eq!(next.payload["total"], json!("$50"));
        assert_eq!(next.payload["invoice_number"], json!("1001"));
    }

    #[test]
    fn test_touched_fields_follow_schema_policies() {
        let update = StateUpdate::new()
            .classification(Classification::unknown(0.5))
            .table(table("t"))
            .step("[classify] ok")
            .directive("extract");

        let touched = update.touched_fields();
        assert_eq!(
            touched,
            vec![
                StateField::Classification,
                StateField::Tables,
                StateField::Steps,
                StateField::Directive
            ]
        );
        let appends: Vec<_> = touched
            .iter()
            .filter(|f| f.policy() == MergePolicy::Append)
            .collect();
        assert_eq!(appends, vec![&StateField::Tables, &StateField::Steps]);
        assert!(StateUpdate::new().is_empty());
    }

    #[test]
    fn test_classification_overwritten() {
        let mut state = WorkflowState::default();
        state = merge(&state, StateUpdate::new().classification(Classification::unknown(0.5)));
        let mut invoice = Classification::unknown(0.9);
        invoice.document_kind = DocumentKind::Invoice;
        state = merge(&state, StateUpdate::new().classification(invoice));
        assert_eq!(
            state.classification.map(|c| c.document_kind),
            Some(DocumentKind::Invoice)
        );
    }

    #[test]
    fn test_from_initial_assigns_uuid() {
        let state = WorkflowState::from_initial(InitialDocument::new("hello"));
        assert_eq!(state.document_id.len(), 36);
        assert_eq!(state.content, "hello");

        let named = WorkflowState::from_initial(InitialDocument::new("x").with_document_id("inv-7"));
        assert_eq!(named.document_id, "inv-7");
    }

    #[test]
    fn test_extracted_field_count_ignores_reserved() {
        let mut state = WorkflowState::default();
        state.payload.insert("extraction_plan".to_string(), json!({}));
        state.payload.insert("quality_review".to_string(), json!({}));
        assert_eq!(state.extracted_field_count(), 0);
        state.payload.insert("total".to_string(), json!("$50"));
        assert_eq!(state.extracted_field_count(), 1);
    }

    #[test]
    fn test_initial_document_from_json() {
        let doc: InitialDocument = serde_json::from_value(json!({
            "content": "Receipt",
            "payload": {"store": "Corner Shop"}
        }))
        .unwrap();
        let state = WorkflowState::from_initial(doc);
        assert_eq!(state.payload["store"], json!("Corner Shop"));
        assert!(state.tables.is_empty());
    }

    #[test]
    fn test_from_initial_carries_upstream_lists() {
        let mut doc = InitialDocument::new("Qty 2").with_document_id("  ");
        doc.tables
            .push(ExtractedTable::new(vec!["qty".to_string()], vec![vec!["2".to_string()]]));
        doc.entities.push(ExtractedEntity {
            text: "2".to_string(),
            entity_type: "number".to_string(),
            confidence: None,
        });

        let state = WorkflowState::from_initial(doc);
        assert_eq!(state.document_id.len(), 36);
        assert_eq!(state.tables.len(), 1);
        assert_eq!(state.entities.len(), 1);
        assert!(state.steps.is_empty());
        assert!(state.errors.is_empty());
        assert_eq!(state.directive, None);
    }
}
