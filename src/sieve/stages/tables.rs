// SPDX-License-Identifier: MIT

//! Tables stage - analyses known tables or detects tables in the text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::parse::{extract_json_object, truncate_chars};
use super::{names, Stage, StageOutput};
use crate::adk::error::StageError;
use crate::adk::oracle::{Oracle, Prompt};
use crate::sieve::types::ExtractedTable;
use crate::sieve::workflow::state::{StateUpdate, WorkflowState};

const ANALYSIS_KEY: &str = "table_analysis";
const DETECT_CHARS: usize = 2000;
const PROMPT_ROWS: usize = 10;

const ANALYSE_INSTRUCTION: &str = r#"You analyse tables. For the given table:
1. Check whether the headers are identified correctly
2. Suggest better header names if needed
3. Give the data type of each column
4. Flag any inconsistencies

Respond in JSON: {"headers": [...], "data_types": [...], "issues": [...]}"#;

const DETECT_INSTRUCTION: &str = r#"You find tabular data in plain text.
Respond in JSON:
{
  "tables": [
    {"headers": ["col1", "col2"], "rows": [["val1", "val2"]]}
  ]
}"#;

/// Oracle's analysis of one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableAnalysis {
    pub table_index: usize,
    pub headers: Vec<String>,
    pub data_types: Vec<String>,
    pub issues: Vec<String>,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(cell_text).collect())
        .unwrap_or_default()
}

/// Tables listed in a detection response; cells of any JSON type become text
pub fn parse_detected_tables(response: &str) -> Vec<ExtractedTable> {
    let Some(map) = extract_json_object(response) else {
        return vec![];
    };
    let Some(tables) = map.get("tables").and_then(Value::as_array) else {
        return vec![];
    };

    tables
        .iter()
        .filter_map(|table| {
            let headers = string_list(table.get("headers"));
            let rows: Vec<Vec<String>> = table
                .get("rows")
                .and_then(Value::as_array)
                .map(|rows| rows.iter().map(|r| string_list(Some(r))).collect())
                .unwrap_or_default();
            if headers.is_empty() && rows.is_empty() {
                None
            } else {
                Some(ExtractedTable::new(headers, rows))
            }
        })
        .collect()
}

pub struct TablesStage {
    oracle: Arc<dyn Oracle>,
}

impl TablesStage {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    async fn analyse(&self, index: usize, table: &ExtractedTable) -> Option<TableAnalysis> {
        let input = format!(
            "Analyse this table:\n\n{}",
            table.to_prompt_text(PROMPT_ROWS)
        );
        let response = match self
            .oracle
            .invoke(&Prompt::new(names::TABLES, ANALYSE_INSTRUCTION, input))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Analysis of table {} failed, skipping: {}", index, e);
                return None;
            }
        };

        let map = extract_json_object(&response)?;
        Some(TableAnalysis {
            table_index: index,
            headers: string_list(map.get("headers")),
            data_types: string_list(map.get("data_types")),
            issues: string_list(map.get("issues")),
        })
    }

    fn analysis_update(state: &WorkflowState, analyses: &[TableAnalysis]) -> StateUpdate {
        let value = serde_json::to_value(analyses).unwrap_or(Value::Array(vec![]));
        StateUpdate::new()
            .merge_payload(&state.payload, [(ANALYSIS_KEY, value)])
            .directive(names::QUALITY_GATE)
    }
}

#[async_trait]
impl Stage for TablesStage {
    fn name(&self) -> &str {
        names::TABLES
    }

    async fn process(&self, state: &WorkflowState) -> Result<StageOutput, StageError> {
        if !state.tables.is_empty() {
            let mut analyses = Vec::new();
            for (index, table) in state.tables.iter().enumerate() {
                if let Some(analysis) = self.analyse(index, table).await {
                    analyses.push(analysis);
                }
            }
            let description = format!(
                "Analysed {} of {} tables",
                analyses.len(),
                state.tables.len()
            );
            return Ok(StageOutput::new(
                Self::analysis_update(state, &analyses),
                description,
            ));
        }

        let input = format!(
            "Find any tabular data in this text and extract headers and rows:\n\n{}",
            truncate_chars(&state.content, DETECT_CHARS)
        );
        let response = self
            .oracle
            .invoke(&Prompt::new(names::TABLES, DETECT_INSTRUCTION, input))
            .await?;

        let detected = parse_detected_tables(&response);
        let description = format!("Detected {} tables from text", detected.len());
        Ok(StageOutput::new(
            Self::analysis_update(state, &[]).tables(detected),
            description,
        ))
    }

    fn fallback(&self, state: &WorkflowState, _error: &StageError) -> StageOutput {
        StageOutput::new(
            Self::analysis_update(state, &[]),
            "table parsing skipped",
        )
    }
}
