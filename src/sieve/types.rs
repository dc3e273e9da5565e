// SPDX-License-Identifier: MIT

//! Document-level data carried through a run

use serde::{Deserialize, Serialize};

/// Extracted table data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl ExtractedTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            page: None,
        }
    }

    /// Markdown-ish rendering used in oracle prompts; rows are capped.
    pub fn to_prompt_text(&self, max_rows: usize) -> String {
        let mut lines = Vec::new();
        if !self.headers.is_empty() {
            lines.push(format!("| {} |", self.headers.join(" | ")));
            lines.push(format!("| {} |", vec!["---"; self.headers.len()].join(" | ")));
        }
        for row in self.rows.iter().take(max_rows) {
            lines.push(format!("| {} |", row.join(" | ")));
        }
        if self.rows.len() > max_rows {
            lines.push(format!("... ({} more rows)", self.rows.len() - max_rows));
        }
        lines.join("\n")
    }
}

/// Extracted named entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// What kind of document the content is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Receipt,
    Form,
    Contract,
    Letter,
    Report,
    AdmissionTicket,
    Resume,
    #[default]
    Unknown,
}

impl DocumentKind {
    /// Keyword table, checked in order
    const KEYWORDS: &'static [(DocumentKind, &'static [&'static str])] = &[
        (DocumentKind::Invoice, &["invoice", "bill"]),
        (DocumentKind::Receipt, &["receipt"]),
        (DocumentKind::Form, &["form", "application"]),
        (DocumentKind::Contract, &["contract", "agreement"]),
        (DocumentKind::Letter, &["letter", "correspondence"]),
        (DocumentKind::Report, &["report", "analysis"]),
        (DocumentKind::AdmissionTicket, &["admission", "ticket", "exam"]),
        (DocumentKind::Resume, &["resume", "curriculum vitae", "cv"]),
    ];

    /// Map a label such as `"Invoice"` or `"admission ticket"` to a kind
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "invoice" => Self::Invoice,
            "receipt" => Self::Receipt,
            "form" => Self::Form,
            "contract" => Self::Contract,
            "letter" => Self::Letter,
            "report" => Self::Report,
            "admission_ticket" => Self::AdmissionTicket,
            "resume" | "cv" => Self::Resume,
            _ => Self::Unknown,
        }
    }

    /// Infer a kind from free text by keyword; first table entry wins.
    pub fn infer_from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::Form => "form",
            Self::Contract => "contract",
            Self::Letter => "letter",
            Self::Report => "report",
            Self::AdmissionTicket => "admission_ticket",
            Self::Resume => "resume",
            Self::Unknown => "unknown",
        }
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub document_kind: DocumentKind,
    pub confidence: f64,
    #[serde(default)]
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub has_tables: bool,
    #[serde(default)]
    pub has_forms: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl Classification {
    /// Placeholder used when classification could not be performed
    pub fn unknown(confidence: f64) -> Self {
        Self {
            document_kind: DocumentKind::Unknown,
            confidence,
            key_fields: vec![],
            has_tables: false,
            has_forms: false,
            language: default_language(),
        }
    }
}
