// SPDX-License-Identifier: MIT

//! Helpers for making sense of free-form oracle responses

use serde_json::{Map, Value};

/// Drop `<think>...</think>` blocks some local models inline in their answer
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Find a JSON value in a response: fenced block first, then the whole text,
/// then the outermost `{...}` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = strip_reasoning(text);

    if let Some(block) = fenced_block(&text) {
        if let Ok(value) = serde_json::from_str(block.trim()) {
            return Some(value);
        }
    }

    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Like [`extract_json`], but only accepts an object
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let body_start = match text.find("```json") {
        Some(i) => i + "```json".len(),
        None => text.find("```")? + 3,
    };
    let body = &text[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Parse `key: value` lines into a payload map.
///
/// Keys are lower-cased with spaces and dashes turned into underscores;
/// lines without a value are skipped.
pub fn key_value_lines(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in strip_reasoning(text).lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key
            .trim()
            .trim_matches(['*', '"'])
            .to_lowercase()
            .replace([' ', '-'], "_");
        let value = value.trim().trim_matches('"').trim_end_matches(',').trim();
        if key.is_empty() || key.len() > 50 || value.is_empty() {
            continue;
        }
        fields.insert(key, Value::String(value.to_string()));
    }
    fields
}

/// First `max` characters of `text`, on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
