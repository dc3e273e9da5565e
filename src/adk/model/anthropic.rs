// SPDX-License-Identifier: MIT

//! Anthropic Model - Claude messages API implementation

use super::{error_from_response, Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Anthropic Claude model implementation
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl AnthropicModel {
    /// Create a new AnthropicModel
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    /// Optionally uses `ANTHROPIC_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("anthropic".to_string()))?;
        let base_url = env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    /// System text is sent as a top-level field, not a message
    fn extract_system_message(history: &[Content]) -> Option<String> {
        history
            .iter()
            .find(|c| c.role == "system")
            .map(|c| c.joined_text())
            .filter(|t| !t.is_empty())
    }

    fn content_to_anthropic_message(content: &Content) -> Option<serde_json::Value> {
        if content.role == "system" {
            return None;
        }

        let role = match content.role.as_str() {
            "model" => "assistant",
            _ => "user",
        };

        let text = content.joined_text();
        if text.is_empty() {
            return None;
        }

        Some(json!({
            "role": role,
            "content": [{ "type": "text", "text": text }]
        }))
    }

    fn parse_anthropic_response(response: &serde_json::Value) -> Result<Content, ModelError> {
        let content_blocks = response["content"].as_array().ok_or_else(|| {
            ModelError::InvalidResponse("no content in Anthropic response".to_string())
        })?;

        let mut parts = Vec::new();
        for block in content_blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                        parts.push(Part::Text(text.to_string()));
                    }
                }
                Some("thinking") => {
                    if let Some(thinking) = block["thinking"].as_str().filter(|t| !t.is_empty()) {
                        parts.push(Part::Thinking(thinking.to_string()));
                    }
                }
                _ => {}
            }
        }

        if let Some(stop_reason) = response["stop_reason"].as_str() {
            log::debug!("Anthropic stop reason: {}", stop_reason);
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for AnthropicModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/messages", self.base_url);

        let messages: Vec<serde_json::Value> = history
            .iter()
            .filter_map(Self::content_to_anthropic_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages,
            "max_tokens": config.and_then(|c| c.max_output_tokens).unwrap_or(4096)
        });

        if let Some(sys) = Self::extract_system_message(history) {
            body["system"] = json!(sys);
        }
        if let Some(temp) = config.and_then(|c| c.temperature) {
            body["temperature"] = json!(temp);
        }

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response("anthropic", resp).await);
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("Anthropic response: {}", resp_json);

        Self::parse_anthropic_response(&resp_json)
    }
}
