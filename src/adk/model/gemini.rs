// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{error_from_response, Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) to be set.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key = env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .map_err(|_| ModelError::ApiKeyMissing("gemini".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
        })
    }

    fn build_body(history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = history
            .iter()
            .filter(|c| c.role != "system")
            .map(|c| {
                let role = if c.role == "model" { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": c.joined_text() }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });

        if let Some(sys) = history.iter().find(|c| c.role == "system") {
            body["systemInstruction"] = json!({ "parts": [{ "text": sys.joined_text() }] });
        }

        if let Some(cfg) = config {
            let mut generation = json!({});
            if let Some(temp) = cfg.temperature {
                generation["temperature"] = json!(temp);
            }
            if let Some(max) = cfg.max_output_tokens {
                generation["maxOutputTokens"] = json!(max);
            }
            if let Some(top_p) = cfg.top_p {
                generation["topP"] = json!(top_p);
            }
            body["generationConfig"] = generation;
        }
        body
    }

    fn parse_gemini_response(response: &serde_json::Value) -> Result<Content, ModelError> {
        let parts_json = response["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .and_then(|c| c["content"]["parts"].as_array())
            .ok_or_else(|| ModelError::InvalidResponse("no candidates in Gemini response".to_string()))?;

        let parts = parts_json.iter().filter_map(parse_gemini_part).collect();
        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

/// Parse a Gemini API JSON part; thought parts carry `"thought": true`.
fn parse_gemini_part(p: &serde_json::Value) -> Option<Part> {
    let text = p["text"].as_str().filter(|t| !t.is_empty())?;
    if p["thought"].as_bool().unwrap_or(false) {
        Some(Part::Thinking(text.to_string()))
    } else {
        Some(Part::Text(text.to_string()))
    }
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model_name
        );
        let body = Self::build_body(history, config);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from_response("gemini", resp).await);
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);

        Self::parse_gemini_response(&resp_json)
    }
}
