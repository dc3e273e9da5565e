// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation
//!
//! Ollama and Groq expose the same wire format, so they share this client
//! with a different base URL and key.

use super::{error_from_response, Content, GenerationConfig, Model, Part};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// OpenAI-compatible chat model
pub struct OpenAIModel {
    client: Client,
    api_key: Option<String>,
    model_name: String,
    base_url: String,
    provider: &'static str,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("openai".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key: Some(api_key),
            model_name,
            base_url,
            provider: "openai",
        })
    }

    /// Local Ollama server; `OLLAMA_BASE_URL` defaults to `http://localhost:11434`.
    pub fn ollama(model_name: String) -> Self {
        let host =
            env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        Self {
            client: Client::new(),
            api_key: None,
            model_name,
            base_url: format!("{}/v1", host.trim_end_matches('/')),
            provider: "ollama",
        }
    }

    /// Groq cloud; requires `GROQ_API_KEY`.
    pub fn groq(model_name: String) -> Result<Self, ModelError> {
        let api_key =
            env::var("GROQ_API_KEY").map_err(|_| ModelError::ApiKeyMissing("groq".to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key: Some(api_key),
            model_name,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            provider: "groq",
        })
    }

    /// Convert internal Content to OpenAI message format
    fn content_to_openai_message(content: &Content) -> serde_json::Value {
        let role = match content.role.as_str() {
            "system" => "system",
            "user" => "user",
            "model" => "assistant",
            other => other,
        };

        json!({
            "role": role,
            "content": content.joined_text()
        })
    }

    fn build_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }
        body
    }

    /// Parse OpenAI response into Content
    fn parse_openai_response(response: &serde_json::Value) -> Result<Content, ModelError> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let message = &choice["message"];
        let mut parts = Vec::new();

        // Reasoning models served through Ollama/Groq put thoughts here
        if let Some(reasoning) = message["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                parts.push(Part::Thinking(reasoning.to_string()));
            }
        }

        if let Some(content) = message["content"].as_str() {
            if !content.is_empty() {
                parts.push(Part::Text(content.to_string()));
            }
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config);

        log::debug!(
            "{} request body: {}",
            self.provider,
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(self.provider, resp).await);
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("{} response: {}", self.provider, resp_json);

        Self::parse_openai_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_to_openai_user_message() {
        let content = Content::text("user", "Hello");

        let msg = OpenAIModel::content_to_openai_message(&content);
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello");
    }

    #[test]
    fn test_content_to_openai_assistant_message() {
        let content = Content::text("model", "I can help");

        let msg = OpenAIModel::content_to_openai_message(&content);
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["content"], "I can help");
    }

    #[test]
    fn test_build_body_applies_generation_config() {
        let model = OpenAIModel::ollama("qwen3:0.6b".to_string());
        let config = GenerationConfig {
            temperature: Some(0.1),
            max_output_tokens: Some(256),
            top_p: None,
        };
        let body = model.build_body(&[Content::text("user", "hi")], Some(&config));

        assert_eq!(body["model"], "qwen3:0.6b");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_ollama_base_url() {
        let model = OpenAIModel::ollama("llama3".to_string());
        assert!(model.base_url.ends_with("/v1"));
        assert!(model.api_key.is_none());
    }

    #[test]
    fn test_parse_openai_text_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"next_stage\": \"extract\"}"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.role, "model");
        assert_eq!(content.joined_text(), "{\"next_stage\": \"extract\"}");
    }

    #[test]
    fn test_parse_openai_reasoning_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "classify",
                    "reasoning_content": "no document type yet"
                }
            }]
        });

        let content = OpenAIModel::parse_openai_response(&response).unwrap();
        assert_eq!(content.parts.len(), 2);
        assert!(matches!(&content.parts[0], Part::Thinking(t) if t == "no document type yet"));
        assert_eq!(content.joined_text(), "classify");
    }

    #[test]
    fn test_parse_openai_without_choices() {
        let result = OpenAIModel::parse_openai_response(&json!({"choices": []}));
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }
}
