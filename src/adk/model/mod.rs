// SPDX-License-Identifier: MIT

//! Model module - defines the text-generation model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [anthropic] - Anthropic's Claude API
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's chat completions API (also Ollama and Groq)

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models
    Thinking(String),
}

/// Core trait for model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Ollama,
    Groq,
    Anthropic,
    Gemini,
}

impl Provider {
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "groq" => Ok(Self::Groq),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(ModelError::UnsupportedProvider(other.to_string())),
        }
    }

    /// Infer the provider from a model name prefix
    pub fn infer(model_name: &str) -> Self {
        let name = model_name.to_lowercase();
        if name.starts_with("gpt") || name.starts_with("o1") || name.starts_with("o3") {
            Self::OpenAI
        } else if name.starts_with("claude") {
            Self::Anthropic
        } else if name.starts_with("gemini") {
            Self::Gemini
        } else {
            Self::Ollama
        }
    }
}

/// Which model to talk to and how
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: Provider,
    pub model_name: String,
    pub generation: GenerationConfig,
}

impl ModelSettings {
    pub const DEFAULT_MODEL: &'static str = "qwen3:0.6b";

    /// Resolve settings from the environment.
    ///
    /// Model name: explicit > `MODEL_NAME` > [`Self::DEFAULT_MODEL`].
    /// Provider: `MODEL_PROVIDER` > inferred from the model name.
    pub fn from_env(model_name: Option<String>) -> Result<Self, ModelError> {
        let model_name = model_name
            .or_else(|| env::var("MODEL_NAME").ok())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let provider = match env::var("MODEL_PROVIDER") {
            Ok(p) if !p.trim().is_empty() => Provider::parse(&p)?,
            _ => Provider::infer(&model_name),
        };

        let temperature = env::var("MODEL_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.1);
        let max_output_tokens = env::var("MODEL_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4096);

        Ok(Self {
            provider,
            model_name,
            generation: GenerationConfig {
                temperature: Some(temperature),
                max_output_tokens: Some(max_output_tokens),
                top_p: None,
            },
        })
    }
}

/// Build a model instance for the given settings
pub fn create_model(settings: &ModelSettings) -> Result<Arc<dyn Model>, ModelError> {
    log::info!(
        "Using provider: {:?} with model: {}",
        settings.provider,
        settings.model_name
    );

    let name = settings.model_name.clone();
    let model: Arc<dyn Model> = match settings.provider {
        Provider::OpenAI => Arc::new(openai::OpenAIModel::new(name)?),
        Provider::Ollama => Arc::new(openai::OpenAIModel::ollama(name)),
        Provider::Groq => Arc::new(openai::OpenAIModel::groq(name)?),
        Provider::Anthropic => Arc::new(anthropic::AnthropicModel::new(name)?),
        Provider::Gemini => Arc::new(gemini::GeminiModel::new(name)?),
    };
    Ok(model)
}

/// Turn a non-success HTTP response into a [`ModelError`]
pub(crate) async fn error_from_response(provider: &str, resp: reqwest::Response) -> ModelError {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after_secs = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return ModelError::RateLimited { retry_after_secs };
    }
    let message = resp.text().await.unwrap_or_default();
    ModelError::api(provider, status.as_u16(), message)
}
