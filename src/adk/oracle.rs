// SPDX-License-Identifier: MIT

//! Oracle - the text-in/text-out service stages consult
//!
//! Stages never see a [`Model`] directly; they hand a [`Prompt`] to an
//! [`Oracle`] and get the response text back. Any failure comes back as a
//! [`ModelError`], which the calling stage treats as recoverable.

use crate::adk::error::ModelError;
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

/// A single oracle request
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Name of the stage asking, for logging and test doubles
    pub stage: String,
    /// Fixed instruction for this kind of request
    pub instruction: String,
    /// Request-specific text (document excerpt, state summary, ...)
    pub input: String,
}

impl Prompt {
    pub fn new(
        stage: impl Into<String>,
        instruction: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            instruction: instruction.into(),
            input: input.into(),
        }
    }
}

/// Text-generation oracle contract
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, prompt: &Prompt) -> Result<String, ModelError>;
}

/// Oracle backed by a chat [`Model`]
pub struct ModelOracle {
    model: Arc<dyn Model>,
    config: GenerationConfig,
}

impl ModelOracle {
    pub fn new(model: Arc<dyn Model>, config: GenerationConfig) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl Oracle for ModelOracle {
    async fn invoke(&self, prompt: &Prompt) -> Result<String, ModelError> {
        let history = vec![
            Content::text("system", prompt.instruction.clone()),
            Content::text("user", prompt.input.clone()),
        ];

        log::debug!("Oracle request from stage {}", prompt.stage);
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let text = response.joined_text();
        if text.trim().is_empty() {
            log::warn!("Oracle returned empty response to stage {}", prompt.stage);
            return Err(ModelError::InvalidResponse("empty response".to_string()));
        }

        log::debug!(
            "Oracle response to {} (length: {}, preview: '{}')",
            prompt.stage,
            text.len(),
            text.chars().take(100).collect::<String>()
        );
        Ok(text)
    }
}
