// SPDX-License-Identifier: MIT

//! LLM Agent - one system instruction, one user turn, text back

use super::Agent;
use crate::adk::error::ModelError;
use crate::adk::model::{Content, GenerationConfig, Model};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LlmAgent {
    pub name: String,
    pub instruction: String,
    pub model: Arc<dyn Model>,
    pub config: Option<GenerationConfig>,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            model,
            config: None,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: String) -> Result<String, ModelError> {
        let history = [Content::system(self.instruction.clone()), Content::user(input)];

        let response = self
            .model
            .generate_content(&history, self.config.as_ref())
            .await?;

        let text = response.text();
        log::debug!(
            "Agent {} returned {} chars",
            self.name,
            text.chars().count()
        );
        if text.trim().is_empty() {
            return Err(ModelError::InvalidResponse(format!(
                "agent {} received an empty response",
                self.name
            )));
        }
        Ok(text)
    }
}
