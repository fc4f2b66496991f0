// SPDX-License-Identifier: MIT

//! Agent factory - turns inline `agent:` definitions into steps
//!
//! The model is chosen from the definition, then the `MODEL_PROVIDER` and
//! `MODEL_NAME` environment variables. A model handed to the factory
//! directly takes precedence over all of them.

use async_trait::async_trait;
use std::env;
use std::sync::Arc;

use crate::adk::agent::{Agent, LlmAgent};
use crate::adk::error::SwitchboardError;
use crate::adk::model::openai::OpenAIModel;
use crate::adk::model::{GenerationConfig, Model};
use crate::switchboard::workflow::state::{PartialState, State};
use crate::switchboard::workflow::step::{Step, StepContext, StepOutcome};
use crate::switchboard::workflow::types::{AgentStepDefinition, ModelDefinition};

const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

pub struct AgentFactory {
    model: Option<Arc<dyn Model>>,
}

impl AgentFactory {
    pub fn new(model: Option<Arc<dyn Model>>) -> Self {
        Self { model }
    }

    /// Build the step for an inline agent definition
    pub fn build(&self, id: &str, def: &AgentStepDefinition) -> Result<AgentStep, SwitchboardError> {
        let model = match &self.model {
            Some(model) => model.clone(),
            None => create_model(&def.model)?,
        };
        let mut agent = LlmAgent::new(id, def.instructions.clone(), model);
        if def.model.temperature.is_some() || def.model.max_output_tokens.is_some() {
            agent = agent.with_config(GenerationConfig {
                temperature: def.model.temperature,
                max_output_tokens: def.model.max_output_tokens,
                top_p: None,
            });
        }
        log::info!("Building agent step '{}' ({} -> {})", id, def.input, def.output);
        Ok(AgentStep::new(Arc::new(agent), def.input.clone(), def.output.clone()))
    }
}

fn create_model(def: &ModelDefinition) -> Result<Arc<dyn Model>, SwitchboardError> {
    let model_name = def
        .model_name
        .clone()
        .or_else(|| env::var("MODEL_NAME").ok())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

    let provider = def
        .provider
        .clone()
        .or_else(|| env::var("MODEL_PROVIDER").ok())
        .unwrap_or_else(|| "openai".to_string());

    log::debug!("Using provider '{}' with model '{}'", provider, model_name);

    match provider.to_ascii_lowercase().as_str() {
        "openai" | "" => Ok(Arc::new(OpenAIModel::new(model_name)?)),
        other => Err(SwitchboardError::config(format!(
            "Unknown model provider: {}",
            other
        ))),
    }
}

/// Sends one state field to an agent and stores the reply in another
pub struct AgentStep {
    agent: Arc<dyn Agent>,
    input_key: String,
    output_key: String,
}

impl AgentStep {
    pub fn new(agent: Arc<dyn Agent>, input_key: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            agent,
            input_key: input_key.into(),
            output_key: output_key.into(),
        }
    }
}

#[async_trait]
impl Step for AgentStep {
    async fn run(&self, state: &State, _ctx: &StepContext) -> StepOutcome {
        let Some(input) = state.text(&self.input_key) else {
            return StepOutcome::degraded(
                PartialState::new(),
                format!("agent {} has no input in '{}'", self.agent.name(), self.input_key),
            );
        };

        match self.agent.run(input.to_string()).await {
            Ok(reply) => StepOutcome::Ok(PartialState::new().set(self.output_key.clone(), reply)),
            Err(e) => {
                log::error!("Agent {} failed: {}", self.agent.name(), e);
                StepOutcome::degraded(
                    PartialState::new(),
                    format!("agent {} failed: {}", self.agent.name(), e),
                )
            }
        }
    }
}
