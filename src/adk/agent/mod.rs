// SPDX-License-Identifier: MIT

//! Agent module - text-in/text-out agents backed by a model
//!
//! - `LlmAgent` - single-turn LLM agent with a system instruction

mod llm;

pub use llm::LlmAgent;

use crate::adk::error::ModelError;
use async_trait::async_trait;

/// Core agent trait
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the agent name
    fn name(&self) -> &str;

    /// Run the agent with the given input
    async fn run(&self, input: String) -> Result<String, ModelError>;
}
