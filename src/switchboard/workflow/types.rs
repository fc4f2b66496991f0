// SPDX-License-Identifier: MIT

//! YAML schema types for declarative graph definitions
//!
//! ```yaml
//! name: drafting
//! entry: generate
//! state:
//!   trials: { type: integer, default: 0 }
//! steps:
//!   - id: generate
//!     uses: write_draft
//!   - id: verify
//!     uses: check_draft
//! edges:
//!   - { from: generate, to: verify }
//! routes:
//!   - from: verify
//!     branches:
//!       - { when: "sendable", to: END }
//!       - { when: "trials < max_trials", to: generate }
//!     default: END
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::switchboard::workflow::graph::{Strictness, END};
use crate::switchboard::workflow::state::StateSchema;

/// Top-level graph definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub entry: String,
    #[serde(default)]
    pub state: StateSchema,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    /// Overrides the engine's step limit for this graph
    pub recursion_limit: Option<u32>,
    pub strictness: Option<Strictness>,
}

/// A step; exactly one of `uses`, `agent`, `set` or `graph` must be given
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepDefinition {
    pub id: String,
    /// Name of a step registered in code
    pub uses: Option<String>,
    /// Inline LLM step
    pub agent: Option<AgentStepDefinition>,
    /// Literal update
    pub set: Option<Map<String, Value>>,
    /// Nested graph file, relative to this file
    pub graph: Option<GraphReference>,
    /// Time limit; on expiry the step degrades with an empty update
    pub timeout_secs: Option<u64>,
}

/// Borrowed view of what a step definition asks for
#[derive(Debug, Clone, Copy)]
pub enum StepKind<'a> {
    Uses(&'a str),
    Agent(&'a AgentStepDefinition),
    Set(&'a Map<String, Value>),
    Graph(&'a GraphReference),
}

impl StepDefinition {
    pub fn kind(&self) -> Result<StepKind<'_>, String> {
        let mut kinds = Vec::new();
        if let Some(name) = &self.uses {
            kinds.push(StepKind::Uses(name));
        }
        if let Some(agent) = &self.agent {
            kinds.push(StepKind::Agent(agent));
        }
        if let Some(update) = &self.set {
            kinds.push(StepKind::Set(update));
        }
        if let Some(graph) = &self.graph {
            kinds.push(StepKind::Graph(graph));
        }
        match kinds.as_slice() {
            [one] => Ok(*one),
            [] => Err(format!(
                "step '{}' needs one of uses, agent, set or graph",
                self.id
            )),
            _ => Err(format!(
                "step '{}' sets more than one of uses, agent, set or graph",
                self.id
            )),
        }
    }
}

/// Single-turn LLM step: reads `input`, writes the reply to `output`
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentStepDefinition {
    pub instructions: String,
    #[serde(default)]
    pub model: ModelDefinition,
    #[serde(default = "default_input_key")]
    pub input: String,
    #[serde(default = "default_output_key")]
    pub output: String,
}

fn default_input_key() -> String {
    "query".to_string()
}

fn default_output_key() -> String {
    "ai_response".to_string()
}

/// Model configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ModelDefinition {
    /// Provider is optional - can be inferred from MODEL_PROVIDER env var
    pub provider: Option<String>,
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphReference {
    pub file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
}

/// Conditional routing after a step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouteDefinition {
    pub from: String,
    /// Checked in order; the first true condition wins
    #[serde(default)]
    pub branches: Vec<BranchDefinition>,
    /// Target when no branch matches
    pub default: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BranchDefinition {
    pub when: String,
    pub to: String,
}

/// Map the spellings accepted for the terminal node onto [`END`]
pub fn resolve_target(name: &str) -> String {
    match name {
        "END" | "end" | END => END.to_string(),
        other => other.to_string(),
    }
}
