// SPDX-License-Identifier: MIT

//! Graph definition
//!
//! A [`GraphBuilder`] collects named steps, the entry step and edges. Nothing
//! runs until it is compiled into a [`CompiledGraph`](super::CompiledGraph).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adk::error::GraphDefinitionError;
use crate::switchboard::checkpoint::Checkpointer;
use crate::switchboard::config::EngineConfig;
use crate::switchboard::workflow::router::Router;
use crate::switchboard::workflow::state::StateSchema;
use crate::switchboard::workflow::step::Step;

/// Synthetic terminal node. Routing here finishes the run.
pub const END: &str = "__end__";

/// Step limit applied when neither the graph nor the call sets one
pub const DEFAULT_RECURSION_LIMIT: u32 = 25;

/// How `compile()` treats steps that can never run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Log unreachable steps and carry on
    #[default]
    Warn,
    /// Refuse to compile
    Deny,
}

impl std::str::FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Strictness::Warn),
            "deny" => Ok(Strictness::Deny),
            other => Err(format!("unknown strictness '{}', expected warn or deny", other)),
        }
    }
}

/// Outgoing edge of a step
#[derive(Clone)]
pub enum Edge {
    /// Always continue to the named step
    Direct(String),
    /// Ask the router for a label and follow the matching target
    Conditional {
        router: Arc<dyn Router>,
        labels: BTreeMap<String, String>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { labels, .. } => f
                .debug_struct("Conditional")
                .field("labels", labels)
                .finish_non_exhaustive(),
        }
    }
}

impl Edge {
    /// Every step this edge can lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { labels, .. } => labels.values().map(String::as_str).collect(),
        }
    }
}

/// Collects the pieces of a graph before compilation
pub struct GraphBuilder {
    pub(super) name: String,
    pub(super) schema: StateSchema,
    pub(super) steps: HashMap<String, Arc<dyn Step>>,
    pub(super) order: Vec<String>,
    pub(super) entry: Option<String>,
    pub(super) edges: Vec<(String, Edge)>,
    pub(super) checkpointer: Option<Arc<dyn Checkpointer>>,
    pub(super) strictness: Strictness,
    pub(super) recursion_limit: u32,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::default(),
            steps: HashMap::new(),
            order: Vec::new(),
            entry: None,
            edges: Vec::new(),
            checkpointer: None,
            strictness: Strictness::default(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Persist every finished run under its thread id
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Apply engine-wide settings
    pub fn configure(self, config: &EngineConfig) -> Self {
        self.with_strictness(config.strictness)
            .with_recursion_limit(config.recursion_limit)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a step under a unique name
    pub fn register_step<S>(&mut self, name: impl Into<String>, step: S) -> Result<&mut Self, GraphDefinitionError>
    where
        S: Step + 'static,
    {
        self.register_shared(name, Arc::new(step))
    }

    /// Register an already shared step
    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        step: Arc<dyn Step>,
    ) -> Result<&mut Self, GraphDefinitionError> {
        let name = name.into();
        if name == END {
            return Err(GraphDefinitionError::ReservedName(name));
        }
        if self.steps.contains_key(&name) {
            return Err(GraphDefinitionError::DuplicateStep(name));
        }
        log::debug!("Graph {}: registered step {}", self.name, name);
        self.order.push(name.clone());
        self.steps.insert(name, step);
        Ok(self)
    }

    pub fn set_entry(&mut self, name: impl Into<String>) -> Result<&mut Self, GraphDefinitionError> {
        let name = name.into();
        if !self.steps.contains_key(&name) {
            return Err(GraphDefinitionError::UnknownStep(name));
        }
        self.entry = Some(name);
        Ok(self)
    }

    /// Unconditional edge; `to` may be [`END`]
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), Edge::Direct(to.into())));
        self
    }

    /// Conditional edge. Every label the router can return must appear in
    /// `labels`; targets may be [`END`].
    pub fn add_conditional_edges<R, I, L, T>(&mut self, from: impl Into<String>, router: R, labels: I) -> &mut Self
    where
        R: Router + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(|(l, t)| (l.into(), t.into()))
            .collect();
        self.edges.push((
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                labels,
            },
        ));
        self
    }
}
