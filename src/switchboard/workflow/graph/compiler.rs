// SPDX-License-Identifier: MIT

//! Structural validation and compilation of graphs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::adk::error::GraphDefinitionError;
use crate::switchboard::checkpoint::Checkpointer;
use crate::switchboard::workflow::state::StateSchema;
use crate::switchboard::workflow::step::Step;

use super::builder::{Edge, GraphBuilder, Strictness, END};

/// An immutable, validated graph ready to run.
///
/// Cheap to share: wrap it in an `Arc` and invoke it from as many tasks as
/// needed, each with its own thread id.
pub struct CompiledGraph {
    pub(super) name: String,
    pub(super) schema: Arc<StateSchema>,
    pub(super) steps: HashMap<String, Arc<dyn Step>>,
    pub(super) entry: String,
    pub(super) edges: HashMap<String, Edge>,
    pub(super) checkpointer: Option<Arc<dyn Checkpointer>>,
    pub(super) recursion_limit: u32,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("recursion_limit", &self.recursion_limit)
            .finish_non_exhaustive()
    }
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    pub fn step_names(&self) -> impl Iterator<Item = &String> {
        self.steps.keys()
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }
}

impl GraphBuilder {
    /// Validate the structure and freeze it.
    ///
    /// Steps without an outgoing edge finish the run when they complete.
    pub fn compile(self) -> Result<CompiledGraph, GraphDefinitionError> {
        self.schema
            .validate()
            .map_err(GraphDefinitionError::InvalidSchema)?;

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| GraphDefinitionError::MissingEntry(self.name.clone()))?;

        let mut edges: HashMap<String, Edge> = HashMap::new();
        for (from, edge) in &self.edges {
            if !self.steps.contains_key(from) {
                return Err(GraphDefinitionError::UnknownSource(from.clone()));
            }
            match edge {
                Edge::Direct(to) => {
                    if to != END && !self.steps.contains_key(to) {
                        return Err(GraphDefinitionError::DanglingEdge {
                            from: from.clone(),
                            to: to.clone(),
                        });
                    }
                }
                Edge::Conditional { labels, .. } => {
                    if labels.is_empty() {
                        return Err(GraphDefinitionError::EmptyLabelMap(from.clone()));
                    }
                    for (label, target) in labels {
                        if target != END && !self.steps.contains_key(target) {
                            return Err(GraphDefinitionError::DanglingLabel {
                                from: from.clone(),
                                label: label.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
            }
            if edges.insert(from.clone(), edge.clone()).is_some() {
                return Err(GraphDefinitionError::ConflictingEdges(from.clone()));
            }
        }

        let unreachable = unreachable_steps(&self.order, &entry, &edges);
        if !unreachable.is_empty() {
            match self.strictness {
                Strictness::Deny => return Err(GraphDefinitionError::Unreachable(unreachable)),
                Strictness::Warn => log::warn!(
                    "Graph {}: steps never reached from {}: {:?}",
                    self.name,
                    entry,
                    unreachable
                ),
            }
        }

        log::info!(
            "Compiled graph {} ({} steps, entry {})",
            self.name,
            self.steps.len(),
            entry
        );

        Ok(CompiledGraph {
            name: self.name,
            schema: Arc::new(self.schema),
            steps: self.steps,
            entry,
            edges,
            checkpointer: self.checkpointer,
            recursion_limit: self.recursion_limit,
        })
    }
}

/// Registered steps that no path from the entry reaches, in registration order
fn unreachable_steps(order: &[String], entry: &str, edges: &HashMap<String, Edge>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::from([entry]);
    while let Some(step) = queue.pop_front() {
        if step == END || !seen.insert(step) {
            continue;
        }
        if let Some(edge) = edges.get(step) {
            queue.extend(edge.targets());
        }
    }
    order
        .iter()
        .filter(|name| !seen.contains(name.as_str()))
        .cloned()
        .collect()
}
