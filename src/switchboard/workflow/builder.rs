// SPDX-License-Identifier: MIT

//! Workflow builder - turns YAML definitions into compiled graphs
//!
//! Nested `graph:` steps are built recursively and wrapped as sub-graph
//! steps. Only the outermost graph gets the checkpoint store.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::SwitchboardError;
use crate::adk::model::Model;
use crate::switchboard::checkpoint::Checkpointer;
use crate::switchboard::config::EngineConfig;
use crate::switchboard::workflow::agent_factory::AgentFactory;
use crate::switchboard::workflow::graph::{CompiledGraph, GraphBuilder, SubgraphStep};
use crate::switchboard::workflow::loader::GraphLoader;
use crate::switchboard::workflow::registry::StepRegistry;
use crate::switchboard::workflow::router::ConditionRouter;
use crate::switchboard::workflow::state::PartialState;
use crate::switchboard::workflow::step::{Constant, Step, StepExt};
use crate::switchboard::workflow::types::{resolve_target, GraphDefinition, StepKind};

type BuildFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<CompiledGraph>, SwitchboardError>> + Send + 'a>>;

/// High-level builder for graphs declared in YAML
pub struct Builder {
    loader: GraphLoader,
    registry: StepRegistry,
    config: EngineConfig,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    model: Option<Arc<dyn Model>>,
}

impl Builder {
    pub fn new(registry: StepRegistry, config: EngineConfig) -> Self {
        Self {
            loader: GraphLoader::new(),
            registry,
            config,
            checkpointer: None,
            model: None,
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Use this model for every inline agent step
    pub fn with_model(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// Build a graph from a YAML file
    pub async fn build_graph(&self, path: impl AsRef<Path>) -> Result<Arc<CompiledGraph>, SwitchboardError> {
        let path = path.as_ref().to_path_buf();
        let def = self.loader.load_graph(&path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.build_from_def(&def, base_dir, vec![canonical(&path)], true)
            .await
    }

    /// Build a graph from an already parsed definition. Nested graph
    /// files resolve against `base_dir`.
    pub async fn build_definition(
        &self,
        def: &GraphDefinition,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Arc<CompiledGraph>, SwitchboardError> {
        self.build_from_def(def, base_dir.into(), Vec::new(), true)
            .await
    }

    fn build_from_def<'a>(
        &'a self,
        def: &'a GraphDefinition,
        base_dir: PathBuf,
        stack: Vec<PathBuf>,
        outermost: bool,
    ) -> BuildFuture<'a> {
        Box::pin(async move {
            let mut graph = GraphBuilder::new(def.name.clone())
                .with_schema(def.state.clone())
                .configure(&self.config);
            if let Some(limit) = def.recursion_limit {
                graph = graph.with_recursion_limit(limit);
            }
            if let Some(strictness) = def.strictness {
                graph = graph.with_strictness(strictness);
            }
            if outermost {
                if let Some(cp) = &self.checkpointer {
                    graph = graph.with_checkpointer(cp.clone());
                }
            }

            let factory = AgentFactory::new(self.model.clone());
            for step_def in &def.steps {
                let kind = step_def.kind().map_err(SwitchboardError::config)?;
                let step: Arc<dyn Step> = match kind {
                    StepKind::Uses(name) => self.registry.get(name).await.ok_or_else(|| {
                        SwitchboardError::config(format!(
                            "step '{}' uses unregistered step '{}'",
                            step_def.id, name
                        ))
                    })?,
                    StepKind::Agent(agent_def) => {
                        let step = factory.build(&step_def.id, agent_def)?;
                        // agent steps are always bounded
                        let limit = step_def
                            .timeout_secs
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| self.config.step_timeout());
                        Arc::new(step.timed(limit, PartialState::new()))
                    }
                    StepKind::Set(update) => Arc::new(Constant(PartialState::from(update.clone()))),
                    StepKind::Graph(reference) => {
                        let path = base_dir.join(&reference.file);
                        let key = canonical(&path);
                        if stack.contains(&key) {
                            return Err(SwitchboardError::config(format!(
                                "graph file {} includes itself",
                                path.display()
                            )));
                        }
                        let child_def = self.loader.load_graph(&path)?;
                        let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                        let mut child_stack = stack.clone();
                        child_stack.push(key);
                        let child = self
                            .build_from_def(&child_def, child_dir, child_stack, false)
                            .await?;
                        log::info!("Step '{}' runs sub-graph '{}'", step_def.id, child.name());
                        Arc::new(SubgraphStep::new(child))
                    }
                };

                let step = match (kind, step_def.timeout_secs) {
                    (StepKind::Agent(_), _) | (_, None) => step,
                    (_, Some(secs)) => Arc::new(step.timed(Duration::from_secs(secs), PartialState::new())),
                };
                graph.register_shared(step_def.id.clone(), step)?;
            }

            graph.set_entry(def.entry.clone())?;
            for edge in &def.edges {
                graph.add_edge(edge.from.clone(), resolve_target(&edge.to));
            }
            for route in &def.routes {
                let mut router = ConditionRouter::new(resolve_target(&route.default));
                for branch in &route.branches {
                    router = router
                        .when(&branch.when, resolve_target(&branch.to))
                        .map_err(|e| {
                            SwitchboardError::config(format!(
                                "route from '{}': bad condition '{}': {}",
                                route.from, branch.when, e
                            ))
                        })?;
                }
                // labels are the targets themselves
                let labels: Vec<(String, String)> =
                    router.labels().into_iter().map(|l| (l.clone(), l)).collect();
                graph.add_conditional_edges(route.from.clone(), router, labels);
            }

            let compiled = graph.compile()?;
            log::info!(
                "Built graph '{}' with {} steps",
                def.name,
                def.steps.len()
            );
            Ok(Arc::new(compiled))
        })
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
