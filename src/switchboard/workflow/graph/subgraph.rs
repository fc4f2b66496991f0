// SPDX-License-Identifier: MIT

//! Compiled graphs used as steps of another graph

use async_trait::async_trait;
use std::sync::Arc;

use crate::adk::error::ExecutionError;
use crate::switchboard::workflow::state::{PartialState, ReducerType, State, StateSchema};
use crate::switchboard::workflow::step::{Step, StepContext, StepOutcome};

use super::compiler::CompiledGraph;

/// Runs a whole compiled graph as a single step.
///
/// The inner graph starts from the parent's state, draws on the parent's
/// step budget, and hands back the combined update of the steps it ran. It
/// never touches the checkpoint store; only the outermost graph persists.
///
/// Keys the inner schema appends to or merges, but the parent reduces some
/// other way, come back as their full inner value so the parent ends up with
/// what the inner graph would have produced on its own.
pub struct SubgraphStep {
    graph: Arc<CompiledGraph>,
}

impl SubgraphStep {
    pub fn new(graph: Arc<CompiledGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    fn settle(&self, mut delta: PartialState, inner: &State, parent: &StateSchema) -> PartialState {
        let schema = self.graph.schema();
        let whole: Vec<String> = delta
            .keys()
            .filter(|key| {
                let reducer = schema.reducer(key);
                reducer != ReducerType::Replace && parent.reducer(key) != reducer
            })
            .cloned()
            .collect();
        for key in whole {
            if let Some(value) = inner.get(&key) {
                delta.insert(key, value.clone());
            }
        }
        delta
    }
}

impl CompiledGraph {
    /// Wrap this graph so it can be registered as a step elsewhere
    pub fn as_step(self: &Arc<Self>) -> SubgraphStep {
        SubgraphStep::new(Arc::clone(self))
    }
}

#[async_trait]
impl Step for SubgraphStep {
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome {
        match self.execute(state, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome::degraded(PartialState::new(), e.to_string()),
        }
    }

    async fn execute(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, ExecutionError> {
        log::debug!("Entering sub-graph {} from {}", self.graph.name(), ctx.step);
        let result = self.graph.run_nested(state, ctx).await?;

        let degraded: Vec<String> = result
            .steps
            .iter()
            .filter_map(|r| r.degraded.as_ref().map(|why| format!("{}: {}", r.step, why)))
            .collect();
        let delta = self.settle(result.delta, &result.state, &ctx.schema);
        if degraded.is_empty() {
            Ok(StepOutcome::Ok(delta))
        } else {
            Ok(StepOutcome::degraded(delta, degraded.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switchboard::checkpoint::InMemoryCheckpointer;
    use crate::switchboard::workflow::graph::{GraphBuilder, RunConfig, END};
    use crate::switchboard::workflow::state::{FieldType, StateFieldDef};
    use crate::switchboard::workflow::step::{sync_step, Constant};
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new()
            .field("log", StateFieldDef::new(FieldType::List).append(None))
            .field("depth", StateFieldDef::new(FieldType::Integer).with_default(7))
    }

    fn inner() -> Arc<CompiledGraph> {
        let mut b = GraphBuilder::new("inner").with_schema(schema());
        b.register_step("x", Constant(PartialState::new().set("log", "x")))
            .unwrap();
        b.register_step("y", Constant(PartialState::new().set("log", "y")))
            .unwrap();
        b.set_entry("x").unwrap();
        b.add_edge("x", "y");
        b.add_edge("y", END);
        Arc::new(b.compile().unwrap())
    }

    #[tokio::test]
    async fn test_subgraph_returns_delta_only() {
        let inner = inner();
        let mut outer = GraphBuilder::new("outer").with_schema(schema());
        outer
            .register_step("first", Constant(PartialState::new().set("log", "first")))
            .unwrap();
        outer.register_step("nested", inner.as_step()).unwrap();
        outer.set_entry("first").unwrap();
        outer.add_edge("first", "nested");
        let outer = outer.compile().unwrap();

        let state = outer
            .ainvoke(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap();
        // appended items appear once, not duplicated by the nested run
        assert_eq!(state.list("log"), &[json!("first"), json!("x"), json!("y")]);
    }

    #[tokio::test]
    async fn test_resumed_thread_keeps_inner_appends() {
        let notes = || {
            let mut b = GraphBuilder::new("notes").with_schema(
                StateSchema::new().field("notes", StateFieldDef::new(FieldType::List).append(None)),
            );
            b.register_step("note", Constant(PartialState::new().set("notes", "new")))
                .unwrap();
            b.set_entry("note").unwrap();
            b
        };

        let alone = notes()
            .with_checkpointer(Arc::new(InMemoryCheckpointer::new()))
            .compile()
            .unwrap();

        let mut outer = GraphBuilder::new("outer").with_checkpointer(Arc::new(InMemoryCheckpointer::new()));
        outer
            .register_step("nested", Arc::new(notes().compile().unwrap()).as_step())
            .unwrap();
        outer.set_entry("nested").unwrap();
        let outer = outer.compile().unwrap();

        for _ in 0..2 {
            alone.ainvoke(PartialState::new(), &RunConfig::new("x")).await.unwrap();
            outer.ainvoke(PartialState::new(), &RunConfig::new("x")).await.unwrap();
        }
        let alone = alone.get_state("x").await.unwrap().unwrap();
        let nested = outer.get_state("x").await.unwrap().unwrap();
        assert_eq!(alone.list("notes"), &[json!("new"), json!("new")]);
        assert_eq!(nested.list("notes"), alone.list("notes"));
    }

    #[tokio::test]
    async fn test_subgraph_fills_its_defaults() {
        let inner = inner();
        let mut outer = GraphBuilder::new("outer");
        outer.register_step("nested", inner.as_step()).unwrap();
        outer.set_entry("nested").unwrap();
        let outer = outer.compile().unwrap();

        let state = outer
            .ainvoke(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap();
        assert_eq!(state.integer("depth"), Some(7));
    }

    #[tokio::test]
    async fn test_subgraph_shares_budget() {
        let inner = inner();
        let mut outer = GraphBuilder::new("outer")
            .with_schema(schema())
            .with_recursion_limit(2);
        outer.register_step("nested", inner.as_step()).unwrap();
        outer.set_entry("nested").unwrap();
        let outer = outer.compile().unwrap();

        // nested (1) + x (2) leaves nothing for y
        let err = outer
            .ainvoke(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::StepBudgetExceeded { ref step, .. } if step == "y"));
    }

    #[tokio::test]
    async fn test_subgraph_degradation_bubbles_up() {
        let mut b = GraphBuilder::new("inner");
        b.register_step(
            "flaky",
            sync_step(|_: &State| StepOutcome::degraded(PartialState::new(), "no answer")),
        )
        .unwrap();
        b.set_entry("flaky").unwrap();
        let inner = Arc::new(b.compile().unwrap());

        let mut outer = GraphBuilder::new("outer");
        outer.register_step("nested", inner.as_step()).unwrap();
        outer.set_entry("nested").unwrap();
        let outer = outer.compile().unwrap();

        let out = outer
            .invoke_traced(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap();
        let record = out.degraded().next().unwrap();
        assert_eq!(record.step, "nested");
        assert!(record.degraded.as_ref().unwrap().contains("flaky: no answer"));
    }
}
