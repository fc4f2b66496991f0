// SPDX-License-Identifier: MIT

//! Graph executor
//!
//! Runs a compiled graph for one thread: load the thread's snapshot, merge
//! the caller's input, walk steps from the entry until [`END`], then save.
//! An abort (bad route, exhausted budget, type violation) leaves the stored
//! snapshot untouched.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;

use crate::adk::error::ExecutionError;
use crate::switchboard::checkpoint::Checkpoint;
use crate::switchboard::workflow::state::{FieldType, PartialState, State};
use crate::switchboard::workflow::step::{StepBudget, StepContext, StepOutcome};

use super::builder::{Edge, END};
use super::compiler::CompiledGraph;

/// Field that receives the reason of a degraded step unless the step set
/// it itself
pub const OBSERVATION_KEY: &str = "observation";

/// Per-invocation settings
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub thread_id: String,
    /// Overrides the graph's step limit for this call
    pub recursion_limit: Option<u32>,
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            recursion_limit: None,
        }
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = Some(limit);
        self
    }
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step: String,
    /// Why the step fell back, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

/// Final state plus the steps that produced it
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub state: State,
    pub steps: Vec<StepRecord>,
}

impl RunOutput {
    pub fn degraded(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|r| r.degraded.is_some())
    }
}

/// Result of the step loop before anything is persisted
pub(crate) struct LoopResult {
    pub state: State,
    /// Every update applied during the loop, folded into one
    pub delta: PartialState,
    pub steps: Vec<StepRecord>,
}

impl CompiledGraph {
    /// Run the graph for `config.thread_id` and return the final state
    pub async fn ainvoke(&self, input: PartialState, config: &RunConfig) -> Result<State, ExecutionError> {
        Ok(self.invoke_traced(input, config).await?.state)
    }

    /// Like [`ainvoke`](Self::ainvoke), also reporting which steps ran
    pub async fn invoke_traced(&self, input: PartialState, config: &RunConfig) -> Result<RunOutput, ExecutionError> {
        let thread_id = config.thread_id.as_str();
        let mut state = match &self.checkpointer {
            Some(cp) => match cp.load(thread_id).await? {
                Some(snapshot) => {
                    log::debug!("Resuming thread {} from {}", thread_id, snapshot.saved_at);
                    snapshot.state
                }
                None => State::from_schema(&self.schema),
            },
            None => State::from_schema(&self.schema),
        };
        state.apply(&input, &self.schema)?;

        let budget = StepBudget::new(config.recursion_limit.unwrap_or(self.recursion_limit));
        log::info!(
            "Invoking graph {} for thread {} (budget {})",
            self.name,
            thread_id,
            budget.limit()
        );
        let result = self
            .run_loop(state, thread_id, &budget, PartialState::new())
            .await?;

        if let Some(cp) = &self.checkpointer {
            cp.save(Checkpoint {
                thread_id: thread_id.to_string(),
                graph: self.name.clone(),
                state: result.state.clone(),
                saved_at: Utc::now(),
            })
            .await?;
        }

        Ok(RunOutput {
            state: result.state,
            steps: result.steps,
        })
    }

    /// Blocking form of [`ainvoke`](Self::ainvoke). Must not be called from
    /// inside an async runtime.
    pub fn invoke(&self, input: PartialState, config: &RunConfig) -> Result<State, ExecutionError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(ExecutionError::Runtime(std::io::Error::new(
                std::io::ErrorKind::Other,
                "invoke called from inside an async runtime, use ainvoke",
            )));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.ainvoke(input, config))
    }

    /// Stored state of a thread, if any run completed for it
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<State>, ExecutionError> {
        match &self.checkpointer {
            Some(cp) => Ok(cp.load(thread_id).await?.map(|c| c.state)),
            None => Ok(None),
        }
    }

    /// Run this graph on top of a parent's state, sharing its budget. Nothing
    /// is loaded or saved; the caller merges the returned delta.
    pub(crate) async fn run_nested(&self, parent: &State, ctx: &StepContext) -> Result<LoopResult, ExecutionError> {
        // keys the parent never set still get this graph's defaults
        let seed: PartialState = State::from_schema(&self.schema)
            .into_map()
            .into_iter()
            .filter(|(key, _)| !parent.contains(key))
            .collect();
        let mut state = parent.clone();
        state.apply(&seed, &self.schema)?;
        self.run_loop(state, &ctx.thread_id, &ctx.budget, seed).await
    }

    async fn run_loop(
        &self,
        mut state: State,
        thread_id: &str,
        budget: &StepBudget,
        mut delta: PartialState,
    ) -> Result<LoopResult, ExecutionError> {
        let mut steps = Vec::new();
        let mut current = self.entry.clone();

        while current != END {
            if !budget.take() {
                log::error!(
                    "Graph {} exhausted its budget of {} before {}",
                    self.name,
                    budget.limit(),
                    current
                );
                return Err(ExecutionError::StepBudgetExceeded {
                    limit: budget.limit(),
                    step: current,
                });
            }

            // compile() guarantees every reachable name is registered
            let step = &self.steps[&current];
            let ctx = StepContext {
                thread_id: thread_id.to_string(),
                graph: self.name.clone(),
                step: current.clone(),
                budget: budget.clone(),
                schema: Arc::clone(&self.schema),
            };

            log::debug!("Executing step: {}", current);
            let outcome = match AssertUnwindSafe(step.execute(&state, &ctx))
                .catch_unwind()
                .await
            {
                Ok(result) => result?,
                Err(panic) => {
                    let reason = format!("step {} panicked: {}", current, panic_message(panic.as_ref()));
                    StepOutcome::degraded(PartialState::new(), reason)
                }
            };

            let (mut update, reason) = outcome.into_parts();
            if let Some(reason) = &reason {
                log::warn!("Step {} degraded: {}", current, reason);
                if !update.contains_key(OBSERVATION_KEY) && self.observation_is_text() {
                    update.insert(OBSERVATION_KEY, reason.clone());
                }
            }

            state.apply(&update, &self.schema)?;
            delta.absorb(update, &self.schema);
            steps.push(StepRecord {
                step: current.clone(),
                degraded: reason,
            });

            current = self.next_step(&current, &state)?;
        }

        log::info!("Graph {} finished after {} steps", self.name, steps.len());
        Ok(LoopResult { state, delta, steps })
    }

    fn next_step(&self, current: &str, state: &State) -> Result<String, ExecutionError> {
        match self.edges.get(current) {
            None => Ok(END.to_string()),
            Some(Edge::Direct(to)) => Ok(to.clone()),
            Some(Edge::Conditional { router, labels }) => {
                let label = router.route(state);
                log::debug!("Router after {} chose {}", current, label);
                labels
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| ExecutionError::InvalidRoute {
                        step: current.to_string(),
                        label,
                        allowed: labels.keys().cloned().collect(),
                    })
            }
        }
    }

    fn observation_is_text(&self) -> bool {
        self.schema
            .get(OBSERVATION_KEY)
            .map_or(true, |def| def.field_type == FieldType::Text)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
