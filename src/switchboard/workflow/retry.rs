// SPDX-License-Identifier: MIT

//! Bounded generate/verify loop
//!
//! A generate step produces an artifact and bumps `trials`; a verify step
//! sets `sendable`. [`VerifyRouter`] then accepts, retries or gives up once
//! `trials` reaches `max_trials`. The loop always terminates: `trials` only
//! grows and every non-accepting branch after the cap leads to give-up.

use async_trait::async_trait;

use crate::adk::error::{ExecutionError, GraphDefinitionError};
use crate::switchboard::config::EngineConfig;
use crate::switchboard::workflow::graph::GraphBuilder;
use crate::switchboard::workflow::router::Router;
use crate::switchboard::workflow::state::{PartialState, State};
use crate::switchboard::workflow::step::{Step, StepContext, StepOutcome};

pub const ACCEPT: &str = "accept";
pub const RETRY: &str = "retry";
pub const GIVE_UP: &str = "give_up";

pub const DEFAULT_MAX_TRIALS: i64 = 3;

/// State keys the loop reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryKeys {
    pub sendable: String,
    pub trials: String,
    pub max_trials: String,
}

impl Default for RetryKeys {
    fn default() -> Self {
        Self {
            sendable: "sendable".to_string(),
            trials: "trials".to_string(),
            max_trials: "max_trials".to_string(),
        }
    }
}

/// Routes after the verify step
#[derive(Debug, Clone)]
pub struct VerifyRouter {
    keys: RetryKeys,
    default_max: i64,
}

impl VerifyRouter {
    pub fn new(default_max: i64) -> Self {
        Self {
            keys: RetryKeys::default(),
            default_max,
        }
    }

    /// Cap taken from the engine's `max_trials`
    pub fn configured(config: &EngineConfig) -> Self {
        Self::new(config.max_trials)
    }

    pub fn with_keys(mut self, keys: RetryKeys) -> Self {
        self.keys = keys;
        self
    }

    fn max_trials(&self, state: &State) -> i64 {
        state
            .integer(&self.keys.max_trials)
            .unwrap_or(self.default_max)
    }
}

impl Default for VerifyRouter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIALS)
    }
}

impl Router for VerifyRouter {
    fn route(&self, state: &State) -> String {
        let trials = state.integer(&self.keys.trials).unwrap_or(0);
        let label = if state.flag(&self.keys.sendable) == Some(true) {
            ACCEPT
        } else if trials < self.max_trials(state) {
            RETRY
        } else {
            GIVE_UP
        };
        label.to_string()
    }
}

/// Wraps a generate step so every attempt counts, even a degraded one
pub struct Counted<S> {
    inner: S,
    trials_key: String,
}

impl<S: Step> Counted<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            trials_key: RetryKeys::default().trials,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.trials_key = key.into();
        self
    }

    fn count(&self, state: &State, outcome: StepOutcome) -> StepOutcome {
        let next = state.integer(&self.trials_key).unwrap_or(0) + 1;
        match outcome {
            StepOutcome::Ok(update) => StepOutcome::Ok(update.set(self.trials_key.clone(), next)),
            StepOutcome::Degraded { update, reason } => StepOutcome::Degraded {
                update: update.set(self.trials_key.clone(), next),
                reason,
            },
        }
    }
}

#[async_trait]
impl<S: Step> Step for Counted<S> {
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome {
        let outcome = self.inner.run(state, ctx).await;
        self.count(state, outcome)
    }

    // an aborted attempt is not counted; the abort reaches the caller as is
    async fn execute(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, ExecutionError> {
        let outcome = self.inner.execute(state, ctx).await?;
        Ok(self.count(state, outcome))
    }
}

/// Default give-up step: marks the artifact unsendable and explains why
pub struct GiveUp {
    keys: RetryKeys,
}

impl GiveUp {
    pub fn new(keys: RetryKeys) -> Self {
        Self { keys }
    }
}

impl Default for GiveUp {
    fn default() -> Self {
        Self::new(RetryKeys::default())
    }
}

#[async_trait]
impl Step for GiveUp {
    async fn run(&self, state: &State, _ctx: &StepContext) -> StepOutcome {
        let trials = state.integer(&self.keys.trials).unwrap_or(0);
        StepOutcome::degraded(
            PartialState::new().set(self.keys.sendable.clone(), false),
            format!("no acceptable result after {} trials", trials),
        )
    }
}

/// Step names and targets for [`add_verify_loop`]
#[derive(Debug, Clone)]
pub struct VerifyLoop {
    pub generate: String,
    pub verify: String,
    /// Where an accepted artifact goes
    pub accept_to: String,
    /// Where the loop ends up after `max_trials` failed attempts
    pub give_up_to: String,
}

/// Wire `generate -> verify -> {accept, retry -> generate, give_up}`.
/// The generate step is wrapped in [`Counted`].
pub fn add_verify_loop<G, V>(
    builder: &mut GraphBuilder,
    names: &VerifyLoop,
    generate: G,
    verify: V,
    router: VerifyRouter,
) -> Result<(), GraphDefinitionError>
where
    G: Step + 'static,
    V: Step + 'static,
{
    let trials_key = router.keys.trials.clone();
    builder.register_step(names.generate.clone(), Counted::new(generate).with_key(trials_key))?;
    builder.register_step(names.verify.clone(), verify)?;
    builder.add_edge(names.generate.clone(), names.verify.clone());
    builder.add_conditional_edges(
        names.verify.clone(),
        router,
        [
            (ACCEPT, names.accept_to.clone()),
            (RETRY, names.generate.clone()),
            (GIVE_UP, names.give_up_to.clone()),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switchboard::workflow::graph::{RunConfig, END};
    use crate::switchboard::workflow::state::StateSchema;
    use crate::switchboard::workflow::step::{sync_step, Constant};

    fn state(update: PartialState) -> State {
        let mut s = State::empty();
        s.apply(&update, &StateSchema::default()).unwrap();
        s
    }

    #[test]
    fn test_router_labels() {
        let router = VerifyRouter::default();
        assert_eq!(router.route(&state(PartialState::new().set("sendable", true).set("trials", 1))), ACCEPT);
        assert_eq!(router.route(&state(PartialState::new().set("trials", 1))), RETRY);
        assert_eq!(router.route(&state(PartialState::new().set("trials", 3))), GIVE_UP);
        assert_eq!(
            router.route(&state(PartialState::new().set("trials", 3).set("max_trials", 5))),
            RETRY
        );
        // acceptance wins even past the cap
        assert_eq!(
            router.route(&state(PartialState::new().set("trials", 9).set("sendable", true))),
            ACCEPT
        );
    }

    #[test]
    fn test_configured_cap() {
        let config = EngineConfig {
            max_trials: 1,
            ..Default::default()
        };
        let router = VerifyRouter::configured(&config);
        assert_eq!(router.route(&state(PartialState::new().set("trials", 1))), GIVE_UP);
    }

    fn loop_graph(verify_accepts_at: i64) -> crate::switchboard::workflow::graph::CompiledGraph {
        let mut b = GraphBuilder::new("draft");
        add_verify_loop(
            &mut b,
            &VerifyLoop {
                generate: "generate".into(),
                verify: "verify".into(),
                accept_to: "finalize".into(),
                give_up_to: "give_up".into(),
            },
            sync_step(|s: &State| {
                PartialState::new().set("draft", format!("v{}", s.integer("trials").unwrap_or(0) + 1))
            }),
            sync_step(move |s: &State| {
                PartialState::new().set("sendable", s.integer("trials") == Some(verify_accepts_at))
            }),
            VerifyRouter::default(),
        )
        .unwrap();
        b.register_step("finalize", Constant(PartialState::new().set("final", true)))
            .unwrap();
        b.register_step("give_up", GiveUp::default()).unwrap();
        b.add_edge("finalize", END);
        b.add_edge("give_up", END);
        b.set_entry("generate").unwrap();
        b.compile().unwrap()
    }

    #[tokio::test]
    async fn test_loop_gives_up_after_max_trials() {
        let out = loop_graph(99)
            .invoke_traced(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap();
        let generates = out.steps.iter().filter(|r| r.step == "generate").count();
        assert_eq!(generates, 3);
        assert_eq!(out.state.flag("sendable"), Some(false));
        assert_eq!(out.state.text("draft"), Some("v3"));
        assert_eq!(out.steps.last().unwrap().step, "give_up");
        assert!(out.state.text("observation").unwrap().contains("3 trials"));
    }

    #[tokio::test]
    async fn test_loop_accepts_early() {
        let out = loop_graph(2)
            .invoke_traced(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap();
        let generates = out.steps.iter().filter(|r| r.step == "generate").count();
        assert_eq!(generates, 2);
        assert_eq!(out.state.flag("final"), Some(true));
    }

    #[tokio::test]
    async fn test_counted_survives_degraded_generate() {
        let step = Counted::new(sync_step(|_: &State| StepOutcome::degraded(PartialState::new(), "model down")));
        let ctx = StepContext {
            thread_id: "t".into(),
            graph: "g".into(),
            step: "generate".into(),
            budget: crate::switchboard::workflow::step::StepBudget::new(1),
            schema: std::sync::Arc::default(),
        };
        let outcome = step.run(&state(PartialState::new().set("trials", 2)), &ctx).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.update().get("trials"), Some(&3.into()));
    }

    #[tokio::test]
    async fn test_counted_passes_nested_abort_up() {
        let mut child = GraphBuilder::new("spinner");
        child.register_step("spin", Constant(PartialState::new())).unwrap();
        child.set_entry("spin").unwrap();
        child.add_edge("spin", "spin");
        let child = std::sync::Arc::new(child.compile().unwrap());

        let mut b = GraphBuilder::new("draft").with_recursion_limit(10);
        b.register_step("generate", Counted::new(child.as_step())).unwrap();
        b.set_entry("generate").unwrap();
        b.add_edge("generate", END);
        let graph = b.compile().unwrap();

        let err = graph
            .ainvoke(PartialState::new(), &RunConfig::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::StepBudgetExceeded { limit: 10, ref step } if step == "spin"
        ));
    }
}
