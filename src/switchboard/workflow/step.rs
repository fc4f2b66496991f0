// SPDX-License-Identifier: MIT

//! Step contract
//!
//! A step reads the full state and returns the keys it wants changed. Steps
//! never fail outward: a step whose work went wrong still returns an update,
//! wrapped in [`StepOutcome::Degraded`] together with the reason.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::ExecutionError;
use crate::switchboard::workflow::state::{PartialState, State, StateSchema};

/// Result of running a step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step did its work
    Ok(PartialState),
    /// The step fell back to a best-effort update
    Degraded { update: PartialState, reason: String },
}

impl StepOutcome {
    pub fn ok(update: PartialState) -> Self {
        Self::Ok(update)
    }

    pub fn degraded(update: PartialState, reason: impl Into<String>) -> Self {
        Self::Degraded {
            update,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn update(&self) -> &PartialState {
        match self {
            Self::Ok(update) | Self::Degraded { update, .. } => update,
        }
    }

    pub fn into_parts(self) -> (PartialState, Option<String>) {
        match self {
            Self::Ok(update) => (update, None),
            Self::Degraded { update, reason } => (update, Some(reason)),
        }
    }
}

impl From<PartialState> for StepOutcome {
    fn from(update: PartialState) -> Self {
        Self::Ok(update)
    }
}

/// Step executions left for one top-level invocation, shared with any
/// nested graphs it runs.
#[derive(Debug, Clone)]
pub struct StepBudget {
    limit: u32,
    remaining: Arc<AtomicU32>,
}

impl StepBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: Arc::new(AtomicU32::new(limit)),
        }
    }

    /// Claim one step execution; false once the budget is spent
    pub fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// What a step knows about the run it is part of
#[derive(Debug, Clone)]
pub struct StepContext {
    pub thread_id: String,
    pub graph: String,
    pub step: String,
    pub budget: StepBudget,
    /// Schema of the graph running the step
    pub schema: Arc<StateSchema>,
}

/// A named unit of work in a graph
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome;

    /// Entry point used by the executor. Only steps that wrap a whole run
    /// (nested graphs) override this to pass an abort upward.
    async fn execute(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, ExecutionError> {
        Ok(self.run(state, ctx).await)
    }
}

#[async_trait]
impl Step for Arc<dyn Step> {
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome {
        self.as_ref().run(state, ctx).await
    }

    async fn execute(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, ExecutionError> {
        self.as_ref().execute(state, ctx).await
    }
}

/// Step backed by an async closure over an owned state snapshot
pub struct FnStep<F> {
    f: F,
}

/// Wrap an async closure as a step
pub fn step_fn<F, Fut, O>(f: F) -> FnStep<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = O> + Send,
    O: Into<StepOutcome>,
{
    FnStep { f }
}

#[async_trait]
impl<F, Fut, O> Step for FnStep<F>
where
    F: Fn(State) -> Fut + Send + Sync,
    Fut: Future<Output = O> + Send,
    O: Into<StepOutcome>,
{
    async fn run(&self, state: &State, _ctx: &StepContext) -> StepOutcome {
        (self.f)(state.clone()).await.into()
    }
}

/// Step backed by a plain synchronous function
pub struct SyncStep<F> {
    f: F,
}

/// Wrap a synchronous function as a step
pub fn sync_step<F, O>(f: F) -> SyncStep<F>
where
    F: Fn(&State) -> O + Send + Sync,
    O: Into<StepOutcome>,
{
    SyncStep { f }
}

#[async_trait]
impl<F, O> Step for SyncStep<F>
where
    F: Fn(&State) -> O + Send + Sync,
    O: Into<StepOutcome>,
{
    async fn run(&self, state: &State, _ctx: &StepContext) -> StepOutcome {
        (self.f)(state).into()
    }
}

/// Step whose work may fail; failures become a degraded outcome carrying
/// the fallback update plus an `error` field
pub struct FallibleStep<F> {
    f: F,
    fallback: PartialState,
}

pub fn try_step<F, E>(f: F, fallback: PartialState) -> FallibleStep<F>
where
    F: Fn(State) -> BoxFuture<'static, Result<PartialState, E>> + Send + Sync,
    E: Display,
{
    FallibleStep { f, fallback }
}

#[async_trait]
impl<F, E> Step for FallibleStep<F>
where
    F: Fn(State) -> BoxFuture<'static, Result<PartialState, E>> + Send + Sync,
    E: Display,
{
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome {
        match (self.f)(state.clone()).await {
            Ok(update) => StepOutcome::Ok(update),
            Err(e) => {
                let reason = format!("{} failed: {}", ctx.step, e);
                let update = self.fallback.clone().set("error", reason.clone());
                StepOutcome::degraded(update, reason)
            }
        }
    }
}

/// Step that always returns the same update
pub struct Constant(pub PartialState);

#[async_trait]
impl Step for Constant {
    async fn run(&self, _state: &State, _ctx: &StepContext) -> StepOutcome {
        StepOutcome::Ok(self.0.clone())
    }
}

/// Bounds a step's running time; a timeout is reported like any other
/// step failure
pub struct Timed<S> {
    inner: S,
    timeout: Duration,
    fallback: PartialState,
}

#[async_trait]
impl<S: Step> Step for Timed<S> {
    async fn run(&self, state: &State, ctx: &StepContext) -> StepOutcome {
        match tokio::time::timeout(self.timeout, self.inner.run(state, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => self.expired(ctx),
        }
    }

    async fn execute(&self, state: &State, ctx: &StepContext) -> Result<StepOutcome, ExecutionError> {
        match tokio::time::timeout(self.timeout, self.inner.execute(state, ctx)).await {
            Ok(result) => result,
            Err(_) => Ok(self.expired(ctx)),
        }
    }
}

impl<S> Timed<S> {
    fn expired(&self, ctx: &StepContext) -> StepOutcome {
        log::warn!("Step {} timed out after {:?}", ctx.step, self.timeout);
        StepOutcome::degraded(
            self.fallback.clone(),
            format!("{} timed out after {:?}", ctx.step, self.timeout),
        )
    }
}

pub trait StepExt: Step + Sized {
    /// Bound this step by `timeout`, returning `fallback` when it expires
    fn timed(self, timeout: Duration, fallback: PartialState) -> Timed<Self> {
        Timed {
            inner: self,
            timeout,
            fallback,
        }
    }
}

impl<S: Step + Sized> StepExt for S {}
