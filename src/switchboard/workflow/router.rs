// SPDX-License-Identifier: MIT

//! Routers pick the next branch after a step
//!
//! A router is a pure function of the current state returning a label. The
//! graph maps labels to step names; a label outside that map aborts the run.

use crate::switchboard::workflow::condition::{self, ConditionError, Expression};
use crate::switchboard::workflow::state::State;

pub trait Router: Send + Sync {
    fn route(&self, state: &State) -> String;
}

impl<F, R> Router for F
where
    F: Fn(&State) -> R + Send + Sync,
    R: Into<String>,
{
    fn route(&self, state: &State) -> String {
        self(state).into()
    }
}

/// Ordered `when` branches; the first matching condition picks the label
pub struct ConditionRouter {
    branches: Vec<(Expression, String)>,
    default: String,
}

impl ConditionRouter {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            branches: Vec::new(),
            default: default.into(),
        }
    }

    /// Add a branch; conditions are checked in the order they were added
    pub fn when(mut self, condition: &str, label: impl Into<String>) -> Result<Self, ConditionError> {
        let expr = condition::parse(condition)?;
        self.branches.push((expr, label.into()));
        Ok(self)
    }

    /// Every label this router can return
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.branches.iter().map(|(_, l)| l.clone()).collect();
        labels.push(self.default.clone());
        labels.dedup();
        labels
    }
}

impl Router for ConditionRouter {
    fn route(&self, state: &State) -> String {
        self.branches
            .iter()
            .find(|(expr, _)| condition::evaluate(expr, state))
            .map(|(_, label)| label.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}
