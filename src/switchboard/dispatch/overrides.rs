// SPDX-License-Identifier: MIT

//! Pre-classification override rules
//!
//! Rules are checked in order before the classifier runs; the first rule
//! that matches forces its category and the classifier is skipped.

use std::fmt;
use std::sync::Arc;

use crate::switchboard::workflow::state::State;

type Predicate = Arc<dyn Fn(&str, &State) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct OverrideRule {
    name: String,
    category: String,
    predicate: Predicate,
}

impl fmt::Debug for OverrideRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideRule")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl OverrideRule {
    /// Rule from an arbitrary predicate over the request text and state
    pub fn new<F>(name: impl Into<String>, category: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str, &State) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            category: category.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Matches when the text contains any of the phrases, ignoring case
    pub fn contains_any<I, S>(name: impl Into<String>, phrases: I, category: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .collect();
        Self::new(name, category, move |text, _| {
            let text = text.to_lowercase();
            phrases.iter().any(|p| text.contains(p.as_str()))
        })
    }

    /// Only match while `key` holds a value (e.g. a pending draft id)
    pub fn requires_key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        let inner = self.predicate;
        Self {
            name: self.name,
            category: self.category,
            predicate: Arc::new(move |text: &str, state: &State| {
                state.contains(&key) && inner(text, state)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn matches(&self, text: &str, state: &State) -> bool {
        (self.predicate)(text, state)
    }
}

/// First rule in declaration order that matches
pub fn first_match<'a>(rules: &'a [OverrideRule], text: &str, state: &State) -> Option<&'a OverrideRule> {
    rules.iter().find(|rule| rule.matches(text, state))
}
