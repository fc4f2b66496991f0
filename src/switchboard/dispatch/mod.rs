// SPDX-License-Identifier: MIT

//! Category dispatcher
//!
//! A top-level graph that labels each request with a category and routes it
//! to the step (usually a sub-graph) handling that category:
//!
//! ```text
//! classify --[work]--> work
//!          --[study]--> study
//!          --[...]---> ...
//! ```
//!
//! Override rules run first and short-circuit the classifier. When the
//! classifier fails, times out or answers with an unknown label, the default
//! category is used and the classify step reports itself degraded.

mod classifier;
mod overrides;

pub use classifier::{normalize_label, Classifier, KeywordClassifier, LlmClassifier};
pub use overrides::{first_match, OverrideRule};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::{ClassifierError, SwitchboardError};
use crate::switchboard::config::{EngineConfig, DEFAULT_CATEGORY};
use crate::switchboard::workflow::graph::{CompiledGraph, GraphBuilder};
use crate::switchboard::workflow::router::Router;
use crate::switchboard::workflow::state::{FieldType, PartialState, State, StateFieldDef, StateSchema};
use crate::switchboard::workflow::step::{Step, StepContext, StepOutcome};

pub const CLASSIFY_STEP: &str = "classify";
pub const DEFAULT_TEXT_KEY: &str = "query";
pub const DEFAULT_CATEGORY_KEY: &str = "category";
/// Records how the category was chosen: `override:<rule>`, `classifier`
/// or `default`
pub const CATEGORY_SOURCE_KEY: &str = "category_source";

/// Step that writes the request's category into state
pub struct DispatchStep {
    text_key: String,
    category_key: String,
    categories: Vec<String>,
    overrides: Vec<OverrideRule>,
    classifier: Arc<dyn Classifier>,
    default_category: String,
    timeout: Option<Duration>,
}

impl DispatchStep {
    pub fn new<I, S>(classifier: Arc<dyn Classifier>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_key: DEFAULT_TEXT_KEY.to_string(),
            category_key: DEFAULT_CATEGORY_KEY.to_string(),
            categories: categories.into_iter().map(Into::into).collect(),
            overrides: Vec::new(),
            classifier,
            default_category: DEFAULT_CATEGORY.to_string(),
            timeout: None,
        }
    }

    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    pub fn with_category_key(mut self, key: impl Into<String>) -> Self {
        self.category_key = key.into();
        self
    }

    pub fn with_override(mut self, rule: OverrideRule) -> Self {
        self.overrides.push(rule);
        self
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn chosen(&self, category: &str, source: String) -> PartialState {
        PartialState::new()
            .set(self.category_key.clone(), category)
            .set(CATEGORY_SOURCE_KEY, source)
    }

    async fn classify(&self, text: &str, state: &State) -> Result<String, ClassifierError> {
        let raw = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.classifier.classify(text, state))
                .await
                .unwrap_or(Err(ClassifierError::Timeout(limit)))?,
            None => self.classifier.classify(text, state).await?,
        };
        let label = normalize_label(&raw);
        if self.categories.iter().any(|c| *c == label) {
            Ok(label)
        } else {
            Err(ClassifierError::UnknownCategory(label))
        }
    }
}

#[async_trait]
impl Step for DispatchStep {
    async fn run(&self, state: &State, _ctx: &StepContext) -> StepOutcome {
        let text = state.text(&self.text_key).unwrap_or_default();

        if let Some(rule) = first_match(&self.overrides, text, state) {
            log::info!("Override rule {} forced category {}", rule.name(), rule.category());
            return StepOutcome::Ok(self.chosen(rule.category(), format!("override:{}", rule.name())));
        }

        if text.trim().is_empty() {
            log::warn!("Nothing to classify in '{}', using {}", self.text_key, self.default_category);
            return StepOutcome::degraded(
                self.chosen(&self.default_category, "default".to_string()),
                format!("no text in '{}' to classify", self.text_key),
            );
        }

        match self.classify(text, state).await {
            Ok(category) => {
                log::info!("Classifier chose {}", category);
                StepOutcome::Ok(self.chosen(&category, "classifier".to_string()))
            }
            Err(e) => {
                log::warn!("Classifier failed ({}), using {}", e, self.default_category);
                StepOutcome::degraded(
                    self.chosen(&self.default_category, "default".to_string()),
                    format!("classifier failed: {}", e),
                )
            }
        }
    }
}

/// Routes on the category field, using the default when it is missing
#[derive(Debug, Clone)]
pub struct CategoryRouter {
    key: String,
    default: String,
}

impl CategoryRouter {
    pub fn new(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            default: default.into(),
        }
    }
}

impl Router for CategoryRouter {
    fn route(&self, state: &State) -> String {
        state
            .text(&self.key)
            .map(str::to_string)
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Assembles a dispatcher graph: one classify step plus one step per
/// category
pub struct DispatcherBuilder {
    name: String,
    classifier: Arc<dyn Classifier>,
    handlers: Vec<(String, Arc<dyn Step>)>,
    overrides: Vec<OverrideRule>,
    default_category: String,
    text_key: String,
    category_key: String,
    timeout: Option<Duration>,
    schema: StateSchema,
    config: Option<EngineConfig>,
}

impl DispatcherBuilder {
    pub fn new(name: impl Into<String>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            name: name.into(),
            classifier,
            handlers: Vec::new(),
            overrides: Vec::new(),
            default_category: DEFAULT_CATEGORY.to_string(),
            text_key: DEFAULT_TEXT_KEY.to_string(),
            category_key: DEFAULT_CATEGORY_KEY.to_string(),
            timeout: None,
            schema: StateSchema::default(),
            config: None,
        }
    }

    /// Handle `category` with `step`; the step is registered under the
    /// category's name
    pub fn category<S: Step + 'static>(self, category: impl Into<String>, step: S) -> Self {
        self.category_shared(category, Arc::new(step))
    }

    pub fn category_shared(mut self, category: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.handlers.push((category.into(), step));
        self
    }

    /// Route a category to a compiled sub-graph
    pub fn category_graph(self, category: impl Into<String>, graph: Arc<CompiledGraph>) -> Self {
        self.category(category, graph.as_step())
    }

    pub fn override_rule(mut self, rule: OverrideRule) -> Self {
        self.overrides.push(rule);
        self
    }

    pub fn default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = category.into();
        self
    }

    pub fn text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    pub fn category_key(mut self, key: impl Into<String>) -> Self {
        self.category_key = key.into();
        self
    }

    /// Bound the classifier call
    pub fn classifier_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Take the default category, classifier timeout, step limit and
    /// strictness from the engine config
    pub fn configure(mut self, config: &EngineConfig) -> Self {
        self.default_category = config.default_category.clone();
        self.timeout = Some(config.step_timeout());
        self.config = Some(config.clone());
        self
    }

    /// Build the uncompiled graph so callers can add edges after the
    /// category steps (for example a loop back to `classify`)
    pub fn build(self) -> Result<GraphBuilder, SwitchboardError> {
        let categories: Vec<String> = self.handlers.iter().map(|(c, _)| c.clone()).collect();
        if categories.is_empty() {
            return Err(SwitchboardError::config(format!(
                "dispatcher {} has no categories",
                self.name
            )));
        }
        if !categories.contains(&self.default_category) {
            return Err(SwitchboardError::config(format!(
                "default category '{}' has no handler",
                self.default_category
            )));
        }
        if let Some(rule) = self
            .overrides
            .iter()
            .find(|r| !categories.iter().any(|c| c == r.category()))
        {
            return Err(SwitchboardError::config(format!(
                "override rule '{}' targets unknown category '{}'",
                rule.name(),
                rule.category()
            )));
        }

        let mut schema = self.schema;
        if schema.get(&self.category_key).is_none() {
            schema = schema.field(
                self.category_key.clone(),
                StateFieldDef::new(FieldType::Category).with_values(categories.clone()),
            );
        }

        let mut step = DispatchStep::new(self.classifier, categories.clone())
            .with_text_key(self.text_key)
            .with_category_key(self.category_key.clone())
            .with_default_category(self.default_category.clone());
        if let Some(timeout) = self.timeout {
            step = step.with_timeout(timeout);
        }
        for rule in self.overrides {
            step = step.with_override(rule);
        }

        let mut graph = GraphBuilder::new(self.name).with_schema(schema);
        if let Some(config) = &self.config {
            graph = graph.configure(config);
        }
        graph.register_step(CLASSIFY_STEP, step)?;
        for (category, handler) in self.handlers {
            graph.register_shared(category, handler)?;
        }
        graph.set_entry(CLASSIFY_STEP)?;
        graph.add_conditional_edges(
            CLASSIFY_STEP,
            CategoryRouter::new(self.category_key, self.default_category),
            categories.iter().map(|c| (c.clone(), c.clone())),
        );
        Ok(graph)
    }

    pub fn compile(self) -> Result<CompiledGraph, SwitchboardError> {
        Ok(self.build()?.compile()?)
    }
}
