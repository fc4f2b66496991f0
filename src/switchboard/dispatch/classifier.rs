// SPDX-License-Identifier: MIT

//! Category classifiers

use async_trait::async_trait;
use std::sync::Arc;

use crate::adk::error::ClassifierError;
use crate::adk::model::{Content, GenerationConfig, Model};
use crate::switchboard::workflow::state::State;

/// Assigns a category label to a request
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, state: &State) -> Result<String, ClassifierError>;
}

/// Reduce raw classifier output to a bare label: first line, text after a
/// `label:` prefix, lowercase, no surrounding quotes or punctuation
pub fn normalize_label(raw: &str) -> String {
    let line = raw.trim().lines().next().unwrap_or("");
    let line = line.rsplit(':').next().unwrap_or(line);
    line.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .to_lowercase()
}

/// First category whose keywords appear in the text
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<(String, Vec<String>)>,
    fallback: Option<String>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category<I, S>(mut self, category: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .collect();
        self.rules.push((category.into(), keywords));
        self
    }

    /// Answer with this category instead of failing when nothing matches
    pub fn with_fallback(mut self, category: impl Into<String>) -> Self {
        self.fallback = Some(category.into());
        self
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, text: &str, _state: &State) -> Result<String, ClassifierError> {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|(category, _)| category.clone())
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| ClassifierError::Other("no keyword matched".to_string()))
    }
}

/// Asks a model to pick one of the categories
pub struct LlmClassifier {
    model: Arc<dyn Model>,
    categories: Vec<(String, Option<String>)>,
    instruction: Option<String>,
    config: GenerationConfig,
}

impl LlmClassifier {
    pub fn new<I, S>(model: Arc<dyn Model>, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model,
            categories: categories.into_iter().map(|c| (c.into(), None)).collect(),
            instruction: None,
            config: GenerationConfig {
                temperature: Some(0.0),
                max_output_tokens: Some(16),
                top_p: None,
            },
        }
    }

    /// Describe a category to the model
    pub fn describe(mut self, category: &str, description: impl Into<String>) -> Self {
        let description = description.into();
        if let Some(entry) = self.categories.iter_mut().find(|(c, _)| c == category) {
            entry.1 = Some(description);
        }
        self
    }

    /// Extra guidance prepended to the generated prompt
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::new();
        if let Some(instruction) = &self.instruction {
            prompt.push_str(instruction);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Classify the user's request into exactly one of these categories:\n");
        for (category, description) in &self.categories {
            match description {
                Some(d) => prompt.push_str(&format!("- {}: {}\n", category, d)),
                None => prompt.push_str(&format!("- {}\n", category)),
            }
        }
        prompt.push_str("Answer with the category name only.");
        prompt
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str, _state: &State) -> Result<String, ClassifierError> {
        let history = [Content::system(self.system_prompt()), Content::user(text)];
        let response = self
            .model
            .generate_content(&history, Some(&self.config))
            .await?;

        let raw = response.text();
        let label = normalize_label(&raw);
        if label.is_empty() {
            return Err(ClassifierError::Empty);
        }
        if !self.categories.iter().any(|(c, _)| *c == label) {
            return Err(ClassifierError::UnknownCategory(label));
        }
        Ok(label)
    }
}
