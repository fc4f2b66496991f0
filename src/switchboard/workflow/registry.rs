// SPDX-License-Identifier: MIT

//! Named steps available to declarative graphs via `uses:`

use crate::switchboard::workflow::step::Step;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct StepRegistry {
    steps: Arc<RwLock<HashMap<String, Arc<dyn Step>>>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            steps: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, name: impl Into<String>, step: Arc<dyn Step>) {
        let name = name.into();
        let mut steps = self.steps.write().await;
        if steps.insert(name.clone(), step).is_some() {
            log::warn!("Replaced registered step: {}", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        let steps = self.steps.read().await;
        steps.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let steps = self.steps.read().await;
        let mut names: Vec<String> = steps.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
