// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Values come from defaults, optionally a YAML file, then `SWITCHBOARD_*`
//! environment variables, in that order.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::SwitchboardError;
use crate::switchboard::checkpoint::{Checkpointer, FileCheckpointer, InMemoryCheckpointer};
use crate::switchboard::workflow::graph::{Strictness, DEFAULT_RECURSION_LIMIT};
use crate::switchboard::workflow::retry::DEFAULT_MAX_TRIALS;

pub const ENV_RECURSION_LIMIT: &str = "SWITCHBOARD_RECURSION_LIMIT";
pub const ENV_STRICTNESS: &str = "SWITCHBOARD_STRICTNESS";
pub const ENV_CHECKPOINT_DIR: &str = "SWITCHBOARD_CHECKPOINT_DIR";
pub const ENV_STEP_TIMEOUT_SECS: &str = "SWITCHBOARD_STEP_TIMEOUT_SECS";
pub const ENV_MAX_TRIALS: &str = "SWITCHBOARD_MAX_TRIALS";

pub const DEFAULT_CATEGORY: &str = "personal";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub recursion_limit: u32,
    pub strictness: Strictness,
    /// When set, threads are persisted as JSON files here
    pub checkpoint_dir: Option<PathBuf>,
    pub step_timeout_secs: u64,
    pub max_trials: i64,
    pub default_category: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            strictness: Strictness::Warn,
            checkpoint_dir: None,
            step_timeout_secs: 30,
            max_trials: DEFAULT_MAX_TRIALS,
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self, SwitchboardError> {
        Self::default().with_env_overrides(|key| env::var(key).ok())
    }

    /// Read a YAML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SwitchboardError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; blank values are ignored
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, SwitchboardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_RECURSION_LIMIT) {
            self.recursion_limit = parse_var(ENV_RECURSION_LIMIT, &v)?;
        }
        if let Some(v) = get(ENV_STRICTNESS) {
            self.strictness = v
                .parse()
                .map_err(|e: String| SwitchboardError::config(format!("{}: {}", ENV_STRICTNESS, e)))?;
        }
        if let Some(v) = get(ENV_CHECKPOINT_DIR) {
            self.checkpoint_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_STEP_TIMEOUT_SECS) {
            self.step_timeout_secs = parse_var(ENV_STEP_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(ENV_MAX_TRIALS) {
            self.max_trials = parse_var(ENV_MAX_TRIALS, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), SwitchboardError> {
        if self.recursion_limit == 0 {
            return Err(SwitchboardError::config("recursion_limit must be at least 1"));
        }
        if self.max_trials < 1 {
            return Err(SwitchboardError::config("max_trials must be at least 1"));
        }
        if self.default_category.trim().is_empty() {
            return Err(SwitchboardError::config("default_category must not be empty"));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// File store when `checkpoint_dir` is set, memory otherwise
    pub fn checkpointer(&self) -> Arc<dyn Checkpointer> {
        match &self.checkpoint_dir {
            Some(dir) => {
                log::info!("Persisting threads under {}", dir.display());
                Arc::new(FileCheckpointer::new(dir.clone()))
            }
            None => Arc::new(InMemoryCheckpointer::new()),
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SwitchboardError> {
    value
        .trim()
        .parse()
        .map_err(|_| SwitchboardError::config(format!("{} has invalid value '{}'", key, value)))
}
