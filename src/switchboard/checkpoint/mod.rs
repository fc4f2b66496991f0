// SPDX-License-Identifier: MIT

//! Durable per-thread state snapshots
//!
//! A checkpointer maps a thread id to the state left by the last completed
//! run. Stores only move opaque snapshots; they never interpret the state.

mod file;
mod memory;

pub use file::FileCheckpointer;
pub use memory::InMemoryCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adk::error::CheckpointError;
use crate::switchboard::workflow::state::State;

/// State of one thread after a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Graph that produced the snapshot
    pub graph: String,
    pub state: State,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the thread's snapshot
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Forget a thread; returns whether anything was stored
    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError>;

    /// Known thread ids, sorted
    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError>;
}
