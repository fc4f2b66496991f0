// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Checkpoint, Checkpointer};
use crate::adk::error::CheckpointError;

/// Process-local store; snapshots vanish with the process
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    snapshots: Arc<RwLock<HashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(thread_id).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let mut snapshots = self.snapshots.write().await;
        Ok(snapshots.remove(thread_id).is_some())
    }

    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        let mut ids: Vec<String> = snapshots.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
