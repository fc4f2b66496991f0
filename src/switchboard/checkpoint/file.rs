// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Checkpoint, Checkpointer};
use crate::adk::error::CheckpointError;

const EXTENSION: &str = "json";

/// One JSON file per thread under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-save leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::InvalidThreadId(thread_id.to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", encode_thread_id(thread_id), EXTENSION)))
    }
}

/// Percent-encode everything but `[A-Za-z0-9_.~-]`, so no separator survives
fn encode_thread_id(thread_id: &str) -> String {
    urlencoding::encode(thread_id).into_owned()
}

fn decode_thread_id(encoded: &str) -> Option<String> {
    urlencoding::decode(encoded).ok().map(|id| id.into_owned())
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(thread_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => {
                log::debug!("Loaded thread {} from {}", thread_id, path.display());
                Ok(Some(checkpoint))
            }
            Err(e) => {
                log::warn!("Corrupt snapshot {}: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.thread_id)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let tmp = self
            .dir
            .join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        log::debug!("Saved thread {} to {}", checkpoint.thread_id, path.display());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_threads(&self) -> Result<Vec<String>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_thread_id)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
