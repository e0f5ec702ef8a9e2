//! Multipart checkpoint and completed-content tables.

use crate::error::MetadataResult;
use crate::kv::KvStore;
use bytes::Bytes;
use std::sync::Arc;
use wharf_core::{MultipartCheckpoint, flatten_key};

/// Typed access to the `multipart/<flattened-checkpoint-key>` table.
///
/// The checkpoint is a cache of object-store truth; callers reconcile
/// against list-parts before trusting it.
#[derive(Clone)]
pub struct CheckpointStore {
    kv: Arc<dyn KvStore>,
}

impl CheckpointStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn kv_key(checkpoint_key: &str) -> String {
        format!("multipart/{}", flatten_key(checkpoint_key))
    }

    /// Load a checkpoint, `None` if absent or undecodable.
    pub async fn load(&self, checkpoint_key: &str) -> MetadataResult<Option<MultipartCheckpoint>> {
        let Some(raw) = self.kv.lookup(&Self::kv_key(checkpoint_key)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                tracing::warn!(
                    checkpoint_key,
                    error = %e,
                    "discarding undecodable multipart checkpoint"
                );
                Ok(None)
            }
        }
    }

    /// Persist a checkpoint.
    pub async fn save(
        &self,
        checkpoint_key: &str,
        checkpoint: &MultipartCheckpoint,
    ) -> MetadataResult<()> {
        let value = serde_json::to_vec(checkpoint)?;
        self.kv.insert(&Self::kv_key(checkpoint_key), Bytes::from(value)).await
    }

    /// Delete a checkpoint (missing keys are fine).
    pub async fn delete(&self, checkpoint_key: &str) -> MetadataResult<()> {
        self.kv.delete(&Self::kv_key(checkpoint_key)).await
    }
}

/// Typed access to the `completed/<flattened-checkpoint-key>` table.
///
/// Maps a content fingerprint to the object key holding the fully
/// assembled (pre-finalization) bytes. A record is only valid while a HEAD
/// against that key succeeds; readers purge it otherwise.
#[derive(Clone)]
pub struct CompletedUploadStore {
    kv: Arc<dyn KvStore>,
}

impl CompletedUploadStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn kv_key(checkpoint_key: &str) -> String {
        format!("completed/{}", flatten_key(checkpoint_key))
    }

    /// Load the assembled object key for a fingerprint.
    pub async fn load(&self, checkpoint_key: &str) -> MetadataResult<Option<String>> {
        let raw = self.kv.lookup(&Self::kv_key(checkpoint_key)).await?;
        Ok(raw
            .map(|b| String::from_utf8_lossy(&b).to_string())
            .filter(|s| !s.is_empty()))
    }

    /// Record the assembled object key for a fingerprint.
    pub async fn save(&self, checkpoint_key: &str, object_key: &str) -> MetadataResult<()> {
        self.kv
            .insert(&Self::kv_key(checkpoint_key), Bytes::from(object_key.to_string()))
            .await
    }

    /// Purge a stale record.
    pub async fn delete(&self, checkpoint_key: &str) -> MetadataResult<()> {
        self.kv.delete(&Self::kv_key(checkpoint_key)).await
    }
}
