//! Upload session table.

use crate::error::MetadataResult;
use crate::kv::KvStore;
use bytes::Bytes;
use std::sync::Arc;
use wharf_core::{SessionId, UploadSession};

/// Typed access to the `uploads/<session-id>` table.
///
/// Written at every transition of the chunk and complete handlers.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KvStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn key(id: SessionId) -> String {
        format!("uploads/{id}")
    }

    /// Load a session, `None` if unknown or undecodable.
    pub async fn load(&self, id: SessionId) -> MetadataResult<Option<UploadSession>> {
        let Some(raw) = self.kv.lookup(&Self::key(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "discarding undecodable session record");
                Ok(None)
            }
        }
    }

    /// Persist a session record.
    pub async fn save(&self, session: &UploadSession) -> MetadataResult<()> {
        let value = serde_json::to_vec(session)?;
        self.kv.insert(&Self::key(session.uuid), Bytes::from(value)).await
    }

    /// Delete a session record.
    pub async fn delete(&self, id: SessionId) -> MetadataResult<()> {
        self.kv.delete(&Self::key(id)).await
    }
}
