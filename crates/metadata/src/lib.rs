//! Metadata storage for the wharf container registry.
//!
//! Small JSON documents in an external key-value store:
//! - Upload sessions (`uploads/<session-id>`)
//! - Multipart checkpoints (`multipart/<flattened-checkpoint-key>`)
//! - Completed-content records (`completed/<flattened-checkpoint-key>`)
//! - Manifests, tags, catalog, and referrers

pub mod backends;
pub mod checkpoints;
pub mod error;
pub mod kv;
pub mod manifests;
pub mod sessions;

pub use backends::{http::HttpKv, memory::MemoryKv};
pub use checkpoints::{CheckpointStore, CompletedUploadStore};
pub use error::{MetadataError, MetadataResult};
pub use kv::KvStore;
pub use manifests::ManifestStore;
pub use sessions::SessionStore;

use std::sync::Arc;
use wharf_core::config::MetadataConfig;

/// Create a KV store from configuration.
pub fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn KvStore>> {
    match config {
        MetadataConfig::Memory => Ok(Arc::new(MemoryKv::new())),
        MetadataConfig::Http { base_url, token } => {
            Ok(Arc::new(HttpKv::new(base_url, token.clone())?))
        }
    }
}
