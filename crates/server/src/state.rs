//! Application state shared across handlers.

use crate::ratelimit::RateLimiter;
use std::sync::Arc;
use wharf_core::config::AppConfig;
use wharf_metadata::{
    CheckpointStore, CompletedUploadStore, KvStore, ManifestStore, SessionStore,
};
use wharf_storage::ObjectStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub objects: Arc<dyn ObjectStore>,
    /// Upload session table.
    pub sessions: SessionStore,
    /// Multipart checkpoint table.
    pub checkpoints: CheckpointStore,
    /// Completed-content table.
    pub completed: CompletedUploadStore,
    /// Manifest, tag, catalog and referrer tables.
    pub manifests: ManifestStore,
    /// Per-IP rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create application state over the given backends.
    pub fn new(config: AppConfig, objects: Arc<dyn ObjectStore>, kv: Arc<dyn KvStore>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config: Arc::new(config),
            objects,
            sessions: SessionStore::new(kv.clone()),
            checkpoints: CheckpointStore::new(kv.clone()),
            completed: CompletedUploadStore::new(kv.clone()),
            manifests: ManifestStore::new(kv),
            rate_limiter,
        }
    }
}
