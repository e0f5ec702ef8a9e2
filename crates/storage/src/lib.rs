//! Object storage access for the wharf container registry.
//!
//! This crate provides:
//! - The `ObjectStore` trait with exactly the verbs the ingestion engine
//!   and finalizer use, including the multipart protocol
//! - An S3-compatible backend built on signed requests
//! - An in-memory backend for tests and local development
//! - The minimal S3 XML codec (initiate, list-parts, complete)

pub mod backends;
pub mod error;
pub mod traits;
pub mod xml;

pub use backends::{memory::MemoryBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore, PartInfo};

use std::sync::Arc;
use wharf_core::config::ObjectStoreConfig;
use wharf_sigv4::{CredentialCache, Credentials, RequestSigner};

/// Create an object store from configuration.
///
/// S3 credentials are resolved once here; the process-wide cache means a
/// second call within the same process reuses the first load.
pub async fn from_config(config: &ObjectStoreConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        ObjectStoreConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        ObjectStoreConfig::S3 { host, region, bucket, credentials } => {
            static CREDENTIALS: CredentialCache = CredentialCache::const_new();
            let loaded: &Credentials = CREDENTIALS.get(credentials).await?;
            let signer = RequestSigner::new(host, region, bucket, loaded.clone());
            Ok(Arc::new(S3Backend::new(signer)))
        }
    }
}
