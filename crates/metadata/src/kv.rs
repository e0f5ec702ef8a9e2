//! Key-value store trait.

use crate::error::MetadataResult;
use async_trait::async_trait;
use bytes::Bytes;

/// The small surface the registry needs from its metadata KV.
///
/// Values are small documents (< 10 KiB). Insert overwrites. Delete of a
/// missing key is not an error.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Look up a key. `Ok(None)` means the key does not exist.
    async fn lookup(&self, key: &str) -> MetadataResult<Option<Bytes>>;

    /// Insert or overwrite a value.
    async fn insert(&self, key: &str, value: Bytes) -> MetadataResult<()>;

    /// Delete a key, ignoring missing keys.
    async fn delete(&self, key: &str) -> MetadataResult<()>;
}
