//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use wharf_core::CompletedPart;

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Content type, if the store reports one.
    pub content_type: Option<String>,
}

/// A part reported by list-parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartInfo {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

/// Object store abstraction covering exactly the verbs the registry uses.
///
/// Multipart state lives store-side: `list_parts` is the authority that the
/// ingestion engine reconciles its KV checkpoint against on every resume.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check existence via a single HEAD.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Fetch object metadata without the body.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Fetch an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<(ObjectMeta, ByteStream)>;

    /// Put a complete object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Put an object from a stream with a known length.
    async fn put_stream(
        &self,
        key: &str,
        content_length: u64,
        body: ByteStream,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Server-side copy. Backends without COPY support surface a non-2xx
    /// status; the finalizer falls back to GET-then-PUT.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Start a multipart upload, returning the upload ID.
    async fn initiate_multipart(&self, key: &str) -> StorageResult<String>;

    /// Upload one part, returning its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// List the parts the store has for an in-flight upload.
    async fn list_parts(&self, key: &str, upload_id: &str) -> StorageResult<Vec<PartInfo>>;

    /// Complete a multipart upload. `parts` must be sorted ascending.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;

    /// Abort a multipart upload.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Presigned PUT URL for direct-to-store uploads.
    fn presign_put(&self, key: &str, expires_secs: u64) -> StorageResult<String>;

    /// Backend identifier for logs.
    fn backend_name(&self) -> &'static str;
}
