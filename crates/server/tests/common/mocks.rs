//! Failure-injecting object store wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use wharf_core::CompletedPart;
use wharf_storage::{
    ByteStream, MemoryBackend, ObjectMeta, ObjectStore, PartInfo, StorageError, StorageResult,
};

/// How an injected part-upload failure presents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(dead_code)]
pub enum FailureMode {
    /// Network-level failure, as the edge surfaces an exhausted request
    /// budget.
    Transport,
    /// A non-2xx response from the store.
    Status,
}

/// Delegates to a [`MemoryBackend`] but fails `upload_part` after a set
/// number of successful calls.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FlakyStore {
    inner: Arc<MemoryBackend>,
    parts_before_failure: AtomicUsize,
    mode: FailureMode,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: Arc<MemoryBackend>, parts_before_failure: usize, mode: FailureMode) -> Self {
        Self {
            inner,
            parts_before_failure: AtomicUsize::new(parts_before_failure),
            mode,
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<(ObjectMeta, ByteStream)> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.inner.put(key, data, content_type).await
    }

    async fn put_stream(
        &self,
        key: &str,
        content_length: u64,
        body: ByteStream,
        content_type: &str,
    ) -> StorageResult<()> {
        self.inner.put_stream(key, content_length, body, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        self.inner.copy(from, to).await
    }

    async fn initiate_multipart(&self, key: &str) -> StorageResult<String> {
        self.inner.initiate_multipart(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let remaining = self.parts_before_failure.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(match self.mode {
                FailureMode::Transport => {
                    StorageError::Transport("backend request limit exceeded".to_string())
                }
                FailureMode::Status => StorageError::UnexpectedStatus {
                    status: 500,
                    body: "InternalError".to_string(),
                },
            });
        }
        self.parts_before_failure.store(remaining - 1, Ordering::SeqCst);
        self.inner.upload_part(key, upload_id, part_number, data).await
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> StorageResult<Vec<PartInfo>> {
        self.inner.list_parts(key, upload_id).await
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        self.inner.complete_multipart(key, upload_id, parts).await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.inner.abort_multipart(key, upload_id).await
    }

    fn presign_put(&self, key: &str, expires_secs: u64) -> StorageResult<String> {
        self.inner.presign_put(key, expires_secs)
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
