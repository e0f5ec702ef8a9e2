//! In-memory object store for tests and local development.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, PartInfo};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use wharf_core::CompletedPart;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

struct PendingUpload {
    key: String,
    /// part number -> (etag, bytes)
    parts: BTreeMap<u32, (String, Bytes)>,
}

/// Object store holding everything in process memory.
///
/// Implements the same multipart semantics the engine relies on from S3:
/// parts are invisible until complete, list-parts is authoritative, and a
/// completed upload id disappears.
pub struct MemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    uploads: RwLock<HashMap<String, PendingUpload>>,
    next_upload_id: AtomicU64,
    /// When false, `copy` reports 501 so the GET-then-PUT fallback runs.
    copy_supported: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            uploads: RwLock::new(HashMap::new()),
            next_upload_id: AtomicU64::new(1),
            copy_supported: AtomicBool::new(true),
        }
    }

    /// Toggle server-side copy support (test hook for the finalizer
    /// fallback path).
    pub fn set_copy_supported(&self, supported: bool) {
        self.copy_supported.store(supported, Ordering::SeqCst);
    }

    /// Number of in-flight multipart uploads (test observability).
    pub async fn pending_upload_count(&self) -> usize {
        self.uploads.read().await.len()
    }

    fn part_etag(data: &[u8]) -> String {
        format!("\"{}\"", hex::encode(Sha256::digest(data)))
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let objects = self.objects.read().await;
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectMeta {
            size: object.data.len() as u64,
            content_type: Some(object.content_type.clone()),
        })
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_stream(&self, key: &str) -> StorageResult<(ObjectMeta, ByteStream)> {
        let (meta, data) = {
            let objects = self.objects.read().await;
            let object = objects
                .get(key)
                .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
            (
                ObjectMeta {
                    size: object.data.len() as u64,
                    content_type: Some(object.content_type.clone()),
                },
                object.data.clone(),
            )
        };
        let stream = futures::stream::iter(vec![Ok(data)]);
        Ok((meta, Box::pin(stream)))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject { data, content_type: content_type.to_string() },
        );
        Ok(())
    }

    async fn put_stream(
        &self,
        key: &str,
        _content_length: u64,
        body: ByteStream,
        content_type: &str,
    ) -> StorageResult<()> {
        let chunks: Vec<Bytes> = body.try_collect().await?;
        let data = Bytes::from(chunks.concat());
        self.put(key, data, content_type).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        if !self.copy_supported.load(Ordering::SeqCst) {
            return Err(StorageError::UnexpectedStatus {
                status: 501,
                body: "copy not supported".to_string(),
            });
        }
        let source = {
            let objects = self.objects.read().await;
            objects
                .get(from)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(from.to_string()))?
        };
        self.objects.write().await.insert(to.to_string(), source);
        Ok(())
    }

    async fn initiate_multipart(&self, key: &str) -> StorageResult<String> {
        let id = self.next_upload_id.fetch_add(1, Ordering::SeqCst);
        let upload_id = format!("upload-{id}");
        self.uploads.write().await.insert(
            upload_id.clone(),
            PendingUpload { key: key.to_string(), parts: BTreeMap::new() },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads.get_mut(upload_id).ok_or(StorageError::UnexpectedStatus {
            status: 404,
            body: "NoSuchUpload".to_string(),
        })?;
        let etag = Self::part_etag(&data);
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn list_parts(&self, _key: &str, upload_id: &str) -> StorageResult<Vec<PartInfo>> {
        let uploads = self.uploads.read().await;
        let upload = uploads.get(upload_id).ok_or(StorageError::UnexpectedStatus {
            status: 404,
            body: "NoSuchUpload".to_string(),
        })?;
        Ok(upload
            .parts
            .iter()
            .map(|(number, (etag, data))| PartInfo {
                part_number: *number,
                etag: etag.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn complete_multipart(
        &self,
        _key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let mut uploads = self.uploads.write().await;
        let upload = uploads.remove(upload_id).ok_or(StorageError::UnexpectedStatus {
            status: 404,
            body: "NoSuchUpload".to_string(),
        })?;

        let mut last_number = 0;
        let mut data = Vec::new();
        for part in parts {
            if part.part_number <= last_number {
                uploads.insert(upload_id.to_string(), upload);
                return Err(StorageError::UnexpectedStatus {
                    status: 400,
                    body: "InvalidPartOrder".to_string(),
                });
            }
            last_number = part.part_number;

            let stored = match upload.parts.get(&part.part_number) {
                Some((etag, bytes)) if *etag == part.etag => bytes.clone(),
                _ => {
                    uploads.insert(upload_id.to_string(), upload);
                    return Err(StorageError::UnexpectedStatus {
                        status: 400,
                        body: "InvalidPart".to_string(),
                    });
                }
            };
            data.extend_from_slice(&stored);
        }

        self.objects.write().await.insert(
            upload.key.clone(),
            StoredObject {
                data: Bytes::from(data),
                content_type: "application/octet-stream".to_string(),
            },
        );
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        self.uploads.write().await.remove(upload_id);
        Ok(())
    }

    fn presign_put(&self, key: &str, expires_secs: u64) -> StorageResult<String> {
        Ok(format!("memory://{key}?expires={expires_secs}"))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
