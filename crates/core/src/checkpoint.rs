//! Multipart checkpoint state for resumable ingestion.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A part that has been uploaded to the object store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Checkpoint for an in-flight multipart assembly, stored in the metadata KV
/// under the checkpoint key (`<repo>/<fingerprint>`).
///
/// The checkpoint is a cache: `list-parts` against the object store is the
/// authority, and every resume reconciles against it before trusting the
/// recorded parts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultipartCheckpoint {
    /// Object-store multipart upload ID.
    pub upload_id: String,
    /// Object key being assembled. Stable across push retries; resumption
    /// keeps the original key rather than the new session's.
    pub key: String,
    /// Parts uploaded so far, in the order they were recorded.
    pub completed_parts: Vec<CompletedPart>,
    /// Next part number to upload.
    pub next_part_number: u32,
    /// Cumulative bytes uploaded.
    pub bytes_uploaded: u64,
    /// When the assembly started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// First 16 hex chars of the identify-window hash, used to match the
    /// checkpoint against a retried stream.
    pub content_fingerprint: String,
}

impl MultipartCheckpoint {
    /// Create a fresh checkpoint for a newly initiated upload.
    pub fn new(upload_id: String, key: String, fingerprint: &str) -> Self {
        Self {
            upload_id,
            key,
            completed_parts: Vec::new(),
            next_part_number: 1,
            bytes_uploaded: 0,
            started_at: OffsetDateTime::now_utc(),
            content_fingerprint: fingerprint.to_string(),
        }
    }

    /// Record an uploaded part and advance the counters.
    pub fn record_part(&mut self, part_number: u32, etag: String, size: u64) {
        self.completed_parts.push(CompletedPart { part_number, etag });
        self.next_part_number = part_number + 1;
        self.bytes_uploaded += size;
    }

    /// Parts sorted ascending by number, as required by complete-multipart.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.completed_parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }
}

/// Flatten an object-store key into a KV-safe key component (`/` to `_`).
pub fn flatten_key(key: &str) -> String {
    key.replace('/', "_")
}
