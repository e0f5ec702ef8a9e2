//! Core domain types and shared logic for the wharf container registry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Blob digests and object-store key layout
//! - Repository names and references
//! - Upload session lifecycle
//! - Content fingerprints and multipart checkpoints
//! - Manifest structure and validation
//! - Configuration

pub mod checkpoint;
pub mod config;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod repository;
pub mod upload;

pub use checkpoint::{CompletedPart, MultipartCheckpoint, flatten_key};
pub use digest::Digest;
pub use error::{Error, Result};
pub use manifest::{Descriptor, Manifest, StoredManifest};
pub use repository::{Reference, RepoName};
pub use upload::{ContentFingerprint, SessionId, UploadSession};

/// Part size for multipart uploads: 16 MiB.
///
/// Balanced against the edge worker's heap ceiling (~40 MiB) and its
/// outbound-request cap: one part buffer plus identify buffer stays well
/// under the heap limit, while 28 parts per invocation covers 448 MiB.
pub const PART_SIZE: usize = 16 * 1024 * 1024;

/// Minimum part size accepted by S3 for non-final parts: 5 MiB.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Bytes hashed for content identification: 1 MiB.
pub const IDENTIFY_WINDOW: usize = 1024 * 1024;

/// Maximum upload-part calls per invocation.
///
/// Out of the 32-request backend budget: 1 initiate or list-parts, 1
/// complete or HEAD verification, 1 reserved for error reporting, 28 parts.
pub const MAX_PARTS_PER_INVOCATION: usize = 28;

/// Advertised safe single-invocation blob ceiling: 300 MiB.
///
/// The theoretical maximum is 28 x 16 MiB = 448 MiB; in practice network
/// throughput within the invocation timeout caps out lower.
pub const MAX_RELIABLE_BLOB_SIZE: u64 = 300 * 1024 * 1024;

/// Upload session lifetime: 1 hour.
pub const SESSION_TTL_SECS: u64 = 3600;
