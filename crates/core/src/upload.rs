//! Upload session types and content fingerprints.

use crate::repository::RepoName;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a client-facing upload session.
///
/// Docker rerolls this on every push retry, which is why it cannot serve as
/// the resumption key; see [`ContentFingerprint`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid session ID: {e}")))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client-facing upload session, stored in the metadata KV.
///
/// Created by the initiate POST, updated on every chunk, deleted on
/// successful completion. Abandoned sessions are left to expire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Session identifier.
    pub uuid: SessionId,
    /// Repository the upload targets.
    pub repo: String,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Bytes acknowledged to the client so far.
    pub bytes_received: u64,
    /// Object-store prefix holding the in-flight bytes.
    pub temp_location: String,
    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new session for a repository.
    pub fn new(repo: &RepoName) -> Self {
        let uuid = SessionId::new();
        let now = OffsetDateTime::now_utc();
        Self {
            uuid,
            repo: repo.to_string(),
            started_at: now,
            bytes_received: 0,
            temp_location: format!("uploads/{repo}/{uuid}"),
            expires_at: now + time::Duration::seconds(crate::SESSION_TTL_SECS as i64),
        }
    }

    /// The object-store key where the session's bytes are assembled.
    pub fn data_key(&self) -> String {
        format!("{}/data", self.temp_location)
    }

    /// Check whether the session has expired.
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// Content fingerprint derived from the head of an upload stream.
///
/// The first 16 hex characters of SHA-256 over up to `IDENTIFY_WINDOW`
/// bytes. Stable across push retries of the same layer, unlike the session
/// ID, so it anchors the multipart checkpoint and completed-content tables.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Fingerprint the identification window of a stream.
    pub fn from_window(window: &[u8]) -> Self {
        let full = hex::encode(Sha256::digest(window));
        Self(full[..16].to_string())
    }

    /// The checkpoint key for this fingerprint within a repository.
    pub fn checkpoint_key(&self, repo: &str) -> String {
        format!("{repo}/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentFingerprint({})", self.0)
    }
}
