//! Manifest, tag, catalog, and referrer tables.

use crate::error::MetadataResult;
use crate::kv::KvStore;
use bytes::Bytes;
use std::sync::Arc;
use wharf_core::{Descriptor, StoredManifest};

/// Typed access to the manifest-related KV tables:
///
/// - `manifests/<repo>/<digest>` -> [`StoredManifest`] JSON
/// - `tags/<repo>/<tag>` -> digest string
/// - `taglist/<repo>` -> JSON string array
/// - `catalog` -> JSON string array
/// - `referrers/<repo>/<subject-digest>` -> JSON descriptor array
#[derive(Clone)]
pub struct ManifestStore {
    kv: Arc<dyn KvStore>,
}

impl ManifestStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self, repo: &str, digest: &str) -> MetadataResult<Option<StoredManifest>> {
        let Some(raw) = self.kv.lookup(&format!("manifests/{repo}/{digest}")).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_slice(&raw).ok())
    }

    pub async fn put(&self, repo: &str, stored: &StoredManifest) -> MetadataResult<()> {
        let value = serde_json::to_vec(stored)?;
        self.kv
            .insert(&format!("manifests/{repo}/{}", stored.digest), Bytes::from(value))
            .await
    }

    pub async fn delete(&self, repo: &str, digest: &str) -> MetadataResult<()> {
        self.kv.delete(&format!("manifests/{repo}/{digest}")).await
    }

    /// Resolve a tag to its digest.
    pub async fn resolve_tag(&self, repo: &str, tag: &str) -> MetadataResult<Option<String>> {
        let raw = self.kv.lookup(&format!("tags/{repo}/{tag}")).await?;
        Ok(raw.map(|b| String::from_utf8_lossy(&b).to_string()))
    }

    /// Point a tag at a digest and record it in the repo's tag list.
    pub async fn save_tag(&self, repo: &str, tag: &str, digest: &str) -> MetadataResult<()> {
        self.kv
            .insert(&format!("tags/{repo}/{tag}"), Bytes::from(digest.to_string()))
            .await?;

        let key = format!("taglist/{repo}");
        let mut tags = self.load_string_list(&key).await?;
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
            self.save_string_list(&key, &tags).await?;
        }
        Ok(())
    }

    /// All tags recorded for a repository.
    pub async fn list_tags(&self, repo: &str) -> MetadataResult<Vec<String>> {
        self.load_string_list(&format!("taglist/{repo}")).await
    }

    /// Record a repository in the catalog.
    pub async fn add_to_catalog(&self, repo: &str) -> MetadataResult<()> {
        let mut repos = self.load_string_list("catalog").await?;
        if !repos.iter().any(|r| r == repo) {
            repos.push(repo.to_string());
            self.save_string_list("catalog", &repos).await?;
        }
        Ok(())
    }

    /// All repositories in the catalog.
    pub async fn catalog(&self) -> MetadataResult<Vec<String>> {
        self.load_string_list("catalog").await
    }

    /// Referrer descriptors recorded against a subject digest.
    pub async fn referrers(&self, repo: &str, subject: &str) -> MetadataResult<Vec<Descriptor>> {
        let Some(raw) = self.kv.lookup(&format!("referrers/{repo}/{subject}")).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_slice(&raw).unwrap_or_default())
    }

    /// Append a referrer, replacing any existing entry with the same digest.
    pub async fn save_referrer(
        &self,
        repo: &str,
        subject: &str,
        descriptor: Descriptor,
    ) -> MetadataResult<()> {
        let key = format!("referrers/{repo}/{subject}");
        let mut referrers = self.referrers(repo, subject).await?;

        match referrers.iter_mut().find(|r| r.digest == descriptor.digest) {
            Some(existing) => *existing = descriptor,
            None => referrers.push(descriptor),
        }

        let value = serde_json::to_vec(&referrers)?;
        self.kv.insert(&key, Bytes::from(value)).await
    }

    async fn load_string_list(&self, key: &str) -> MetadataResult<Vec<String>> {
        let Some(raw) = self.kv.lookup(key).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_slice(&raw).unwrap_or_default())
    }

    async fn save_string_list(&self, key: &str, list: &[String]) -> MetadataResult<()> {
        let value = serde_json::to_vec(list)?;
        self.kv.insert(key, Bytes::from(value)).await
    }
}
