//! OCI manifest model and validation.

use crate::digest::Digest;
use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// A content descriptor pointing at a blob or manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(rename = "artifactType", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
}

/// Platform description within an index entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// An OCI image manifest or index, as pushed by clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: i32,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Descriptor>,
    /// Present on image indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Descriptor>,
    /// OCI 1.1 subject for the referrers graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    #[serde(rename = "artifactType", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    /// Parse and validate a manifest body against its content type.
    pub fn validate(body: &[u8], content_type: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidManifest(format!("failed to parse manifest JSON: {e}")))?;

        if manifest.schema_version != 2 {
            return Err(Error::InvalidManifest(format!(
                "schemaVersion must be 2, got {}",
                manifest.schema_version
            )));
        }

        if is_image_manifest(content_type) {
            let Some(config) = &manifest.config else {
                return Err(Error::InvalidManifest(
                    "image manifest must have a config".to_string(),
                ));
            };
            validate_descriptor(config, "config")?;
            for (i, layer) in manifest.layers.iter().enumerate() {
                validate_descriptor(layer, &format!("layers[{i}]"))?;
            }
        } else if is_image_index(content_type) {
            if manifest.manifests.is_empty() {
                return Err(Error::InvalidManifest(
                    "image index must have at least one manifest".to_string(),
                ));
            }
            for (i, entry) in manifest.manifests.iter().enumerate() {
                validate_descriptor(entry, &format!("manifests[{i}]"))?;
            }
        }

        if let Some(subject) = &manifest.subject {
            validate_descriptor(subject, "subject")?;
        }

        Ok(manifest)
    }

    /// The artifact type for referrer records: explicit artifactType, or the
    /// config media type as a fallback.
    pub fn referrer_artifact_type(&self) -> Option<String> {
        self.artifact_type
            .clone()
            .or_else(|| self.config.as_ref().map(|c| c.media_type.clone()))
    }

    /// Digests this manifest references (config plus layers), for blob
    /// existence checks at push time.
    pub fn referenced_digests(&self) -> Vec<Digest> {
        self.config
            .iter()
            .chain(self.layers.iter())
            .filter_map(|d| Digest::parse(&d.digest).ok())
            .collect()
    }
}

fn is_image_manifest(content_type: &str) -> bool {
    content_type.contains("manifest.v2") || content_type.contains("image.manifest")
}

fn is_image_index(content_type: &str) -> bool {
    content_type.contains("manifest.list") || content_type.contains("image.index")
}

fn validate_descriptor(desc: &Descriptor, name: &str) -> Result<()> {
    if desc.media_type.is_empty() {
        return Err(Error::InvalidManifest(format!("{name}.mediaType is required")));
    }
    if desc.digest.is_empty() {
        return Err(Error::InvalidManifest(format!("{name}.digest is required")));
    }
    if !desc.digest.starts_with("sha256:") && !desc.digest.starts_with("sha512:") {
        return Err(Error::InvalidDigest(format!("{name}.digest has invalid format")));
    }
    if desc.size < 0 {
        return Err(Error::InvalidManifest(format!("{name}.size must be non-negative")));
    }
    Ok(())
}

/// A manifest as stored in the metadata KV: content inlined base64 so the
/// whole record stays a single small JSON document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredManifest {
    pub digest: String,
    pub media_type: String,
    pub size: i64,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredManifest {
    /// Build a stored record from a pushed body.
    pub fn from_body(body: &[u8], media_type: &str) -> (Self, Digest) {
        let digest = Digest::compute(body);
        let stored = Self {
            digest: digest.to_string(),
            media_type: media_type.to_string(),
            size: body.len() as i64,
            content: BASE64.encode(body),
            created_at: OffsetDateTime::now_utc(),
        };
        (stored, digest)
    }

    /// Decode the manifest bytes.
    pub fn decode_content(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.content)
            .map_err(|e| Error::Serialization(format!("invalid stored manifest content: {e}")))
    }
}
