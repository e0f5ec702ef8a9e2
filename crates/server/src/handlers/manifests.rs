//! Manifest, tag list, and catalog handlers.

use crate::cosmetics;
use crate::error::{ApiResult, ErrorCode, OciError};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use serde::Serialize;
use tracing::{info, warn};
use wharf_core::{Descriptor, Manifest, Reference, RepoName, StoredManifest};

const DEFAULT_MANIFEST_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Ceiling on HEAD probes per manifest push; each one spends a backend
/// request out of the invocation budget.
const MAX_BLOB_CHECKS: usize = 10;

#[derive(Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

/// Resolve a reference to the digest string manifests are keyed by.
async fn resolve(state: &AppState, name: &RepoName, reference: &Reference) -> ApiResult<String> {
    match reference {
        Reference::Digest(digest) => Ok(digest.to_string()),
        Reference::Tag(tag) => state
            .manifests
            .resolve_tag(name.as_str(), tag)
            .await?
            .ok_or_else(|| OciError::manifest_unknown(tag.clone())),
    }
}

/// GET /v2/<name>/manifests/<reference>
pub async fn get(state: &AppState, name: &RepoName, reference: &Reference) -> ApiResult<Response> {
    let digest = resolve(state, name, reference).await?;
    let Some(stored) = state.manifests.get(name.as_str(), &digest).await? else {
        return Err(OciError::manifest_unknown(reference.to_string()));
    };
    let content = stored.decode_content()?;

    manifest_response(&stored, Body::from(content))
}

/// HEAD /v2/<name>/manifests/<reference>
pub async fn head(state: &AppState, name: &RepoName, reference: &Reference) -> ApiResult<Response> {
    let digest = resolve(state, name, reference).await?;
    let Some(stored) = state.manifests.get(name.as_str(), &digest).await? else {
        return Err(OciError::manifest_unknown(reference.to_string()));
    };
    // Decode for the true byte length; the stored size field is advisory.
    let content = stored.decode_content()?;
    let mut stored = stored;
    stored.size = content.len() as i64;

    manifest_response(&stored, Body::empty())
}

fn manifest_response(stored: &StoredManifest, body: Body) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, stored.media_type.as_str())
        .header("Docker-Content-Digest", stored.digest.as_str())
        .header(header::CONTENT_LENGTH, stored.size)
        .header(header::ETAG, format!("\"{}\"", stored.digest))
        .header(header::CACHE_CONTROL, "max-age=0, private, must-revalidate")
        .body(body)
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// PUT /v2/<name>/manifests/<reference>
pub async fn put(
    state: &AppState,
    name: &RepoName,
    reference: &Reference,
    headers: &HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_MANIFEST_TYPE)
        .to_string();

    let bytes = axum::body::to_bytes(body, state.config.server.max_manifest_size)
        .await
        .map_err(|e| {
            OciError::new(ErrorCode::ManifestInvalid, format!("failed to read manifest body: {e}"))
        })?;

    let manifest = Manifest::validate(&bytes, &content_type)?;

    // Bounded best-effort existence probe for referenced blobs; a miss is
    // logged rather than rejected so pushes stay within the request budget.
    for digest in manifest.referenced_digests().iter().take(MAX_BLOB_CHECKS) {
        match state.objects.exists(&digest.blob_key()).await {
            Ok(false) => warn!(%digest, "manifest references a blob the store does not have"),
            Ok(true) => {}
            Err(e) => warn!(%digest, error = %e, "blob existence probe failed"),
        }
    }

    let (stored, digest) = StoredManifest::from_body(&bytes, &content_type);
    state.manifests.put(name.as_str(), &stored).await?;

    if let Reference::Tag(tag) = reference {
        state
            .manifests
            .save_tag(name.as_str(), tag, &digest.to_string())
            .await?;
    }
    state.manifests.add_to_catalog(name.as_str()).await?;

    // Record the referrer edge when the manifest names a subject.
    let mut subject_header: Option<String> = None;
    if let Some(subject) = &manifest.subject {
        subject_header = Some(subject.digest.clone());
        let descriptor = Descriptor {
            media_type: content_type.clone(),
            digest: digest.to_string(),
            size: bytes.len() as i64,
            urls: None,
            annotations: manifest.annotations.clone(),
            platform: None,
            artifact_type: manifest.referrer_artifact_type(),
        };
        if let Err(e) = state
            .manifests
            .save_referrer(name.as_str(), &subject.digest, descriptor)
            .await
        {
            warn!(subject = %subject.digest, error = %e, "referrer record save failed");
        }
    }

    info!(repo = %name, %reference, %digest, "manifest pushed");

    let mut builder = Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, format!("/v2/{name}/manifests/{digest}"))
        .header("Docker-Content-Digest", digest.to_string())
        .header(header::CONTENT_LENGTH, 0);
    if let Some(subject) = subject_header {
        builder = builder.header("OCI-Subject", subject);
    }
    builder
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// DELETE /v2/<name>/manifests/<reference>
pub async fn delete(state: &AppState, name: &RepoName, reference: &Reference) -> ApiResult<Response> {
    let digest = resolve(state, name, reference).await?;
    state.manifests.delete(name.as_str(), &digest).await?;

    Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// GET /v2/<name>/tags/list
pub async fn list_tags(state: &AppState, name: &RepoName, query: &str) -> ApiResult<Response> {
    let tags = state.manifests.list_tags(name.as_str()).await?;
    let (n, last) = cosmetics::parse_pagination(query);
    let (page, has_more) = cosmetics::paginate(&tags, n, last.as_deref());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if has_more && let Some(last_tag) = page.last() {
        builder = builder.header(
            header::LINK,
            cosmetics::link_header(&format!("/v2/{name}/tags/list"), n, last_tag),
        );
    }

    let body = serde_json::to_vec(&TagList { name: name.to_string(), tags: page })
        .map_err(|e| OciError::unsupported(format!("tag list serialization failed: {e}")))?;
    builder
        .body(Body::from(body))
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// GET /v2/_catalog
pub async fn catalog(state: &AppState, query: &str) -> ApiResult<Response> {
    let repositories = state.manifests.catalog().await?;
    let (n, last) = cosmetics::parse_pagination(query);
    let (page, has_more) = cosmetics::paginate(&repositories, n, last.as_deref());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if has_more && let Some(last_repo) = page.last() {
        builder = builder.header(
            header::LINK,
            cosmetics::link_header("/v2/_catalog", n, last_repo),
        );
    }

    let body = serde_json::to_vec(&Catalog { repositories: page })
        .map_err(|e| OciError::unsupported(format!("catalog serialization failed: {e}")))?;
    builder
        .body(Body::from(body))
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}
