//! Blob fetch, probe, and delete.
//!
//! Blobs are immutable, so reads carry a long-lived immutable cache policy
//! for any CDN sitting in front of the registry.

use crate::error::{ApiResult, OciError};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use wharf_core::{Digest, RepoName};
use wharf_storage::StorageError;

const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// GET /v2/<name>/blobs/<digest>
pub async fn get(state: &AppState, _name: &RepoName, digest: &Digest) -> ApiResult<Response> {
    let key = digest.blob_key();
    let (meta, stream) = state.objects.get_stream(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) => OciError::blob_unknown(digest.to_string()),
        other => other.into(),
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Docker-Content-Digest", digest.to_string())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, meta.size)
        .header(header::CACHE_CONTROL, CACHE_IMMUTABLE)
        .body(Body::from_stream(stream))
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// HEAD /v2/<name>/blobs/<digest>
pub async fn head(state: &AppState, _name: &RepoName, digest: &Digest) -> ApiResult<Response> {
    let key = digest.blob_key();
    let meta = state.objects.head(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) => OciError::blob_unknown(digest.to_string()),
        other => other.into(),
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Docker-Content-Digest", digest.to_string())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, meta.size)
        .header(header::CACHE_CONTROL, CACHE_IMMUTABLE)
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// DELETE /v2/<name>/blobs/<digest>
pub async fn delete(state: &AppState, _name: &RepoName, digest: &Digest) -> ApiResult<Response> {
    let key = digest.blob_key();
    if !state.objects.exists(&key).await? {
        return Err(OciError::blob_unknown(digest.to_string()));
    }
    state.objects.delete(&key).await?;

    Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}
