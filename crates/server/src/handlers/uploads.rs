//! Upload lifecycle handlers: initiate, mount, chunk, complete, status.

use crate::error::{ApiResult, OciError};
use crate::ingest::{BodyError, IngestLimits, IngestionEngine};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{info, warn};
use wharf_core::{Digest, RepoName, SessionId, UploadSession};

/// POST /v2/<name>/blobs/uploads/
pub async fn initiate(state: &AppState, name: &RepoName) -> ApiResult<Response> {
    let session = UploadSession::new(name);
    state.sessions.save(&session).await?;
    info!(session_id = %session.uuid, repo = %name, "initiated upload session");
    accepted(name, &session)
}

/// POST /v2/<name>/blobs/uploads/?mount=<digest>&from=<repo>
///
/// A single HEAD against the content-addressed key decides the mount;
/// blobs are shared across repositories by construction of the layout.
pub async fn mount(state: &AppState, name: &RepoName, digest: &Digest) -> ApiResult<Response> {
    if state.objects.exists(&digest.blob_key()).await? {
        info!(repo = %name, %digest, "cross-repo mount hit");
        return Response::builder()
            .status(StatusCode::CREATED)
            .header(header::LOCATION, format!("/v2/{name}/blobs/{digest}"))
            .header("Docker-Content-Digest", digest.to_string())
            .header(header::CONTENT_LENGTH, 0)
            .body(Body::empty())
            .map_err(|e| OciError::unsupported(format!("response build failed: {e}")));
    }

    info!(repo = %name, %digest, "mount miss, falling back to upload initiation");
    initiate(state, name).await
}

/// PATCH /v2/<name>/blobs/uploads/<uuid>
pub async fn chunk(
    state: &AppState,
    name: &RepoName,
    session_id: SessionId,
    headers: &HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let Some(mut session) = state.sessions.load(session_id).await? else {
        return Err(OciError::upload_unknown(session_id.to_string()));
    };

    let content_length = content_length(headers);
    let chunked = is_chunked(headers);

    // Fast path: with prior progress and an unbounded chunked body, answer
    // immediately with the current Range instead of reading anything. The
    // client restarts its PATCH from that offset, and content
    // identification lets the follow-up invocation resume cheaply. Reading
    // here would burn the whole invocation on input we cannot seek past.
    if session.bytes_received > 0 && chunked {
        info!(
            session_id = %session_id,
            bytes = session.bytes_received,
            "fast path: returning current range without reading body"
        );
        return accepted(name, &session);
    }

    if chunked && content_length.unwrap_or(0) == 0 {
        let engine = IngestionEngine {
            objects: state.objects.as_ref(),
            checkpoints: &state.checkpoints,
            completed: &state.completed,
            limits: IngestLimits::from_config(&state.config.server),
        };
        let stream: std::pin::Pin<
            Box<dyn futures::Stream<Item = Result<bytes::Bytes, BodyError>> + Send>,
        > = Box::pin(
            body.into_data_stream()
                .map_err(|e| Box::new(e) as BodyError),
        );

        let report = engine
            .run(&session.repo, &session.data_key(), stream)
            .await
            .map_err(|e| OciError::unsupported(format!("chunk ingestion failed: {e}")))?;

        if report.is_early_exit() {
            if let Some(assembled) = &report.assembled_key {
                session.temp_location = strip_data_suffix(assembled);
                // Nonzero marker: the finalizer copies only when the
                // session has recorded bytes.
                session.bytes_received = 1;
                state.sessions.save(&session).await?;
            }
            info!(session_id = %session_id, "early exit: content already assembled");
            return accepted_with_range(name, &session, 1);
        }

        if report.bytes_uploaded > 0 {
            session.bytes_received = report.bytes_uploaded;
            if let Some(checkpoint) = &report.checkpoint {
                session.temp_location = strip_data_suffix(&checkpoint.key);
            } else if let Some(assembled) = &report.assembled_key {
                session.temp_location = strip_data_suffix(assembled);
            }
            state.sessions.save(&session).await?;
        }
    } else if let Some(len) = content_length.filter(|len| *len > 0) {
        // Small upload with a known size: one signed PUT, no multipart.
        let data_key = session.data_key();
        info!(session_id = %session_id, size = len, "direct PUT of sized chunk");

        let stream: wharf_storage::ByteStream = Box::pin(
            body.into_data_stream()
                .map_err(|e| wharf_storage::StorageError::Transport(e.to_string())),
        );
        state
            .objects
            .put_stream(&data_key, len, stream, "application/octet-stream")
            .await?;

        session.bytes_received += len;
        state.sessions.save(&session).await?;
    }

    accepted(name, &session)
}

/// PUT /v2/<name>/blobs/uploads/<uuid>?digest=<digest>
pub async fn complete(
    state: &AppState,
    name: &RepoName,
    session_id: SessionId,
    digest: &Digest,
    headers: &HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let Some(session) = state.sessions.load(session_id).await? else {
        return Err(OciError::upload_unknown(session_id.to_string()));
    };

    let final_key = digest.blob_key();
    let content_length = content_length(headers);

    if let Some(len) = content_length.filter(|len| *len > 0) {
        // Monolithic completion: the whole blob is in this body.
        // TODO: stream-hash the body and reject on digest mismatch before
        // the blob becomes visible at the final key.
        info!(session_id = %session_id, size = len, "monolithic PUT to final key");
        let stream: wharf_storage::ByteStream = Box::pin(
            body.into_data_stream()
                .map_err(|e| wharf_storage::StorageError::Transport(e.to_string())),
        );
        state
            .objects
            .put_stream(&final_key, len, stream, "application/octet-stream")
            .await?;
    } else if session.bytes_received > 0 {
        // Finalize the assembled temp object into the content-addressed
        // layout: server-side copy first, streamed fetch-and-put fallback.
        let source = session.data_key();
        match state.objects.copy(&source, &final_key).await {
            Ok(()) => info!(%source, %final_key, "finalized via server-side copy"),
            Err(e) => {
                info!(%source, error = %e, "server-side copy failed, falling back to fetch-and-put");
                let (meta, stream) = state.objects.get_stream(&source).await?;
                state
                    .objects
                    .put_stream(&final_key, meta.size, stream, "application/octet-stream")
                    .await?;
            }
        }

        if let Err(e) = state.objects.delete(&source).await {
            warn!(%source, error = %e, "temp object delete failed");
        }
    }

    state.sessions.delete(session_id).await?;
    if let Err(e) = state.checkpoints.delete(&session.data_key()).await {
        warn!(error = %e, "checkpoint delete on finalize failed");
    }

    info!(session_id = %session_id, %digest, "completed upload");
    Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, format!("/v2/{name}/blobs/{digest}"))
        .header("Docker-Content-Digest", digest.to_string())
        .header(header::CONTENT_LENGTH, 0)
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// GET /v2/<name>/blobs/uploads/<uuid>
pub async fn status(state: &AppState, name: &RepoName, session_id: SessionId) -> ApiResult<Response> {
    let Some(session) = state.sessions.load(session_id).await? else {
        return Err(OciError::upload_unknown(session_id.to_string()));
    };

    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::LOCATION, format!("/v2/{name}/blobs/uploads/{session_id}"))
        .header("Docker-Upload-UUID", session_id.to_string())
        .header(header::RANGE, range_value(session.bytes_received))
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// 202 Accepted with the session's current progress.
fn accepted(name: &RepoName, session: &UploadSession) -> ApiResult<Response> {
    accepted_with_range(name, session, session.bytes_received)
}

fn accepted_with_range(
    name: &RepoName,
    session: &UploadSession,
    bytes_received: u64,
) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(header::LOCATION, format!("/v2/{name}/blobs/uploads/{}", session.uuid))
        .header("Docker-Upload-UUID", session.uuid.to_string())
        .header(header::RANGE, range_value(bytes_received))
        .header(header::CONTENT_LENGTH, 0)
        .body(Body::empty())
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}

/// `Range: 0-<n-1>`, or `0-0` when nothing has been received.
fn range_value(bytes_received: u64) -> String {
    format!("0-{}", bytes_received.saturating_sub(1))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(header::TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
}

fn strip_data_suffix(key: &str) -> String {
    key.strip_suffix("/data").unwrap_or(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_value() {
        assert_eq!(range_value(0), "0-0");
        assert_eq!(range_value(1), "0-0");
        assert_eq!(range_value(1024), "0-1023");
    }

    #[test]
    fn test_strip_data_suffix() {
        assert_eq!(strip_data_suffix("uploads/r/s/data"), "uploads/r/s");
        assert_eq!(strip_data_suffix("uploads/r/s"), "uploads/r/s");
    }

    #[test]
    fn test_is_chunked() {
        let mut headers = HeaderMap::new();
        assert!(!is_chunked(&headers));
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        assert!(is_chunked(&headers));
        headers.insert(header::TRANSFER_ENCODING, "gzip, Chunked".parse().unwrap());
        assert!(is_chunked(&headers));
    }
}
