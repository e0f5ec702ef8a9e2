//! OCI 1.1 referrers API.

use crate::cosmetics;
use crate::error::{ApiResult, OciError};
use crate::state::AppState;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use serde::Serialize;
use wharf_core::{Descriptor, Digest, RepoName};

const IMAGE_INDEX_TYPE: &str = "application/vnd.oci.image.index.v1+json";

#[derive(Serialize)]
struct ReferrersList {
    #[serde(rename = "schemaVersion")]
    schema_version: i32,
    #[serde(rename = "mediaType")]
    media_type: &'static str,
    manifests: Vec<Descriptor>,
}

/// GET /v2/<name>/referrers/<digest>
pub async fn get(
    state: &AppState,
    name: &RepoName,
    digest: &Digest,
    query: &str,
) -> ApiResult<Response> {
    let mut manifests = state
        .manifests
        .referrers(name.as_str(), &digest.to_string())
        .await?;

    if let Some(filter) = cosmetics::query_param(query, "artifactType") {
        manifests.retain(|d| d.artifact_type.as_deref() == Some(filter.as_str()));
    }

    let body = serde_json::to_vec(&ReferrersList {
        schema_version: 2,
        media_type: IMAGE_INDEX_TYPE,
        manifests,
    })
    .map_err(|e| OciError::unsupported(format!("referrers serialization failed: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, IMAGE_INDEX_TYPE)
        .header("OCI-Filters-Applied", "artifactType")
        .body(Body::from(body))
        .map_err(|e| OciError::unsupported(format!("response build failed: {e}")))
}
