//! Integration tests for the HTTP API surface.

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::TestServer;
use common::fixtures::{digest_of, seeded_bytes};
use serde_json::Value;

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_api_version_probe() {
    let server = TestServer::new();
    let (status, headers, body) = server.request("GET", "/v2/", &[], Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("Docker-Distribution-API-Version").unwrap(),
        "registry/2.0"
    );
    assert_eq!(json(&body), serde_json::json!({}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::new();
    let (status, _, body) = server.request("GET", "/health", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
}

#[tokio::test]
async fn test_unknown_endpoint_is_name_unknown() {
    let server = TestServer::new();
    let (status, _, body) = server.request("GET", "/v2/oops", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["errors"][0]["code"], "NAME_UNKNOWN");
}

#[tokio::test]
async fn test_small_layer_monolithic_push_and_pull() {
    let server = TestServer::new();
    let payload = seeded_bytes(42, 4096);
    let digest = digest_of(&payload);

    let session = server.initiate_upload("r").await;

    // PUT-complete with the whole blob in the body.
    let (status, headers, _) = server
        .request(
            "PUT",
            &format!("/v2/r/blobs/uploads/{session}?digest={digest}"),
            &[("Content-Length", &payload.len().to_string())],
            Body::from(payload.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get("Location").unwrap(),
        &format!("/v2/r/blobs/{digest}")
    );
    assert_eq!(headers.get("Docker-Content-Digest").unwrap(), digest.as_str());

    // Round trip.
    let (status, body) = server.get_blob("r", &digest).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, payload);

    // HEAD reports the size without a body.
    let (status, headers, body) = server
        .request("HEAD", &format!("/v2/r/blobs/{digest}"), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("Content-Length").unwrap(),
        &payload.len().to_string()
    );
    assert!(body.is_empty());

    // The session is gone after completion; its status endpoint 404s.
    let (status, _, _) = server
        .request("GET", &format!("/v2/r/blobs/uploads/{session}"), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cross_repo_mount_hit() {
    let server = TestServer::new();
    let payload = seeded_bytes(7, 1000);
    let digest = digest_of(&payload);

    // Seed the blob via r1.
    let session = server.initiate_upload("r1").await;
    let (status, _, _) = server
        .request(
            "PUT",
            &format!("/v2/r1/blobs/uploads/{session}?digest={digest}"),
            &[("Content-Length", &payload.len().to_string())],
            Body::from(payload.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Mounting into r2 is a single existence probe; no bytes move.
    let (status, headers, _) = server
        .request(
            "POST",
            &format!("/v2/r2/blobs/uploads/?mount={digest}&from=r1"),
            &[],
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get("Location").unwrap(),
        &format!("/v2/r2/blobs/{digest}")
    );
}

#[tokio::test]
async fn test_mount_miss_falls_back_to_initiate() {
    let server = TestServer::new();
    let digest = digest_of(b"never pushed");

    let (status, headers, _) = server
        .request(
            "POST",
            &format!("/v2/r2/blobs/uploads/?mount={digest}&from=r1"),
            &[],
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(headers.get("Docker-Upload-UUID").is_some());
    assert_eq!(headers.get("Range").unwrap(), "0-0");
}

#[tokio::test]
async fn test_validation_rejections() {
    let server = TestServer::new();

    // Uppercase repository name.
    let (status, _, body) = server
        .request("GET", "/v2/Upper/blobs/sha256:abc", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["errors"][0]["code"], "NAME_INVALID");

    // Malformed digest.
    let (status, _, body) = server
        .request("GET", "/v2/r/blobs/sha256:short", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["errors"][0]["code"], "DIGEST_INVALID");

    // Bad tag characters.
    let (status, _, body) = server
        .request("GET", "/v2/r/manifests/bad%20tag", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["errors"][0]["code"], "TAG_INVALID");
}

#[tokio::test]
async fn test_unknown_blob_and_session() {
    let server = TestServer::new();
    let digest = digest_of(b"missing");

    let (status, _, body) = server
        .request("GET", &format!("/v2/r/blobs/{digest}"), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["errors"][0]["code"], "BLOB_UNKNOWN");

    let bogus = uuid::Uuid::new_v4();
    let (status, _, body) = server
        .request(
            "PATCH",
            &format!("/v2/r/blobs/uploads/{bogus}"),
            &[("Transfer-Encoding", "chunked")],
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["errors"][0]["code"], "BLOB_UPLOAD_UNKNOWN");
}

#[tokio::test]
async fn test_empty_patch_has_no_store_effects() {
    let server = TestServer::new();
    let session = server.initiate_upload("r").await;

    let (status, headers) = server.patch_chunked("r", &session, bytes::Bytes::new()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(headers.get("Range").unwrap(), "0-0");
    assert_eq!(server.objects.pending_upload_count().await, 0);
}

#[tokio::test]
async fn test_blob_delete() {
    let server = TestServer::new();
    let payload = seeded_bytes(11, 512);
    let digest = digest_of(&payload);

    let session = server.initiate_upload("r").await;
    server
        .request(
            "PUT",
            &format!("/v2/r/blobs/uploads/{session}?digest={digest}"),
            &[("Content-Length", &payload.len().to_string())],
            Body::from(payload.clone()),
        )
        .await;

    let (status, _, _) = server
        .request("DELETE", &format!("/v2/r/blobs/{digest}"), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = server.get_blob("r", &digest).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Deleting again reports the blob as unknown.
    let (status, _, _) = server
        .request("DELETE", &format!("/v2/r/blobs/{digest}"), &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn image_manifest(config_digest: &str, layer_digest: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": 100
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": layer_digest,
            "size": 200
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_manifest_push_pull_tags_catalog() {
    let server = TestServer::new();
    let manifest = image_manifest(&digest_of(b"config"), &digest_of(b"layer"));
    let manifest_digest = digest_of(&manifest);

    let (status, headers, _) = server
        .request(
            "PUT",
            "/v2/library/app/manifests/v1",
            &[("Content-Type", "application/vnd.oci.image.manifest.v1+json")],
            Body::from(manifest.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get("Docker-Content-Digest").unwrap(),
        manifest_digest.as_str()
    );

    // Pull by tag.
    let (status, headers, body) = server
        .request("GET", "/v2/library/app/manifests/v1", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), manifest.as_slice());
    assert_eq!(
        headers.get("Content-Type").unwrap(),
        "application/vnd.oci.image.manifest.v1+json"
    );

    // Pull by digest.
    let (status, _, body) = server
        .request(
            "GET",
            &format!("/v2/library/app/manifests/{manifest_digest}"),
            &[],
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), manifest.as_slice());

    // HEAD carries the length, no body.
    let (status, headers, body) = server
        .request("HEAD", "/v2/library/app/manifests/v1", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("Content-Length").unwrap(), &manifest.len().to_string());
    assert!(body.is_empty());

    // Tags and catalog reflect the push.
    let (status, _, body) = server
        .request("GET", "/v2/library/app/tags/list", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["tags"], serde_json::json!(["v1"]));

    let (status, _, body) = server.request("GET", "/v2/_catalog", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["repositories"], serde_json::json!(["library/app"]));
}

#[tokio::test]
async fn test_manifest_unknown_and_invalid() {
    let server = TestServer::new();

    let (status, _, body) = server
        .request("GET", "/v2/r/manifests/missing", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["errors"][0]["code"], "MANIFEST_UNKNOWN");

    // schemaVersion 1 is rejected.
    let bad = serde_json::to_vec(&serde_json::json!({"schemaVersion": 1})).unwrap();
    let (status, _, body) = server
        .request(
            "PUT",
            "/v2/r/manifests/v1",
            &[("Content-Type", "application/vnd.oci.image.manifest.v1+json")],
            Body::from(bad),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["errors"][0]["code"], "MANIFEST_INVALID");
}

#[tokio::test]
async fn test_tags_pagination_emits_link_header() {
    let server = TestServer::new();

    for tag in ["a", "b", "c"] {
        let manifest = image_manifest(&digest_of(b"config"), &digest_of(tag.as_bytes()));
        server
            .request(
                "PUT",
                &format!("/v2/r/manifests/{tag}"),
                &[("Content-Type", "application/vnd.oci.image.manifest.v1+json")],
                Body::from(manifest),
            )
            .await;
    }

    let (status, headers, body) = server
        .request("GET", "/v2/r/tags/list?n=2", &[], Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["tags"], serde_json::json!(["a", "b"]));
    let link = headers.get("Link").unwrap().to_str().unwrap();
    assert!(link.contains("last=b"));
    assert!(link.contains("rel=\"next\""));

    let (_, headers, body) = server
        .request("GET", "/v2/r/tags/list?n=2&last=b", &[], Body::empty())
        .await;
    assert_eq!(json(&body)["tags"], serde_json::json!(["c"]));
    assert!(headers.get("Link").is_none());
}

#[tokio::test]
async fn test_referrers_recorded_and_filtered() {
    let server = TestServer::new();
    let subject_manifest = image_manifest(&digest_of(b"config"), &digest_of(b"layer"));
    let subject_digest = digest_of(&subject_manifest);

    server
        .request(
            "PUT",
            "/v2/r/manifests/base",
            &[("Content-Type", "application/vnd.oci.image.manifest.v1+json")],
            Body::from(subject_manifest.clone()),
        )
        .await;

    // A signature artifact referring to the subject.
    let referrer = serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "artifactType": "application/vnd.example.signature",
        "config": {
            "mediaType": "application/vnd.example.signature.config",
            "digest": digest_of(b"sig-config"),
            "size": 10
        },
        "layers": [],
        "subject": {
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "digest": subject_digest,
            "size": subject_manifest.len()
        }
    }))
    .unwrap();
    let referrer_digest = digest_of(&referrer);

    let (status, headers, _) = server
        .request(
            "PUT",
            &format!("/v2/r/manifests/{referrer_digest}"),
            &[("Content-Type", "application/vnd.oci.image.manifest.v1+json")],
            Body::from(referrer),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers.get("OCI-Subject").unwrap(), subject_digest.as_str());

    let (status, headers, body) = server
        .request(
            "GET",
            &format!("/v2/r/referrers/{subject_digest}"),
            &[],
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("Content-Type").unwrap(),
        "application/vnd.oci.image.index.v1+json"
    );
    let listed = json(&body);
    assert_eq!(listed["schemaVersion"], 2);
    assert_eq!(listed["manifests"][0]["digest"], referrer_digest);

    // Filtering by a non-matching artifactType empties the list.
    let (_, _, body) = server
        .request(
            "GET",
            &format!("/v2/r/referrers/{subject_digest}?artifactType=application/vnd.other"),
            &[],
            Body::empty(),
        )
        .await;
    assert_eq!(json(&body)["manifests"], serde_json::json!([]));
}

mod auth {
    use super::*;
    use wharf_core::config::AuthConfig;

    fn enable_auth(config: &mut wharf_core::config::AppConfig) {
        config.auth = AuthConfig {
            enabled: true,
            username: "admin".to_string(),
            // sha256("secret")
            password_hash: "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
                .to_string(),
            token_secret: "integration-test-secret".to_string(),
            service: "wharf-registry".to_string(),
            token_ttl_secs: 3600,
        };
    }

    fn basic_header() -> String {
        format!("Basic {}", BASE64.encode(b"admin:secret"))
    }

    #[tokio::test]
    async fn test_probe_challenges_then_accepts_credentials() {
        let server = TestServer::with_config(enable_auth);

        let (status, headers, body) = server.request("GET", "/v2/", &[], Body::empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(
            headers
                .get("WWW-Authenticate")
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("Bearer realm=")
        );
        assert_eq!(json(&body)["errors"][0]["code"], "UNAUTHORIZED");

        let auth = basic_header();
        let (status, _, _) = server
            .request("GET", "/v2/", &[("Authorization", &auth)], Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_requests_without_credentials_rejected() {
        let server = TestServer::with_config(enable_auth);
        let (status, _, _) = server
            .request("GET", "/v2/r/tags/list", &[], Body::empty())
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_flow_and_scope_enforcement() {
        let server = TestServer::with_config(enable_auth);
        let auth = basic_header();

        // Fetch a pull-only token for repository r.
        let (status, _, body) = server
            .request(
                "GET",
                "/token?service=wharf-registry&scope=repository%3Ar%3Apull",
                &[("Authorization", &auth)],
                Body::empty(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = json(&body)["token"].as_str().unwrap().to_string();

        // Pull works.
        let bearer = format!("Bearer {token}");
        let (status, _, _) = server
            .request("GET", "/v2/r/tags/list", &[("Authorization", &bearer)], Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);

        // Push is denied by the pull-only scope.
        let (status, _, body) = server
            .request(
                "POST",
                "/v2/r/blobs/uploads/",
                &[("Authorization", &bearer)],
                Body::empty(),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json(&body)["errors"][0]["code"], "DENIED");

        // Another repository is off-limits entirely.
        let (status, _, _) = server
            .request("GET", "/v2/other/tags/list", &[("Authorization", &bearer)], Body::empty())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn test_rate_limit_trips_and_reports() {
    let server = TestServer::with_config(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.max_requests = 2;
    });

    // Requests without a socket share the same client bucket in tests.
    let (status, _, _) = server.request("GET", "/v2/", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, headers, _) = server.request("GET", "/v2/", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");

    let (status, headers, _) = server.request("GET", "/v2/", &[], Body::empty()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.get("Retry-After").is_some());
}
