//! Server test harness.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;
use wharf_core::config::AppConfig;
use wharf_metadata::{KvStore, MemoryKv};
use wharf_server::{AppState, create_router};
use wharf_storage::{MemoryBackend, ObjectStore};

/// A test server over in-memory backends with shrunken part sizing.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub objects: Arc<MemoryBackend>,
    pub kv: Arc<MemoryKv>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a test server with config modifications applied on top of
    /// the testing defaults.
    pub fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let objects = Arc::new(MemoryBackend::new());
        let kv = Arc::new(MemoryKv::new());

        let state = AppState::new(
            config,
            objects.clone() as Arc<dyn ObjectStore>,
            kv.clone() as Arc<dyn KvStore>,
        );
        let router = create_router(state.clone());

        Self { router, state, objects, kv }
    }

    /// Send a request and collect the response.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Body,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(body).expect("request build");

        let response = self.router.clone().oneshot(request).await.expect("request send");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        (status, headers, body)
    }

    /// POST an upload initiation and return the new session id.
    pub async fn initiate_upload(&self, repo: &str) -> String {
        let (status, headers, _) = self
            .request("POST", &format!("/v2/{repo}/blobs/uploads/"), &[], Body::empty())
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        headers
            .get("Docker-Upload-UUID")
            .expect("upload uuid header")
            .to_str()
            .expect("uuid header value")
            .to_string()
    }

    /// PATCH a chunked body onto a session.
    pub async fn patch_chunked(
        &self,
        repo: &str,
        session: &str,
        body: Bytes,
    ) -> (StatusCode, HeaderMap) {
        let (status, headers, _) = self
            .request(
                "PATCH",
                &format!("/v2/{repo}/blobs/uploads/{session}"),
                &[("Transfer-Encoding", "chunked")],
                Body::from(body),
            )
            .await;
        (status, headers)
    }

    /// PUT-complete a session with a declared digest and no body.
    pub async fn complete_upload(&self, repo: &str, session: &str, digest: &str) -> StatusCode {
        let (status, _, _) = self
            .request(
                "PUT",
                &format!("/v2/{repo}/blobs/uploads/{session}?digest={digest}"),
                &[],
                Body::empty(),
            )
            .await;
        status
    }

    /// GET a blob's bytes.
    pub async fn get_blob(&self, repo: &str, digest: &str) -> (StatusCode, Bytes) {
        let (status, _, body) = self
            .request("GET", &format!("/v2/{repo}/blobs/{digest}"), &[], Body::empty())
            .await;
        (status, body)
    }
}
