//! OCI route parsing and dispatch.
//!
//! Repository names contain `/`, so the distribution API cannot be
//! expressed with fixed router segments; a fallback handler parses every
//! request into a [`Route`] and dispatches it. Each variant carries only
//! the parameters its handler needs.

use crate::auth::{self, AuthOutcome};
use crate::cosmetics;
use crate::error::{ApiResult, ErrorCode, OciError};
use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use wharf_core::{Digest, Reference, RepoName, SessionId};

/// A parsed OCI Distribution API route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Health,
    TokenAuth,
    ApiVersion,
    GetManifest { name: String, reference: String },
    HeadManifest { name: String, reference: String },
    PutManifest { name: String, reference: String },
    DeleteManifest { name: String, reference: String },
    GetBlob { name: String, digest: String },
    HeadBlob { name: String, digest: String },
    DeleteBlob { name: String, digest: String },
    InitiateUpload { name: String },
    MountBlob { name: String, digest: String, from: String },
    UploadChunk { name: String, session: String },
    CompleteUpload { name: String, session: String, digest: String },
    UploadStatus { name: String, session: String },
    ListTags { name: String },
    Catalog,
    Referrers { name: String, digest: String },
    NotFound,
}

impl Route {
    /// The repository this route touches, if any.
    fn repo(&self) -> Option<&str> {
        match self {
            Route::GetManifest { name, .. }
            | Route::HeadManifest { name, .. }
            | Route::PutManifest { name, .. }
            | Route::DeleteManifest { name, .. }
            | Route::GetBlob { name, .. }
            | Route::HeadBlob { name, .. }
            | Route::DeleteBlob { name, .. }
            | Route::InitiateUpload { name }
            | Route::MountBlob { name, .. }
            | Route::UploadChunk { name, .. }
            | Route::CompleteUpload { name, .. }
            | Route::UploadStatus { name, .. }
            | Route::ListTags { name }
            | Route::Referrers { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether this route mutates registry state (requires `push`).
    fn is_write(&self) -> bool {
        matches!(
            self,
            Route::PutManifest { .. }
                | Route::DeleteManifest { .. }
                | Route::DeleteBlob { .. }
                | Route::InitiateUpload { .. }
                | Route::MountBlob { .. }
                | Route::UploadChunk { .. }
                | Route::CompleteUpload { .. }
        )
    }

    /// Whether this route is reachable without authentication.
    fn is_open(&self) -> bool {
        matches!(self, Route::Health | Route::ApiVersion | Route::TokenAuth)
    }
}

/// Parse method + path + query into a route.
pub fn parse_route(method: &Method, path: &str, query: &str) -> Route {
    if path == "/health" || path == "/" {
        return Route::Health;
    }
    if path == "/v2/auth" || path == "/token" {
        return Route::TokenAuth;
    }
    if path == "/v2/" || path == "/v2" {
        return Route::ApiVersion;
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return Route::NotFound;
    };

    if rest == "_catalog" && method == Method::GET {
        return Route::Catalog;
    }

    if let Some(idx) = rest.find("/manifests/") {
        let name = &rest[..idx];
        let reference = &rest[idx + "/manifests/".len()..];
        if !name.is_empty() && !reference.is_empty() {
            let (name, reference) = (name.to_string(), reference.to_string());
            if method == Method::GET {
                return Route::GetManifest { name, reference };
            } else if method == Method::HEAD {
                return Route::HeadManifest { name, reference };
            } else if method == Method::PUT {
                return Route::PutManifest { name, reference };
            } else if method == Method::DELETE {
                return Route::DeleteManifest { name, reference };
            }
        }
    }

    if let Some(idx) = rest.find("/blobs/uploads/") {
        let name = &rest[..idx];
        let session = &rest[idx + "/blobs/uploads/".len()..];
        if !name.is_empty() && !session.is_empty() {
            let (name, session) = (name.to_string(), session.to_string());
            if method == Method::PUT
                && let Some(digest) = cosmetics::query_param(query, "digest")
            {
                return Route::CompleteUpload { name, session, digest };
            }
            if method == Method::PATCH {
                return Route::UploadChunk { name, session };
            } else if method == Method::GET {
                return Route::UploadStatus { name, session };
            } else if method == Method::PUT {
                // Monolithic PUT without a digest behaves like a chunk.
                return Route::UploadChunk { name, session };
            }
        }
    }

    if let Some(name) = rest
        .strip_suffix("/blobs/uploads/")
        .or_else(|| rest.strip_suffix("/blobs/uploads"))
        && !name.is_empty()
        && method == Method::POST
    {
        let mount = cosmetics::query_param(query, "mount");
        let from = cosmetics::query_param(query, "from");
        if let (Some(digest), Some(from)) = (mount, from) {
            return Route::MountBlob { name: name.to_string(), digest, from };
        }
        return Route::InitiateUpload { name: name.to_string() };
    }

    if !rest.contains("/blobs/uploads")
        && let Some(idx) = rest.find("/blobs/")
    {
        let name = &rest[..idx];
        let digest = &rest[idx + "/blobs/".len()..];
        if !name.is_empty() && !digest.is_empty() {
            let (name, digest) = (name.to_string(), digest.to_string());
            if method == Method::GET {
                return Route::GetBlob { name, digest };
            } else if method == Method::HEAD {
                return Route::HeadBlob { name, digest };
            } else if method == Method::DELETE {
                return Route::DeleteBlob { name, digest };
            }
        }
    }

    if let Some(name) = rest.strip_suffix("/tags/list")
        && !name.is_empty()
        && method == Method::GET
    {
        return Route::ListTags { name: name.to_string() };
    }

    if let Some(idx) = rest.find("/referrers/") {
        let name = &rest[..idx];
        let digest = &rest[idx + "/referrers/".len()..];
        if !name.is_empty() && !digest.is_empty() && method == Method::GET {
            return Route::Referrers { name: name.to_string(), digest: digest.to_string() };
        }
    }

    Route::NotFound
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The single entry point: parse, gate, dispatch, decorate.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    if method == Method::TRACE {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let route = parse_route(&method, &path, &query);
    tracing::debug!(%method, %path, ?route, "dispatching request");

    let (parts, body) = req.into_parts();

    let origin = parts
        .headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        decorate(&mut response, &state, origin.as_deref(), None);
        return response;
    }

    // Rate limit before any work happens.
    let client = client_ip(&parts);
    let decision = state.rate_limiter.check(&client);
    if !decision.allowed {
        tracing::warn!(%client, "rate limit exceeded");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", decision.retry_after_secs.to_string())],
            "rate limit exceeded",
        )
            .into_response();
        decorate(&mut response, &state, origin.as_deref(), Some(decision));
        return response;
    }

    // Authentication for everything but the open endpoints; the version
    // probe performs its own check so it can answer with the challenge.
    if !route.is_open() {
        let outcome: AuthOutcome = auth::check_auth(&state.config.auth, &parts.headers);
        if !outcome.authenticated {
            let mut response = handlers::meta::unauthorized(&state.config.auth);
            decorate(&mut response, &state, origin.as_deref(), Some(decision));
            return response;
        }

        // Per-repository authorization when token claims are present.
        if let Some(repo) = route.repo()
            && !crate::token::authorize(
                outcome.claims.as_ref(),
                repo,
                auth::required_action(route.is_write()),
            )
        {
            let action = auth::required_action(route.is_write());
            tracing::warn!(repo, action, "authorization denied");
            let mut response = OciError::new(
                ErrorCode::Denied,
                format!("access to {action} on {repo} denied"),
            )
            .into_response();
            decorate(&mut response, &state, origin.as_deref(), Some(decision));
            return response;
        }
    }

    let mut response = match route_request(&state, route, parts, body).await {
        Ok(response) => response,
        Err(e) => {
            tracing::info!(error = %e, "request failed");
            e.into_response()
        }
    };
    decorate(&mut response, &state, origin.as_deref(), Some(decision));
    response
}

/// Validate parameters and invoke the handler for a route.
async fn route_request(
    state: &AppState,
    route: Route,
    parts: Parts,
    body: Body,
) -> ApiResult<Response> {
    match route {
        Route::Health => handlers::meta::health(),
        Route::ApiVersion => handlers::meta::api_version(state, &parts.headers),
        Route::TokenAuth => handlers::meta::token_endpoint(state, &parts.headers, parts.uri.query().unwrap_or("")),

        Route::GetManifest { name, reference } => {
            let name = RepoName::parse(&name)?;
            let reference = Reference::parse(&reference)?;
            handlers::manifests::get(state, &name, &reference).await
        }
        Route::HeadManifest { name, reference } => {
            let name = RepoName::parse(&name)?;
            let reference = Reference::parse(&reference)?;
            handlers::manifests::head(state, &name, &reference).await
        }
        Route::PutManifest { name, reference } => {
            let name = RepoName::parse(&name)?;
            let reference = Reference::parse(&reference)?;
            handlers::manifests::put(state, &name, &reference, &parts.headers, body).await
        }
        Route::DeleteManifest { name, reference } => {
            let name = RepoName::parse(&name)?;
            let reference = Reference::parse(&reference)?;
            handlers::manifests::delete(state, &name, &reference).await
        }

        Route::GetBlob { name, digest } => {
            let name = RepoName::parse(&name)?;
            let digest = Digest::parse(&digest)?;
            handlers::blobs::get(state, &name, &digest).await
        }
        Route::HeadBlob { name, digest } => {
            let name = RepoName::parse(&name)?;
            let digest = Digest::parse(&digest)?;
            handlers::blobs::head(state, &name, &digest).await
        }
        Route::DeleteBlob { name, digest } => {
            let name = RepoName::parse(&name)?;
            let digest = Digest::parse(&digest)?;
            handlers::blobs::delete(state, &name, &digest).await
        }

        Route::InitiateUpload { name } => {
            let name = RepoName::parse(&name)?;
            handlers::uploads::initiate(state, &name).await
        }
        Route::MountBlob { name, digest, from } => {
            let name = RepoName::parse(&name)?;
            let digest = Digest::parse(&digest)?;
            let _from = RepoName::parse(&from)?;
            handlers::uploads::mount(state, &name, &digest).await
        }
        Route::UploadChunk { name, session } => {
            let name = RepoName::parse(&name)?;
            let session = SessionId::parse(&session)?;
            handlers::uploads::chunk(state, &name, session, &parts.headers, body).await
        }
        Route::CompleteUpload { name, session, digest } => {
            let name = RepoName::parse(&name)?;
            let session = SessionId::parse(&session)?;
            let digest = Digest::parse(&digest)?;
            handlers::uploads::complete(state, &name, session, &digest, &parts.headers, body).await
        }
        Route::UploadStatus { name, session } => {
            let name = RepoName::parse(&name)?;
            let session = SessionId::parse(&session)?;
            handlers::uploads::status(state, &name, session).await
        }

        Route::ListTags { name } => {
            let name = RepoName::parse(&name)?;
            handlers::manifests::list_tags(state, &name, parts.uri.query().unwrap_or("")).await
        }
        Route::Catalog => handlers::manifests::catalog(state, parts.uri.query().unwrap_or("")).await,
        Route::Referrers { name, digest } => {
            let name = RepoName::parse(&name)?;
            let digest = Digest::parse(&digest)?;
            handlers::referrers::get(state, &name, &digest, parts.uri.query().unwrap_or("")).await
        }

        Route::NotFound => Err(OciError::new(ErrorCode::NameUnknown, "endpoint not found")),
    }
}

/// Attach the standard, CORS, and rate-limit headers to a response.
fn decorate(
    response: &mut Response,
    state: &AppState,
    origin: Option<&str>,
    decision: Option<crate::ratelimit::RateLimitDecision>,
) {
    let headers = response.headers_mut();
    cosmetics::standard_headers(headers);
    if let Ok(version) = HeaderValue::from_str(env!("CARGO_PKG_VERSION")) {
        headers.insert("X-Registry-Version", version);
    }

    if let Some(decision) = decision
        && state.rate_limiter.is_enabled()
    {
        if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
            headers.insert("X-RateLimit-Limit", v);
        }
        if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
            headers.insert("X-RateLimit-Remaining", v);
        }
    }

    if let Some(origin) = origin
        && state.config.server.cors_allowed_origins.iter().any(|o| o == origin)
    {
        if let Ok(v) = HeaderValue::from_str(origin) {
            headers.insert("Access-Control-Allow-Origin", v);
        }
        headers.insert(
            "Access-Control-Allow-Methods",
            HeaderValue::from_static("GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS"),
        );
        headers.insert(
            "Access-Control-Allow-Headers",
            HeaderValue::from_static("Authorization, Content-Type, Accept, Docker-Content-Digest"),
        );
        headers.insert(
            "Access-Control-Expose-Headers",
            HeaderValue::from_static(
                "Docker-Content-Digest, Docker-Upload-UUID, Location, Range, WWW-Authenticate, Link",
            ),
        );
    }
}

fn client_ip(parts: &Parts) -> String {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
