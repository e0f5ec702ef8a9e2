//! Version probe, health, and the token endpoint.

use crate::auth;
use crate::cosmetics;
use crate::error::{ApiResult, ErrorCode, OciError};
use crate::state::AppState;
use crate::token::{self, TokenResponse};
use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// GET /health
pub fn health() -> ApiResult<Response> {
    Ok(Json(serde_json::json!({"status": "ok"})).into_response())
}

/// GET /v2/ - the version/auth probe.
///
/// Answers 401 with the Bearer challenge when unauthenticated; this is how
/// Docker discovers the token endpoint.
pub fn api_version(state: &AppState, headers: &HeaderMap) -> ApiResult<Response> {
    let outcome = auth::check_auth(&state.config.auth, headers);
    if !outcome.authenticated {
        return Ok(unauthorized(&state.config.auth));
    }
    Ok(Json(serde_json::json!({})).into_response())
}

/// 401 with the `WWW-Authenticate` challenge and the OCI error body.
pub fn unauthorized(config: &wharf_core::config::AuthConfig) -> Response {
    let mut response =
        OciError::new(ErrorCode::Unauthorized, "authentication required").into_response();
    if let Ok(challenge) = auth::bearer_challenge(config).parse() {
        response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
    }
    response
}

/// GET /token - issue a bearer token against Basic credentials.
pub fn token_endpoint(state: &AppState, headers: &HeaderMap, query: &str) -> ApiResult<Response> {
    let config = &state.config.auth;

    let outcome = auth::check_auth(config, headers);
    if !outcome.authenticated {
        return Ok(unauthorized(config));
    }

    let service = cosmetics::query_param(query, "service").unwrap_or_else(|| config.service.clone());
    let account =
        cosmetics::query_param(query, "account").unwrap_or_else(|| outcome.username.clone());
    let scopes: Vec<String> = cosmetics::query_param(query, "scope")
        .map(|s| {
            s.split([' ', '+'])
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (token, claims) = token::issue_token(config, &account, &service, &scopes);
    tracing::info!(%account, %service, scopes = claims.access.len(), "issued bearer token");

    let body = TokenResponse {
        access_token: Some(token.clone()),
        token,
        expires_in: config.token_ttl_secs,
        issued_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
    };

    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(body),
    )
        .into_response())
}
