//! Docker registry token service.
//!
//! Issues HMAC-SHA256-signed, JWT-shaped bearer tokens from the token
//! endpoint and validates them on later requests. Claims carry repository
//! access entries parsed from the requested scope.

use crate::error::{ErrorCode, OciError};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use wharf_core::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// A single access grant within token claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// JWT-shaped claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(default)]
    pub access: Vec<AccessEntry>,
}

/// Response body of the token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub expires_in: u64,
    pub issued_at: String,
}

/// Parse a scope string like `repository:library/ubuntu:pull,push`.
pub fn parse_scope(scope: &str) -> Option<AccessEntry> {
    let mut parts = scope.splitn(3, ':');
    let kind = parts.next()?.to_string();
    let name = parts.next()?.to_string();
    let actions = parts
        .next()
        .map(|a| a.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    Some(AccessEntry { kind, name, actions })
}

/// Issue a signed token for an authenticated account.
pub fn issue_token(
    config: &AuthConfig,
    account: &str,
    service: &str,
    scopes: &[String],
) -> (String, TokenClaims) {
    let now = OffsetDateTime::now_utc();
    let claims = TokenClaims {
        iss: config.service.clone(),
        sub: account.to_string(),
        aud: service.to_string(),
        exp: now.unix_timestamp() + config.token_ttl_secs as i64,
        iat: now.unix_timestamp(),
        jti: token_id(now),
        access: scopes.iter().filter_map(|s| parse_scope(s)).collect(),
    };

    let header = BASE64URL.encode(br#"{"typ":"JWT","alg":"HS256"}"#);
    let body = BASE64URL.encode(serde_json::to_vec(&claims).unwrap_or_default());
    let message = format!("{header}.{body}");
    let signature = BASE64URL.encode(sign(&config.token_secret, &message));

    (format!("{message}.{signature}"), claims)
}

/// Validate a bearer token: signature, then expiry.
pub fn validate_token(config: &AuthConfig, token: &str) -> Result<TokenClaims, OciError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, body, signature] = parts.as_slice() else {
        return Err(unauthorized("invalid token format"));
    };

    let message = format!("{header}.{body}");
    let expected = BASE64URL.encode(sign(&config.token_secret, &message));
    if !constant_time_eq(signature.as_bytes(), expected.as_bytes()) {
        return Err(unauthorized("invalid token signature"));
    }

    let claims_json = BASE64URL
        .decode(body)
        .map_err(|_| unauthorized("invalid token encoding"))?;
    let claims: TokenClaims =
        serde_json::from_slice(&claims_json).map_err(|_| unauthorized("invalid token claims"))?;

    if OffsetDateTime::now_utc().unix_timestamp() > claims.exp {
        return Err(unauthorized("token expired"));
    }

    Ok(claims)
}

/// Check whether claims allow `action` on `repo`.
///
/// Tokens without claims (Basic-authenticated requests) are unrestricted.
pub fn authorize(claims: Option<&TokenClaims>, repo: &str, action: &str) -> bool {
    let Some(claims) = claims else {
        return true;
    };

    claims.access.iter().any(|entry| {
        entry.kind == "repository"
            && (entry.name == repo || entry.name == "*")
            && entry.actions.iter().any(|a| a == action || a == "*")
    })
}

fn sign(secret: &str, message: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length");
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn unauthorized(message: &str) -> OciError {
    OciError::new(ErrorCode::Unauthorized, message)
}

fn token_id(now: OffsetDateTime) -> String {
    let digest = Sha256::digest(now.unix_timestamp_nanos().to_be_bytes());
    hex::encode(&digest[..8])
}

/// Compare without short-circuiting on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
