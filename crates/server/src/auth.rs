//! Authentication checks for the OCI surface.
//!
//! Basic credentials validate against a stored SHA-256 password hash;
//! Bearer tokens come from the token service. Auth runs inside route
//! dispatch because the probe endpoint needs its own challenge behavior.

use crate::token::{self, TokenClaims};
use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest as _, Sha256};
use wharf_core::config::AuthConfig;

/// Result of an authentication check.
#[derive(Debug)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub username: String,
    /// Present for Bearer-authenticated requests; drives per-repository
    /// authorization.
    pub claims: Option<TokenClaims>,
}

impl AuthOutcome {
    fn anonymous() -> Self {
        Self {
            authenticated: true,
            username: "anonymous".to_string(),
            claims: None,
        }
    }

    fn rejected() -> Self {
        Self {
            authenticated: false,
            username: String::new(),
            claims: None,
        }
    }
}

/// Validate the Authorization header (Basic or Bearer).
pub fn check_auth(config: &AuthConfig, headers: &HeaderMap) -> AuthOutcome {
    if !config.enabled {
        return AuthOutcome::anonymous();
    }

    let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return AuthOutcome::rejected();
    };

    if let Some(token) = strip_scheme(value, "Bearer ") {
        return match token::validate_token(config, token) {
            Ok(claims) => AuthOutcome {
                authenticated: true,
                username: claims.sub.clone(),
                claims: Some(claims),
            },
            Err(_) => AuthOutcome::rejected(),
        };
    }

    let Some(encoded) = strip_scheme(value, "Basic ") else {
        return AuthOutcome::rejected();
    };
    let Ok(decoded) = BASE64.decode(encoded) else {
        return AuthOutcome::rejected();
    };
    let decoded = String::from_utf8_lossy(&decoded).to_string();
    let Some((username, password)) = decoded.split_once(':') else {
        return AuthOutcome::rejected();
    };

    if validate_basic(config, username, password) {
        AuthOutcome {
            authenticated: true,
            username: username.to_string(),
            claims: None,
        }
    } else {
        AuthOutcome::rejected()
    }
}

/// Check Basic credentials against the configured username and password
/// hash. Hash-compares the password so the comparison does not leak length
/// or prefix timing of the real secret.
pub fn validate_basic(config: &AuthConfig, username: &str, password: &str) -> bool {
    if config.username.is_empty() || config.password_hash.is_empty() {
        return false;
    }
    let password_hash = hex::encode(Sha256::digest(password.as_bytes()));
    username == config.username && password_hash == config.password_hash
}

/// The `WWW-Authenticate` Bearer challenge telling clients where tokens
/// come from.
pub fn bearer_challenge(config: &AuthConfig) -> String {
    format!(
        "Bearer realm=\"/token\",service=\"{}\"",
        config.service
    )
}

/// The action a route requires: `push` for mutations, `pull` otherwise.
pub fn required_action(is_write: bool) -> &'static str {
    if is_write { "push" } else { "pull" }
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    if value.len() >= scheme.len() && value[..scheme.len()].eq_ignore_ascii_case(scheme) {
        Some(&value[scheme.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            enabled: true,
            username: "admin".to_string(),
            // sha256("secret")
            password_hash: "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
                .to_string(),
            token_secret: "token-secret".to_string(),
            service: "wharf-registry".to_string(),
            token_ttl_secs: 3600,
        }
    }

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_disabled_auth_is_anonymous() {
        let outcome = check_auth(&AuthConfig::default(), &HeaderMap::new());
        assert!(outcome.authenticated);
        assert_eq!(outcome.username, "anonymous");
    }

    #[test]
    fn test_missing_header_rejected() {
        let outcome = check_auth(&auth_config(), &HeaderMap::new());
        assert!(!outcome.authenticated);
    }

    #[test]
    fn test_basic_auth_accepts_valid_credentials() {
        let encoded = BASE64.encode(b"admin:secret");
        let outcome = check_auth(&auth_config(), &headers_with_auth(&format!("Basic {encoded}")));
        assert!(outcome.authenticated);
        assert_eq!(outcome.username, "admin");
        assert!(outcome.claims.is_none());
    }

    #[test]
    fn test_basic_auth_rejects_bad_credentials() {
        let encoded = BASE64.encode(b"admin:wrong");
        let outcome = check_auth(&auth_config(), &headers_with_auth(&format!("Basic {encoded}")));
        assert!(!outcome.authenticated);

        let outcome = check_auth(&auth_config(), &headers_with_auth("Basic not-base64!!"));
        assert!(!outcome.authenticated);
    }

    #[test]
    fn test_bearer_auth_roundtrip() {
        let config = auth_config();
        let (token, _) = token::issue_token(
            &config,
            "admin",
            "wharf-registry",
            &["repository:r:pull".to_string()],
        );

        let outcome = check_auth(&config, &headers_with_auth(&format!("Bearer {token}")));
        assert!(outcome.authenticated);
        assert_eq!(outcome.username, "admin");
        assert!(outcome.claims.is_some());

        let outcome = check_auth(&config, &headers_with_auth("Bearer bogus"));
        assert!(!outcome.authenticated);
    }

    #[test]
    fn test_bearer_challenge_names_service() {
        let challenge = bearer_challenge(&auth_config());
        assert!(challenge.contains("realm=\"/token\""));
        assert!(challenge.contains("service=\"wharf-registry\""));
    }

    #[test]
    fn test_required_action() {
        assert_eq!(required_action(true), "push");
        assert_eq!(required_action(false), "pull");
    }
}
