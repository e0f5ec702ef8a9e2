//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Multipart part size in bytes. Defaults to `PART_SIZE`; tests shrink it.
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    /// Content-identification window in bytes.
    #[serde(default = "default_identify_window")]
    pub identify_window: usize,
    /// Maximum upload-part calls per chunk invocation.
    #[serde(default = "default_max_parts")]
    pub max_parts_per_invocation: usize,
    /// Upload session lifetime in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Maximum accepted manifest body size in bytes.
    #[serde(default = "default_max_manifest_size")]
    pub max_manifest_size: usize,
    /// Origins allowed for CORS. Empty disables cross-origin access.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_part_size() -> usize {
    crate::PART_SIZE
}

fn default_identify_window() -> usize {
    crate::IDENTIFY_WINDOW
}

fn default_max_parts() -> usize {
    crate::MAX_PARTS_PER_INVOCATION
}

fn default_session_ttl_secs() -> u64 {
    crate::SESSION_TTL_SECS
}

fn default_max_manifest_size() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            part_size: default_part_size(),
            identify_window: default_identify_window(),
            max_parts_per_invocation: default_max_parts(),
            session_ttl_secs: default_session_ttl_secs(),
            max_manifest_size: default_max_manifest_size(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Where object-store credentials come from.
///
/// The secret material is loaded once per process and cached; see the
/// signer crate's credential cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CredentialsConfig {
    /// Environment variables holding the key pair.
    Env {
        #[serde(default = "default_access_key_var")]
        access_key_var: String,
        #[serde(default = "default_secret_key_var")]
        secret_key_var: String,
    },
    /// A two-line file: access key id, then secret access key.
    File { path: PathBuf },
    /// Inline values (NOT recommended for production).
    Inline {
        access_key_id: String,
        secret_access_key: String,
    },
}

fn default_access_key_var() -> String {
    "WHARF_OS_ACCESS_KEY_ID".to_string()
}

fn default_secret_key_var() -> String {
    "WHARF_OS_SECRET_ACCESS_KEY".to_string()
}

/// Object-store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    /// In-memory store for tests and local development.
    Memory,
    /// S3-compatible object storage reached via signed requests.
    S3 {
        /// Object-store host (e.g., "eu-central.object.example.app").
        host: String,
        /// Signing region.
        region: String,
        /// Bucket name.
        bucket: String,
        /// Credential source.
        credentials: CredentialsConfig,
    },
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Metadata KV backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// In-memory KV for tests and local development.
    Memory,
    /// REST-style KV service (GET/PUT/DELETE on `<base_url>/<key>`).
    Http {
        base_url: String,
        /// Optional bearer token for the KV service.
        token: Option<String>,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Authentication configuration.
///
/// When enabled, Basic credentials validate against the stored hash and the
/// token endpoint issues HMAC-signed bearer tokens scoped to repositories.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Enable authentication. Disabled means anonymous full access.
    #[serde(default)]
    pub enabled: bool,
    /// Expected username for Basic auth.
    #[serde(default)]
    pub username: String,
    /// SHA-256 hex of the expected password.
    /// Generate with: `echo -n "your-password" | sha256sum`
    #[serde(default)]
    pub password_hash: String,
    /// Secret for signing bearer tokens.
    #[serde(default)]
    pub token_secret: String,
    /// Service name used in token claims and the WWW-Authenticate challenge.
    #[serde(default = "default_service")]
    pub service: String,
    /// Bearer token lifetime in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_service() -> String {
    "wharf-registry".to_string()
}

fn default_token_ttl_secs() -> u64 {
    3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            password_hash: String::new(),
            token_secret: String::new(),
            service: default_service(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable per-IP rate limiting.
    #[serde(default)]
    pub enabled: bool,
    /// Requests allowed per window per IP.
    #[serde(default = "default_rate_limit_requests")]
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
    /// Maximum tracked IPs before new entries are rejected.
    #[serde(default = "default_rate_limit_max_entries")]
    pub max_entries: usize,
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_rate_limit_max_entries() -> usize {
    100_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: default_rate_limit_requests(),
            window_secs: default_rate_limit_window_secs(),
            max_entries: default_rate_limit_max_entries(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Create a test configuration with in-memory backends and shrunken
    /// part sizing so multipart paths are exercised with small payloads.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                part_size: 1024,
                identify_window: 256,
                max_parts_per_invocation: 4,
                ..ServerConfig::default()
            },
            object_store: ObjectStoreConfig::Memory,
            metadata: MetadataConfig::Memory,
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
