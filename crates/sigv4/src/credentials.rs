//! Object-store credential loading.

use crate::error::{SignerError, SignerResult};
use tokio::sync::OnceCell;
use wharf_core::config::CredentialsConfig;

/// An access key pair for signing.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    /// Build a key pair, stripping stray whitespace and newlines that
    /// secret stores tend to append.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: clean(access_key_id),
            secret_access_key: clean(secret_access_key),
        }
    }
}

fn clean(s: &str) -> String {
    s.replace(['\n', '\r'], "").trim().to_string()
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id_len", &self.access_key_id.len())
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Process-wide credential cache.
///
/// Credentials are resolved from their source once per process on first
/// use; reload is not attempted within a process lifetime.
#[derive(Debug, Default)]
pub struct CredentialCache {
    cell: OnceCell<Credentials>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    /// Const constructor for use in process-wide statics.
    pub const fn const_new() -> Self {
        Self { cell: OnceCell::const_new() }
    }

    /// Get the cached credentials, loading them on first call.
    pub async fn get(&self, config: &CredentialsConfig) -> SignerResult<&Credentials> {
        self.cell
            .get_or_try_init(|| async { load(config).await })
            .await
    }
}

async fn load(config: &CredentialsConfig) -> SignerResult<Credentials> {
    let credentials = match config {
        CredentialsConfig::Env { access_key_var, secret_key_var } => {
            let access = std::env::var(access_key_var).map_err(|_| {
                SignerError::Credentials(format!("access key env var not set: {access_key_var}"))
            })?;
            let secret = std::env::var(secret_key_var).map_err(|_| {
                SignerError::Credentials(format!("secret key env var not set: {secret_key_var}"))
            })?;
            Credentials::new(&access, &secret)
        }
        CredentialsConfig::File { path } => {
            let contents = tokio::fs::read_to_string(path).await?;
            let mut lines = contents.lines();
            let access = lines.next().ok_or_else(|| {
                SignerError::Credentials(format!("credential file {} is empty", path.display()))
            })?;
            let secret = lines.next().ok_or_else(|| {
                SignerError::Credentials(format!(
                    "credential file {} is missing the secret key line",
                    path.display()
                ))
            })?;
            Credentials::new(access, secret)
        }
        CredentialsConfig::Inline { access_key_id, secret_access_key } => {
            tracing::warn!("using inline object-store credentials (not recommended for production)");
            Credentials::new(access_key_id, secret_access_key)
        }
    };

    if credentials.access_key_id.is_empty() || credentials.secret_access_key.is_empty() {
        return Err(SignerError::Credentials(
            "object-store credentials are empty after loading".to_string(),
        ));
    }

    tracing::info!(
        access_key_len = credentials.access_key_id.len(),
        "loaded object-store credentials"
    );
    Ok(credentials)
}
