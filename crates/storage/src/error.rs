//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
///
/// `Transport` and `UnexpectedStatus` are deliberately distinct: inside the
/// ingestion engine's part loop a transport failure means the invocation's
/// backend-request budget is gone and progress must be checkpointed, while
/// a non-2xx status is a real protocol failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status} from object store: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("signer error: {0}")]
    Signer(#[from] wharf_sigv4::SignerError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether this is a network-level failure rather than a store response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
