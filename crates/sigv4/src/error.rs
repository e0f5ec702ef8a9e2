//! Signer error types.

use thiserror::Error;

/// Signing and credential errors.
///
/// A signer failure is local: callers get the failure value and never retry
/// the signing step itself.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("credential error: {0}")]
    Credentials(String),

    #[error("credential source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
