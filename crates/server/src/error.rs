//! OCI API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The OCI Distribution error-code set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    NameInvalid,
    DigestInvalid,
    TagInvalid,
    ManifestInvalid,
    BlobUnknown,
    BlobUploadUnknown,
    ManifestUnknown,
    NameUnknown,
    Unauthorized,
    Denied,
    Unsupported,
}

impl ErrorCode {
    /// The wire spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameInvalid => "NAME_INVALID",
            Self::DigestInvalid => "DIGEST_INVALID",
            Self::TagInvalid => "TAG_INVALID",
            Self::ManifestInvalid => "MANIFEST_INVALID",
            Self::BlobUnknown => "BLOB_UNKNOWN",
            Self::BlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            Self::ManifestUnknown => "MANIFEST_UNKNOWN",
            Self::NameUnknown => "NAME_UNKNOWN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Denied => "DENIED",
            Self::Unsupported => "UNSUPPORTED",
        }
    }

    /// The HTTP status for this code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NameInvalid | Self::DigestInvalid | Self::TagInvalid | Self::ManifestInvalid => {
                StatusCode::BAD_REQUEST
            }
            Self::BlobUnknown
            | Self::BlobUploadUnknown
            | Self::ManifestUnknown
            | Self::NameUnknown => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Denied => StatusCode::FORBIDDEN,
            Self::Unsupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error rendered as the OCI error JSON body.
#[derive(Debug)]
pub struct OciError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: Option<String>,
}

impl OciError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn blob_unknown(digest: impl Into<String>) -> Self {
        Self::new(ErrorCode::BlobUnknown, "blob unknown to registry").with_detail(digest)
    }

    pub fn upload_unknown(session: impl Into<String>) -> Self {
        Self::new(ErrorCode::BlobUploadUnknown, "blob upload unknown to registry")
            .with_detail(session)
    }

    pub fn manifest_unknown(reference: impl Into<String>) -> Self {
        Self::new(ErrorCode::ManifestUnknown, "manifest unknown").with_detail(reference)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }
}

impl std::fmt::Display for OciError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for OciError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: [ErrorEntry<'a>; 1],
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
}

impl IntoResponse for OciError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errors: [ErrorEntry {
                code: self.code.as_str(),
                message: &self.message,
                detail: self.detail.as_deref(),
            }],
        };
        (self.code.status(), Json(&body)).into_response()
    }
}

impl From<wharf_core::Error> for OciError {
    fn from(err: wharf_core::Error) -> Self {
        use wharf_core::Error;
        let code = match &err {
            Error::InvalidDigest(_) => ErrorCode::DigestInvalid,
            Error::InvalidName(_) => ErrorCode::NameInvalid,
            Error::InvalidTag(_) => ErrorCode::TagInvalid,
            Error::InvalidManifest(_) => ErrorCode::ManifestInvalid,
            Error::UploadSession(_) => ErrorCode::BlobUploadUnknown,
            Error::Serialization(_) => ErrorCode::Unsupported,
        };
        Self::new(code, err.to_string())
    }
}

impl From<wharf_storage::StorageError> for OciError {
    fn from(err: wharf_storage::StorageError) -> Self {
        match err {
            wharf_storage::StorageError::NotFound(key) => Self::blob_unknown(key),
            other => Self::unsupported(format!("object store error: {other}")),
        }
    }
}

impl From<wharf_metadata::MetadataError> for OciError {
    fn from(err: wharf_metadata::MetadataError) -> Self {
        Self::unsupported(format!("metadata store error: {err}"))
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, OciError>;
