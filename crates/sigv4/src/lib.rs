//! AWS Signature Version 4 request signing.
//!
//! Produces authenticated requests against an S3-compatible object store:
//! the plain verbs (GET/HEAD/PUT/DELETE/COPY), the multipart protocol
//! (initiate, upload-part, list-parts, complete, abort), and presigned PUT
//! URLs. Only the verbs the registry uses are covered; this is not a
//! general S3 client.

pub mod credentials;
pub mod error;
pub mod signer;

pub use credentials::{CredentialCache, Credentials};
pub use error::{SignerError, SignerResult};
pub use signer::{RequestSigner, SignedRequest};
