//! Blob digests and the content-addressable key layout.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// A validated `sha256:<64-hex>` content digest.
///
/// Only sha256 is accepted; the inner string holds the lowercase hex hash
/// without the algorithm prefix.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parse and validate a digest in `algorithm:hash` form.
    pub fn parse(s: &str) -> Result<Self> {
        let Some((algorithm, hash)) = s.split_once(':') else {
            return Err(Error::InvalidDigest(
                "digest must be in algorithm:hash format".to_string(),
            ));
        };

        if algorithm != "sha256" {
            return Err(Error::InvalidDigest(format!(
                "only sha256 digests are supported, got {algorithm}"
            )));
        }

        if hash.len() != 64 {
            return Err(Error::InvalidDigest(format!(
                "sha256 hash must be 64 hex characters, got {}",
                hash.len()
            )));
        }

        if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidDigest(
                "digest contains non-hexadecimal characters".to_string(),
            ));
        }

        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// Compute the digest of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(data)))
    }

    /// The hex hash without the `sha256:` prefix.
    pub fn hex(&self) -> &str {
        &self.0
    }

    /// The sharded object-store key for this blob.
    ///
    /// Layout: `blobs/sha256/<h[0:2]>/<h[2:4]>/<h>`.
    pub fn blob_key(&self) -> String {
        format!("blobs/sha256/{}/{}/{}", &self.0[0..2], &self.0[2..4], self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(sha256:{})", self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_parse_valid() {
        let digest = Digest::parse(&format!("sha256:{HEX}")).unwrap();
        assert_eq!(digest.hex(), HEX);
        assert_eq!(digest.to_string(), format!("sha256:{HEX}"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Digest::parse("").is_err());
        assert!(Digest::parse("sha256").is_err());
        assert!(Digest::parse(&format!("sha512:{HEX}")).is_err());
        assert!(Digest::parse("sha256:abcd").is_err());
        let non_hex = format!("sha256:{}", "z".repeat(64));
        assert!(Digest::parse(&non_hex).is_err());
    }

    #[test]
    fn test_compute_matches_known_hash() {
        // sha256("hello world")
        let digest = Digest::compute(b"hello world");
        assert_eq!(digest.hex(), HEX);
    }

    #[test]
    fn test_blob_key_sharding() {
        let digest = Digest::parse(&format!("sha256:{HEX}")).unwrap();
        assert_eq!(digest.blob_key(), format!("blobs/sha256/b9/4d/{HEX}"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let digest = Digest::compute(b"payload");
        let json = serde_json::to_string(&digest).unwrap();
        let decoded: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, decoded);
        assert!(serde_json::from_str::<Digest>("\"sha256:nope\"").is_err());
    }
}
