//! Repository names and manifest references.

use crate::digest::Digest;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum repository name length.
const MAX_NAME_LEN: usize = 256;

/// Maximum tag length.
const MAX_TAG_LEN: usize = 128;

/// A validated OCI repository name.
///
/// Lowercase alphanumeric path components separated by `.`, `_`, `-` or `/`.
/// Names may contain `/` (e.g. `library/ubuntu`), which is why the route
/// dispatcher cannot treat them as single path segments.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    /// Parse and validate a repository name.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidName("repository name cannot be empty".to_string()));
        }

        if name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidName(format!(
                "repository name exceeds maximum length of {MAX_NAME_LEN} characters"
            )));
        }

        // Reject path traversal and NUL before the character check.
        if name.contains("..") || name.contains('\0') {
            return Err(Error::InvalidName(
                "repository name contains invalid characters".to_string(),
            ));
        }

        if let Some(c) = name.chars().find(|c| !is_name_char(*c)) {
            return Err(Error::InvalidName(format!(
                "repository name contains invalid character {c:?} \
                 (must be lowercase alphanumeric with . _ - / separators)"
            )));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoName({})", self.0)
    }
}

impl TryFrom<String> for RepoName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<RepoName> for String {
    fn from(n: RepoName) -> Self {
        n.0
    }
}

/// A manifest reference: either a tag or a digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl Reference {
    /// Parse and validate a reference string.
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::InvalidTag("reference cannot be empty".to_string()));
        }

        if reference.contains(':') {
            return Digest::parse(reference).map(Self::Digest);
        }

        if reference.len() > MAX_TAG_LEN {
            return Err(Error::InvalidTag(format!(
                "tag exceeds maximum length of {MAX_TAG_LEN} characters"
            )));
        }

        if let Some(c) = reference.chars().find(|c| !is_tag_char(*c)) {
            return Err(Error::InvalidTag(format!(
                "tag contains invalid character {c:?}"
            )));
        }

        Ok(Self::Tag(reference.to_string()))
    }

    /// The digest, if this reference is one.
    pub fn as_digest(&self) -> Option<&Digest> {
        match self {
            Self::Digest(d) => Some(d),
            Self::Tag(_) => None,
        }
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(t) => write!(f, "{t}"),
            Self::Digest(d) => write!(f, "{d}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["ubuntu", "library/ubuntu", "a.b_c-d/e", "r2"] {
            assert!(RepoName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Library/Ubuntu", "a b", "a/../b", "a\0b", "répertoire"] {
            assert!(RepoName::parse(name).is_err(), "{name:?} should be invalid");
        }
        let long = "a".repeat(257);
        assert!(RepoName::parse(&long).is_err());
    }

    #[test]
    fn test_reference_tag() {
        let r = Reference::parse("v1.2.3-rc_1").unwrap();
        assert_eq!(r, Reference::Tag("v1.2.3-rc_1".to_string()));
        assert!(r.as_digest().is_none());
    }

    #[test]
    fn test_reference_digest() {
        let hex = "a".repeat(64);
        let r = Reference::parse(&format!("sha256:{hex}")).unwrap();
        assert!(r.as_digest().is_some());
    }

    #[test]
    fn test_reference_invalid() {
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("sha512:abcd").is_err());
        assert!(Reference::parse("has space").is_err());
        let long = "t".repeat(129);
        assert!(Reference::parse(&long).is_err());
    }
}
