//! ETag generation and conditional request checks
//!
//! ETags are random: 32 bytes from the thread RNG hashed together with the
//! document URI. They never derive from document content, so two identical
//! documents written independently get unrelated tags.

use crate::error::XcapError;
use base64::prelude::*;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Encoded length of a generated tag
const ETAG_LEN: usize = 32;

/// Opaque entity tag, compared by exact string equality
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// Wrap a stored tag
    pub fn new(tag: impl Into<String>) -> Self {
        ETag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for the `ETag` header
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fresh unguessable tag for a document URI
pub fn generate_etag(uri: &str) -> ETag {
    let mut entropy = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut entropy);
    let mut hasher = Sha256::new();
    hasher.update(entropy);
    hasher.update(uri.as_bytes());
    let mut encoded = BASE64_URL_SAFE_NO_PAD.encode(hasher.finalize());
    encoded.truncate(ETAG_LEN);
    ETag(encoded)
}

/// Parsed `If-Match` / `If-None-Match` header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EtagMatch {
    /// `*`
    Any,
    Tags(Vec<String>),
}

impl EtagMatch {
    /// Parse a header value; quotes and weak markers are stripped
    pub fn parse(header: &str) -> EtagMatch {
        let header = header.trim();
        if header == "*" {
            return EtagMatch::Any;
        }
        let tags = header
            .split(',')
            .map(|t| {
                let t = t.trim();
                let t = t.strip_prefix("W/").unwrap_or(t);
                t.trim_matches('"').to_string()
            })
            .filter(|t| !t.is_empty())
            .collect();
        EtagMatch::Tags(tags)
    }

    fn matches(&self, current: Option<&ETag>) -> bool {
        match (self, current) {
            (_, None) => false,
            (EtagMatch::Any, Some(_)) => true,
            (EtagMatch::Tags(tags), Some(etag)) => tags.iter().any(|t| t == etag.as_str()),
        }
    }
}

/// Conditional headers of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preconditions {
    pub if_match: Option<EtagMatch>,
    pub if_none_match: Option<EtagMatch>,
}

impl Preconditions {
    pub fn none() -> Self {
        Preconditions::default()
    }

    pub fn if_match(header: &str) -> Self {
        Preconditions {
            if_match: Some(EtagMatch::parse(header)),
            if_none_match: None,
        }
    }

    pub fn if_none_match(header: &str) -> Self {
        Preconditions {
            if_match: None,
            if_none_match: Some(EtagMatch::parse(header)),
        }
    }
}

/// A failed condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("precondition failed")]
    Failed,
    /// If-None-Match matched on a read
    #[error("not modified")]
    NotModified,
}

impl From<PreconditionError> for XcapError {
    fn from(value: PreconditionError) -> Self {
        match value {
            PreconditionError::Failed => XcapError::PreconditionFailed,
            PreconditionError::NotModified => XcapError::NotModified,
        }
    }
}

/// Evaluate conditions against the current tag (None if no document exists)
pub fn check_precondition(current: Option<&ETag>, conditions: &Preconditions, read: bool) -> Result<(), PreconditionError> {
    if let Some(if_match) = &conditions.if_match {
        if !if_match.matches(current) {
            return Err(PreconditionError::Failed);
        }
    }
    if let Some(if_none_match) = &conditions.if_none_match {
        if if_none_match.matches(current) {
            return Err(if read {
                PreconditionError::NotModified
            } else {
                PreconditionError::Failed
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tags_differ() {
        let a = generate_etag("http://xcap.example.com/test-app/global/doc");
        let b = generate_etag("http://xcap.example.com/test-app/global/doc");
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), ETAG_LEN);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_alphanumeric() || c == b'-' || c == b'_'));
        assert_eq!(a.header_value(), format!("\"{}\"", a));
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(EtagMatch::parse(" * "), EtagMatch::Any);
        assert_eq!(
            EtagMatch::parse("\"abc\", W/\"def\""),
            EtagMatch::Tags(vec!["abc".into(), "def".into()])
        );
    }

    #[test]
    fn test_if_match() {
        let tag = ETag::new("abc");
        assert!(check_precondition(Some(&tag), &Preconditions::if_match("\"abc\""), false).is_ok());
        assert_eq!(
            check_precondition(Some(&tag), &Preconditions::if_match("\"xyz\""), false),
            Err(PreconditionError::Failed)
        );
        assert!(check_precondition(Some(&tag), &Preconditions::if_match("*"), false).is_ok());
        assert_eq!(
            check_precondition(None, &Preconditions::if_match("*"), false),
            Err(PreconditionError::Failed)
        );
    }

    #[test]
    fn test_if_none_match() {
        let tag = ETag::new("abc");
        assert!(check_precondition(None, &Preconditions::if_none_match("*"), false).is_ok());
        assert_eq!(
            check_precondition(Some(&tag), &Preconditions::if_none_match("*"), false),
            Err(PreconditionError::Failed)
        );
        assert_eq!(
            check_precondition(Some(&tag), &Preconditions::if_none_match("\"abc\""), true),
            Err(PreconditionError::NotModified)
        );
        assert!(check_precondition(Some(&tag), &Preconditions::if_none_match("\"old\""), false).is_ok());
    }
}
