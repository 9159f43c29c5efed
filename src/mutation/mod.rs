//! Mutation Module - GET, PUT and DELETE against one document
//!
//! The engine works on a private parse of the stored bytes. Nothing it does
//! is visible until the caller commits the returned bytes, so a failed
//! post-condition leaves the stored document untouched.

pub mod engine;

pub use engine::MutationEngine;

use crate::error::{ConflictTag, XcapError};
use crate::resolve::NavigationError;
use thiserror::Error;

/// Content type of element GET responses and element PUT bodies
pub const XCAP_ELEMENT_MIME: &str = "application/xcap-el+xml";

/// Content type of attribute GET responses and attribute PUT bodies
pub const XCAP_ATTRIBUTE_MIME: &str = "application/xcap-att+xml";

/// Content type of namespace binding GET responses
pub const XCAP_NAMESPACE_MIME: &str = "application/xcap-ns+xml";

/// Errors raised while applying a request to a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("conflict: {0}")]
    Conflict(ConflictTag),

    /// Namespace bindings are read-only
    #[error("namespace bindings cannot be modified")]
    NamespaceBindings,

    #[error("unsupported media type {0}")]
    UnsupportedMediaType(String),

    #[error("stored document is corrupt: {0}")]
    Corrupt(String),
}

impl From<MutationError> for XcapError {
    fn from(value: MutationError) -> Self {
        match value {
            MutationError::Navigation(e) => e.into(),
            MutationError::Conflict(tag) => XcapError::Conflict(tag),
            MutationError::NamespaceBindings => XcapError::MethodNotAllowed,
            MutationError::UnsupportedMediaType(mime) => XcapError::UnsupportedMediaType(mime),
            MutationError::Corrupt(message) => XcapError::CorruptDocument(message),
        }
    }
}

/// Body and content type of a GET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// New document bytes after a PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    pub content: Vec<u8>,
    /// A new node or document was created rather than replaced
    pub created: bool,
}

/// Result of a DELETE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// The document remains with these bytes
    Updated(Vec<u8>),
    /// The whole document goes away
    DocumentRemoved,
}

/// Media type without parameters, lowercased
pub(crate) fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Accept a missing content type or one matching `expected`
pub(crate) fn check_media_type(content_type: Option<&str>, expected: &str) -> Result<(), MutationError> {
    match content_type {
        Some(ct) if media_type(ct) != expected.to_ascii_lowercase() => {
            Err(MutationError::UnsupportedMediaType(ct.to_string()))
        }
        _ => Ok(()),
    }
}
