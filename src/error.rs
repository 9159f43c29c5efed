//! Request errors and their status mapping
//!
//! Each layer has its own error enum; `XcapError` aggregates them and knows
//! the status code and body a protocol front end should send.

use crate::resolve::{NamespaceError, NavigationError};
use crate::selector::{ParseError, ParseErrorKind, UriError, WELCOME};
use std::fmt;
use thiserror::Error;

/// Namespace of the `<xcap-error>` conflict report
pub const XCAP_ERROR_NAMESPACE: &str = "urn:ietf:params:xml:ns:xcap-error";

/// Content type of conflict reports
pub const XCAP_ERROR_MIME: &str = "application/xcap-error+xml";

/// Conflict condition reported in a 409 body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictTag {
    NotWellFormed,
    NotXmlFrag,
    NotXmlAttValue,
    NoParent,
    CannotInsert,
    CannotDelete,
    NotUtf8,
}

impl ConflictTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictTag::NotWellFormed => "not-well-formed",
            ConflictTag::NotXmlFrag => "not-xml-frag",
            ConflictTag::NotXmlAttValue => "not-xml-att-value",
            ConflictTag::NoParent => "no-parent",
            ConflictTag::CannotInsert => "cannot-insert",
            ConflictTag::CannotDelete => "cannot-delete",
            ConflictTag::NotUtf8 => "not-utf-8",
        }
    }

    /// `<xcap-error>` document for this condition
    pub fn to_xml(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xcap-error xmlns=\"{}\"><{}/></xcap-error>",
            XCAP_ERROR_NAMESPACE,
            self.as_str()
        )
    }
}

impl fmt::Display for ConflictTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage backend failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend could not complete the operation
    #[error("Storage operation failed: {0}")]
    Backend(String),
}

/// The error type for every XCAP operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XcapError {
    /// The URI could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A selector prefix has no binding
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// Nothing at the URI; the message is for logs only
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request addressed the bare XCAP root
    #[error("Not found: XCAP root")]
    RootAccess,

    /// The requester may not perform this operation
    #[error("Forbidden")]
    Forbidden,

    /// PUT or DELETE on namespace bindings
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The request conflicts with the document
    #[error("Conflict: {0}")]
    Conflict(ConflictTag),

    /// An If-Match or If-None-Match condition failed
    #[error("Precondition failed")]
    PreconditionFailed,

    /// GET with an If-None-Match that matched
    #[error("Not modified")]
    NotModified,

    /// The request body content type does not fit the target
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// A stored document no longer parses
    #[error("Stored document is corrupt: {0}")]
    CorruptDocument(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl XcapError {
    /// Status code for the response
    pub fn status(&self) -> u16 {
        match self {
            // A document selector that does not parse names no resource
            XcapError::Parse(e) if e.kind == ParseErrorKind::DocumentSelector => 404,
            XcapError::Parse(_) | XcapError::Namespace(_) => 400,
            XcapError::NotFound(_) | XcapError::RootAccess => 404,
            XcapError::Forbidden => 403,
            XcapError::MethodNotAllowed => 405,
            XcapError::Conflict(_) => 409,
            XcapError::PreconditionFailed => 412,
            XcapError::NotModified => 304,
            XcapError::UnsupportedMediaType(_) => 415,
            XcapError::CorruptDocument(_) | XcapError::Store(_) => 500,
        }
    }

    /// Response body and its content type, when the status carries one
    pub fn body(&self) -> Option<(&'static str, String)> {
        match self {
            XcapError::RootAccess => Some(("text/html", WELCOME.to_string())),
            XcapError::Conflict(tag) => Some((XCAP_ERROR_MIME, tag.to_xml())),
            XcapError::Parse(e) => Some(("text/plain", e.to_string())),
            XcapError::Namespace(e) => Some(("text/plain", e.to_string())),
            _ => None,
        }
    }
}

impl From<UriError> for XcapError {
    fn from(value: UriError) -> Self {
        match value {
            UriError::NoRoot(uri) => XcapError::NotFound(format!("XCAP root not found for URI: {uri}")),
            UriError::RootAccess => XcapError::RootAccess,
            UriError::Parse(e) => XcapError::Parse(e),
        }
    }
}

impl From<NavigationError> for XcapError {
    fn from(value: NavigationError) -> Self {
        match value {
            NavigationError::NotFound => XcapError::NotFound("selector matches nothing".into()),
            // A selector has to pick exactly one node, so several matches find nothing
            NavigationError::Ambiguous => XcapError::NotFound("selector matches more than one element".into()),
            NavigationError::Conflict(tag) => XcapError::Conflict(tag),
            NavigationError::Namespace(e) => XcapError::Namespace(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(XcapError::from(ParseError::new(ParseErrorKind::NodeSelector, "x")).status(), 400);
        assert_eq!(XcapError::from(ParseError::new(ParseErrorKind::DocumentSelector, "x")).status(), 404);
        assert_eq!(XcapError::from(NavigationError::Ambiguous).status(), 404);
        assert_eq!(XcapError::from(NavigationError::Conflict(ConflictTag::NoParent)).status(), 409);
        assert_eq!(XcapError::from(UriError::RootAccess).status(), 404);
        assert_eq!(XcapError::MethodNotAllowed.status(), 405);
        assert_eq!(XcapError::PreconditionFailed.status(), 412);
    }

    #[test]
    fn test_conflict_body() {
        let (mime, body) = XcapError::Conflict(ConflictTag::CannotInsert).body().unwrap();
        assert_eq!(mime, XCAP_ERROR_MIME);
        assert!(body.ends_with("<xcap-error xmlns=\"urn:ietf:params:xml:ns:xcap-error\"><cannot-insert/></xcap-error>"));
    }

    #[test]
    fn test_root_access_body() {
        let (mime, body) = XcapError::from(UriError::RootAccess).body().unwrap();
        assert_eq!(mime, "text/html");
        assert_eq!(body, WELCOME);
    }
}
