//! Selector Module - XCAP URI parsing
//!
//! Turns a request URI into an immutable `ParsedUri`:
//! - `uri`: XCAP root matching and document selector splitting
//! - `lexer` / `parser`: the node selector grammar
//! - `cache`: LRU of parsed node selectors shared across requests

pub mod cache;
pub mod lexer;
pub mod parser;
pub mod uri;

pub use cache::SelectorCache;
pub use parser::{parse_node_selector, ElementStep, NameTest, NodeSelector, Predicate, QName, Step};
pub use uri::{DocumentSelector, ParsedUri, RootConfig, Scope, UriError, UriParser, UserId, WELCOME};

use thiserror::Error;

/// Which part of the URI failed to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    DocumentSelector,
    NodeSelector,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ParseErrorKind::DocumentSelector => "document selector",
            ParseErrorKind::NodeSelector => "node selector",
        })
    }
}

/// Malformed XCAP URI
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
        }
    }
}
