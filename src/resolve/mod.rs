//! Resolve Module - selector evaluation against a document
//!
//! - `namespace`: selector QName to expanded name
//! - `navigator`: step-by-step evaluation and insertion slots

pub mod namespace;
pub mod navigator;

pub use namespace::{NameKind, NamespaceContext, NamespaceError, ResolvedQName};
pub use navigator::{InsertionPoint, NavigationError, Navigator, ResolvedTarget};
