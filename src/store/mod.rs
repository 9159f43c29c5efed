//! Document storage contract
//!
//! One document blob plus one ETag per (application, scope, document path).
//! `update` is the transactional primitive: the closure sees the current
//! document under the backend's read-for-update lock and decides what to
//! commit, so fetch, precondition check, mutation and write are atomic per
//! document.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{StoreError, XcapError};
use crate::etag::ETag;
use crate::selector::Scope;

/// Storage key of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    /// Storage application id; aliases share one id
    pub application_id: String,
    pub scope: Scope,
    pub document_path: String,
}

/// A stored document and its tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub content: Vec<u8>,
    pub etag: ETag,
}

/// Decision returned by an update closure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Write(StoredDocument),
    Remove,
}

/// What an update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Tag before the update, None if there was no document
    pub previous: Option<ETag>,
    /// Tag after the update, None if the document is gone
    pub current: Option<ETag>,
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    pub application_id: String,
    pub document_path: String,
    pub etag: ETag,
}

/// Update closure: current document in, commit decision out
pub type UpdateFn<'a> = dyn FnMut(Option<&StoredDocument>) -> Result<Commit, XcapError> + 'a;

/// Storage backend
pub trait DocumentStore: Send + Sync {
    /// Snapshot of a document
    fn fetch(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError>;

    /// Run `operation` on the current document under the document's lock
    ///
    /// An error from the closure aborts the update without writing.
    fn update(&self, key: &DocumentKey, operation: &mut UpdateFn<'_>) -> Result<UpdateOutcome, XcapError>;

    /// Remove every document of a scope and application, returning how many went
    fn delete_all(&self, scope: &Scope, application_id: &str) -> Result<usize, StoreError>;

    /// All documents of a scope, ordered by application then path
    fn list_documents(&self, scope: &Scope) -> Result<Vec<DocumentEntry>, StoreError>;
}
