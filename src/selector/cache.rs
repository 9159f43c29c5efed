//! Parsed node selector cache
//!
//! Clients address the same few selectors over and over, so parsed ASTs are
//! kept in an LRU keyed by the decoded selector text. Entries are shared
//! `Arc<NodeSelector>` values; the AST is never mutated after parsing.

use super::parser::{parse_node_selector, NodeSelector};
use super::ParseError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Thread-safe LRU of parsed node selectors
pub struct SelectorCache {
    entries: Option<Mutex<LruCache<String, Arc<NodeSelector>>>>,
    allow_extensions: bool,
}

impl SelectorCache {
    /// A capacity of zero disables caching
    pub fn new(capacity: usize, allow_extensions: bool) -> Self {
        SelectorCache {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            allow_extensions,
        }
    }

    /// Parse `selector`, reusing a cached AST when there is one
    pub fn get_or_parse(&self, selector: &str) -> Result<Arc<NodeSelector>, ParseError> {
        let Some(entries) = &self.entries else {
            return parse_node_selector(selector, self.allow_extensions).map(Arc::new);
        };
        if let Some(hit) = entries.lock().get(selector) {
            return Ok(Arc::clone(hit));
        }
        // Parsed outside the lock; racing inserts store equal ASTs
        let parsed = Arc::new(parse_node_selector(selector, self.allow_extensions)?);
        entries.lock().put(selector.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map(|e| e.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
