//! Change notification
//!
//! Notifiers are told about every committed change after the store write.
//! Delivery is fire-and-forget: a notifier cannot fail the request.

use crate::etag::ETag;
use parking_lot::Mutex;
use tracing::info;

/// Receiver of committed document changes
pub trait ChangeNotifier: Send + Sync {
    /// `new_etag` is None when the document was deleted
    fn document_changed(&self, uri: &str, old_etag: Option<&ETag>, new_etag: Option<&ETag>);
}

/// Logs changes through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ChangeNotifier for TracingNotifier {
    fn document_changed(&self, uri: &str, old_etag: Option<&ETag>, new_etag: Option<&ETag>) {
        info!(
            uri,
            old_etag = old_etag.map(ETag::as_str),
            new_etag = new_etag.map(ETag::as_str),
            "document changed"
        );
    }
}

/// One recorded change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub uri: String,
    pub old_etag: Option<ETag>,
    pub new_etag: Option<ETag>,
}

/// Keeps every change in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    changes: Mutex<Vec<ChangeRecord>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        RecordingNotifier::default()
    }

    /// Drain recorded changes
    pub fn take(&self) -> Vec<ChangeRecord> {
        std::mem::take(&mut *self.changes.lock())
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn document_changed(&self, uri: &str, old_etag: Option<&ETag>, new_etag: Option<&ETag>) {
        self.changes.lock().push(ChangeRecord {
            uri: uri.to_string(),
            old_etag: old_etag.cloned(),
            new_etag: new_etag.cloned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        let tag = ETag::new("t1");
        notifier.document_changed("http://h/app/global/doc", None, Some(&tag));
        TracingNotifier.document_changed("http://h/app/global/doc", Some(&tag), None);
        let changes = notifier.take();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_etag, Some(tag));
        assert!(notifier.take().is_empty());
    }
}
