//! In-process document store
//!
//! Documents are grouped per scope (one user, or global). Each scope has its
//! own mutex, so updates to different users run in parallel while updates
//! within a scope are serialized, like row locks on an account record.
//! An account that ends up empty is dropped by the last update holding it.

use super::{Commit, DocumentEntry, DocumentKey, DocumentStore, StoredDocument, UpdateFn, UpdateOutcome};
use crate::error::{StoreError, XcapError};
use crate::selector::Scope;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Documents of one scope keyed by (application id, document path)
type Account = BTreeMap<(String, String), StoredDocument>;

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<Scope, Arc<Mutex<Account>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Account lock for a scope, created on first use
    fn account(&self, scope: &Scope) -> Arc<Mutex<Account>> {
        let mut accounts = self.accounts.lock();
        Arc::clone(accounts.entry(scope.clone()).or_default())
    }

    fn existing_account(&self, scope: &Scope) -> Option<Arc<Mutex<Account>>> {
        self.accounts.lock().get(scope).cloned()
    }

    /// Drop our handle, removing the account if it is empty and unused
    ///
    /// Handles are only cloned under the map lock, so a count of two (map and
    /// ours) means nobody else can be holding the account lock.
    fn release(&self, scope: &Scope, account: Arc<Mutex<Account>>) {
        let mut accounts = self.accounts.lock();
        let unused = accounts
            .get(scope)
            .is_some_and(|held| Arc::ptr_eq(held, &account) && Arc::strong_count(&account) == 2);
        if unused && account.lock().is_empty() {
            accounts.remove(scope);
        }
    }

    #[cfg(test)]
    fn account_count(&self) -> usize {
        self.accounts.lock().len()
    }

    /// Number of stored documents across all scopes
    pub fn len(&self) -> usize {
        let accounts: Vec<_> = self.accounts.lock().values().cloned().collect();
        accounts.iter().map(|a| a.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn account_key(key: &DocumentKey) -> (String, String) {
    (key.application_id.clone(), key.document_path.clone())
}

impl DocumentStore for MemoryStore {
    fn fetch(&self, key: &DocumentKey) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .existing_account(&key.scope)
            .and_then(|account| account.lock().get(&account_key(key)).cloned()))
    }

    fn update(&self, key: &DocumentKey, operation: &mut UpdateFn<'_>) -> Result<UpdateOutcome, XcapError> {
        let account = self.account(&key.scope);
        let result = {
            let mut documents = account.lock();
            let slot = account_key(key);
            let current = documents.get(&slot);
            let previous = current.map(|d| d.etag.clone());

            operation(current).map(|commit| match commit {
                Commit::Write(document) => {
                    let etag = document.etag.clone();
                    documents.insert(slot, document);
                    UpdateOutcome {
                        previous,
                        current: Some(etag),
                    }
                }
                Commit::Remove => {
                    documents.remove(&slot);
                    UpdateOutcome { previous, current: None }
                }
            })
        };
        self.release(&key.scope, account);
        result
    }

    fn delete_all(&self, scope: &Scope, application_id: &str) -> Result<usize, StoreError> {
        let Some(account) = self.existing_account(scope) else {
            return Ok(0);
        };
        let removed = {
            let mut documents = account.lock();
            let before = documents.len();
            documents.retain(|(app, _), _| app != application_id);
            before - documents.len()
        };
        self.release(scope, account);
        Ok(removed)
    }

    fn list_documents(&self, scope: &Scope) -> Result<Vec<DocumentEntry>, StoreError> {
        let Some(account) = self.existing_account(scope) else {
            return Ok(Vec::new());
        };
        let documents = account.lock();
        Ok(documents
            .iter()
            .map(|((app, path), doc)| DocumentEntry {
                application_id: app.clone(),
                document_path: path.clone(),
                etag: doc.etag.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictTag;
    use crate::etag::ETag;
    use crate::selector::UserId;

    fn key(app: &str, path: &str) -> DocumentKey {
        DocumentKey {
            application_id: app.into(),
            scope: Scope::User(UserId::new("alice", "example.com")),
            document_path: path.into(),
        }
    }

    fn doc(body: &str, tag: &str) -> StoredDocument {
        StoredDocument {
            content: body.as_bytes().to_vec(),
            etag: ETag::new(tag),
        }
    }

    #[test]
    fn test_write_fetch_remove() {
        let store = MemoryStore::new();
        let k = key("test-app", "index");
        let outcome = store.update(&k, &mut |current| {
            assert!(current.is_none());
            Ok(Commit::Write(doc("<a/>", "t1")))
        });
        assert_eq!(outcome.unwrap(), UpdateOutcome { previous: None, current: Some(ETag::new("t1")) });
        assert_eq!(store.fetch(&k).unwrap().unwrap().etag, ETag::new("t1"));

        let outcome = store.update(&k, &mut |_| Ok(Commit::Remove)).unwrap();
        assert_eq!(outcome.previous, Some(ETag::new("t1")));
        assert!(store.fetch(&k).unwrap().is_none());
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let store = MemoryStore::new();
        let k = key("test-app", "index");
        store.update(&k, &mut |_| Ok(Commit::Write(doc("<a/>", "t1")))).unwrap();
        let err = store
            .update(&k, &mut |_| Err(XcapError::Conflict(ConflictTag::CannotInsert)))
            .unwrap_err();
        assert_eq!(err, XcapError::Conflict(ConflictTag::CannotInsert));
        assert_eq!(store.fetch(&k).unwrap().unwrap(), doc("<a/>", "t1"));
    }

    #[test]
    fn test_delete_all_and_listing() {
        let store = MemoryStore::new();
        for (app, path) in [("resource-lists", "index"), ("resource-lists", "work"), ("pres-rules", "index.xml")] {
            store.update(&key(app, path), &mut |_| Ok(Commit::Write(doc("<a/>", path)))).unwrap();
        }
        let scope = key("", "").scope;
        let listed: Vec<_> = store
            .list_documents(&scope)
            .unwrap()
            .into_iter()
            .map(|e| (e.application_id, e.document_path))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("pres-rules".to_string(), "index.xml".to_string()),
                ("resource-lists".to_string(), "index".to_string()),
                ("resource-lists".to_string(), "work".to_string()),
            ]
        );
        assert_eq!(store.delete_all(&scope, "resource-lists").unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete_all(&Scope::Global, "resource-lists").unwrap(), 0);

        assert_eq!(store.delete_all(&scope, "pres-rules").unwrap(), 1);
        assert_eq!(store.account_count(), 0);
        assert!(store.list_documents(&scope).unwrap().is_empty());
    }

    #[test]
    fn test_empty_accounts_are_dropped() {
        let store = MemoryStore::new();
        let k = key("test-app", "index");
        let err = store
            .update(&k, &mut |_| Err(XcapError::NotFound("no document".into())))
            .unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(store.account_count(), 0);

        store.update(&k, &mut |_| Ok(Commit::Write(doc("<a/>", "t1")))).unwrap();
        assert_eq!(store.account_count(), 1);
        store.update(&k, &mut |_| Ok(Commit::Remove)).unwrap();
        assert_eq!(store.account_count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_parallel_updates_serialize_per_document() {
        let store = MemoryStore::new();
        let k = key("test-app", "counter");
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        store
                            .update(&k, &mut |current| {
                                let n: usize = current
                                    .map(|d| String::from_utf8(d.content.clone()).unwrap().parse().unwrap())
                                    .unwrap_or(0);
                                Ok(Commit::Write(doc(&(n + 1).to_string(), "t")))
                            })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.fetch(&k).unwrap().unwrap().content, b"400".to_vec());
        assert_eq!(store.account_count(), 1);
    }
}
