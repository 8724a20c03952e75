//! In-memory [`FileStore`] used by the test suite.
//!
//! Implements the same optimistic-concurrency contract as the real store:
//! every write bumps a revision counter, the token is derived from that
//! counter, and a publish with a stale token is rejected without touching
//! the stored content.

use crate::remote::{Document, FileStore, Receipt, StoreError, VersionToken};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, StoredFile>>,
}

struct StoredFile {
    content: String,
    revision: u64,
}

impl StoredFile {
    fn token(&self) -> VersionToken {
        VersionToken(format!("r{}", self.revision))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, bumping its revision if it already exists.
    pub fn insert(&self, path: &str, content: &str) {
        let mut files = self.files.lock().expect("store lock poisoned");
        let entry = files.entry(path.to_string()).or_insert(StoredFile {
            content: String::new(),
            revision: 0,
        });
        entry.revision += 1;
        entry.content = content.to_string();
    }

    /// Current content, bypassing the fetch contract. Test inspection only.
    pub fn content(&self, path: &str) -> Option<String> {
        let files = self.files.lock().expect("store lock poisoned");
        files.get(path).map(|f| f.content.clone())
    }
}

impl FileStore for MemoryStore {
    fn fetch(&self, path: &str) -> Result<Document, StoreError> {
        let files = self.files.lock().expect("store lock poisoned");
        let stored = files.get(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;
        Ok(Document {
            path: path.to_string(),
            content: stored.content.clone(),
            token: stored.token(),
        })
    }

    fn publish(
        &self,
        path: &str,
        content: &str,
        token: &VersionToken,
        _message: &str,
    ) -> Result<Receipt, StoreError> {
        let mut files = self.files.lock().expect("store lock poisoned");
        let stored = files.get_mut(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })?;

        if &stored.token() != token {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }

        stored.revision += 1;
        stored.content = content.to_string();
        Ok(Receipt {
            token: stored.token(),
            commit: format!("memory:{path}@r{}", stored.revision),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_then_publish_round_trips() {
        let store = MemoryStore::new();
        store.insert("a.txt", "one");

        let doc = store.fetch("a.txt").unwrap();
        assert_eq!(doc.content, "one");

        let receipt = store.publish("a.txt", "two", &doc.token, "update").unwrap();
        assert_ne!(receipt.token, doc.token);
        assert_eq!(store.content("a.txt").as_deref(), Some("two"));
    }

    #[test]
    fn stale_token_is_rejected_and_content_unchanged() {
        let store = MemoryStore::new();
        store.insert("a.txt", "one");

        let doc = store.fetch("a.txt").unwrap();

        // A concurrent edit lands between our fetch and publish.
        store.insert("a.txt", "concurrent edit");

        let err = store
            .publish("a.txt", "two", &doc.token, "update")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.content("a.txt").as_deref(), Some("concurrent edit"));
    }

    #[test]
    fn fetch_missing_path_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
