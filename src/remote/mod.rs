//! Remote file store: fetch a document, publish it back.
//!
//! A store hands out a [`Document`] carrying the content and an opaque
//! [`VersionToken`]; publishing requires that token back, and a stale token
//! is rejected with [`StoreError::Conflict`]. That token round-trip is the
//! only concurrency guard in the system - there is no merge.

pub mod github;
pub mod memory;

use std::fmt;
use thiserror::Error;

pub use github::GithubStore;
pub use memory::MemoryStore;

/// Opaque identifier of a document's current state at the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched file: immutable content plus the token needed to write it back.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub token: VersionToken,
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The document's new version token.
    pub token: VersionToken,
    /// Human-readable reference to the created commit.
    pub commit: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file not found at {path}")]
    NotFound { path: String },

    #[error("credentials rejected by the store ({status})")]
    Auth { status: u16 },

    #[error("stale version token for {path}: the file changed remotely since it was fetched")]
    Conflict { path: String },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected API response ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("could not decode content for {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Point-to-point contract with the remote store. Both calls are blocking
/// and fail-fast; nothing here retries.
pub trait FileStore {
    /// `GET content(path, ref)` - fetch the document at the store's branch.
    fn fetch(&self, path: &str) -> Result<Document, StoreError>;

    /// `PUT content(path, ...)` - conditional write keyed on the version
    /// token captured at fetch time.
    fn publish(
        &self,
        path: &str,
        content: &str,
        token: &VersionToken,
        message: &str,
    ) -> Result<Receipt, StoreError>;
}
