//! Remote Hotfix: idempotent text patching for files behind a Git content API
//!
//! One-off maintenance edits without a local checkout: fetch a file through
//! the hosting provider's contents API, apply a declarative text patch, and
//! write the result back under the optimistic-concurrency version token the
//! fetch handed out. A local-clone path drives the `git` CLI instead for
//! repositories where API writes are not an option.
//!
//! # Architecture
//!
//! The only component with real structure is the patch applier in
//! [`applier`]: a pure function from (document, patch definition) to
//! (new text, status). Everything around it - the [`remote`] store, the
//! [`vcs`] clone workflow, the CLI - is one-shot plumbing layered on top.
//!
//! # Safety
//!
//! - Applications are idempotent: a sentinel marker embedded in the
//!   replacement short-circuits re-runs
//! - A failed match returns the input byte-identical; nothing is written
//! - Writes are conditional on the version token captured at fetch time
//! - Local clone writes are atomic (tempfile + fsync + rename) and path
//!   containment is enforced
//!
//! # Example
//!
//! ```no_run
//! use remote_hotfix::applier;
//! use remote_hotfix::remote::{FileStore, GithubStore};
//!
//! # fn run(patch: &remote_hotfix::config::PatchDefinition) -> anyhow::Result<()> {
//! let store = GithubStore::new("acme/site", "main", "<token>")?;
//! let doc = store.fetch("client/src/pages/knowledge.tsx")?;
//!
//! let outcome = applier::apply(&doc.content, patch)?;
//! if outcome.status.is_change() {
//!     store.publish(&doc.path, &outcome.text, &doc.token, "fix: hotfix")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod applier;
pub mod cache;
pub mod config;
pub mod remote;
pub mod subst;
pub mod vcs;

// Re-exports
pub use applier::{apply, candidate_lines, ApplyError, ApplyStatus, PatchOutcome};
pub use config::{
    rules_from_path, spec_from_path, ConfigError, Fallback, PatchDefinition, PatchSpec, Rewrite,
    RulesFile, SubstitutionRule,
};
pub use remote::{Document, FileStore, GithubStore, MemoryStore, Receipt, StoreError, VersionToken};
pub use subst::{SubstError, SubstOutcome, SubstitutionSet};
pub use vcs::{GitClone, VcsError};
