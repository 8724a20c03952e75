//! Local-clone workflow: blocking `git` subprocess calls plus atomic file
//! writes into the clone.
//!
//! This is the alternative to the content-API path: patch the file inside a
//! checkout, then commit and push through an authenticated remote URL. Every
//! git call runs to completion and a non-zero exit fails the whole run.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("git {subcommand} failed ({status}): {stderr}")]
    Command {
        subcommand: String,
        status: i32,
        stderr: String,
    },

    #[error("could not run git: {0}")]
    Spawn(std::io::Error),

    #[error("origin remote is not a GitHub URL: {url}")]
    NotGithubRemote { url: String },

    #[error("path escapes the clone root: {path}")]
    OutsideClone { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A local clone to run git commands in.
#[derive(Debug, Clone)]
pub struct GitClone {
    root: PathBuf,
}

impl GitClone {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        GitClone { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one git subcommand, capturing stdout. Fail-fast on non-zero exit.
    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(VcsError::Spawn)?;

        if !output.status.success() {
            return Err(VcsError::Command {
                subcommand: args.first().copied().unwrap_or("?").to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Set the commit identity for this clone only.
    pub fn configure_identity(&self, name: &str, email: &str) -> Result<(), VcsError> {
        self.git(&["config", "user.name", name])?;
        self.git(&["config", "user.email", email])?;
        Ok(())
    }

    pub fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["checkout", branch]).map(|_| ())
    }

    pub fn pull(&self, remote: &str, branch: &str) -> Result<(), VcsError> {
        self.git(&["pull", remote, branch]).map(|_| ())
    }

    /// True when the working tree differs from HEAD.
    pub fn has_changes(&self) -> Result<bool, VcsError> {
        // diff-index exits 1 on differences, which the fail-fast runner
        // would treat as an error; inspect the porcelain status instead.
        Ok(!self.git(&["status", "--porcelain"])?.is_empty())
    }

    /// Stage everything and commit.
    pub fn commit_all(&self, message: &str) -> Result<(), VcsError> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-m", message]).map(|_| ())
    }

    /// The `owner/name` slug of the origin remote.
    pub fn origin_slug(&self) -> Result<String, VcsError> {
        let url = self.git(&["remote", "get-url", "origin"])?;
        parse_github_slug(&url).ok_or(VcsError::NotGithubRemote { url })
    }

    /// Push `branch` through a token-authenticated HTTPS URL built from the
    /// origin slug. The URL is passed directly to git and never stored in
    /// the clone's config.
    pub fn push_authenticated(&self, token: &str, branch: &str) -> Result<(), VcsError> {
        let slug = self.origin_slug()?;
        let auth_url = format!("https://{token}@github.com/{slug}.git");
        self.git(&["push", &auth_url, branch]).map(|_| ())
    }

    /// Atomically write `content` to a repository-relative path inside the
    /// clone, after checking the path cannot escape the clone root.
    pub fn write_file(&self, repo_path: &str, content: &str) -> Result<PathBuf, VcsError> {
        let relative = contained_path(repo_path)?;
        let absolute = self.root.join(relative);

        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).map_err(|source| VcsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        atomic_write(&absolute, content.as_bytes()).map_err(|source| VcsError::Io {
            path: absolute.clone(),
            source,
        })?;

        Ok(absolute)
    }
}

/// Validate that a repository-relative path stays inside the clone: no
/// absolute paths, no `..` components.
fn contained_path(repo_path: &str) -> Result<&Path, VcsError> {
    let path = Path::new(repo_path);

    let escapes = path.components().any(|component| {
        !matches!(component, Component::Normal(_) | Component::CurDir)
    });
    if escapes || repo_path.is_empty() {
        return Err(VcsError::OutsideClone {
            path: repo_path.to_string(),
        });
    }

    Ok(path)
}

/// Extract `owner/name` from an HTTPS or SSH GitHub remote URL.
fn parse_github_slug(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/').trim_end_matches(".git");

    let rest = trimmed
        .split_once("github.com")
        .map(|(_, rest)| rest.trim_start_matches([':', '/']))?;

    let mut parts = rest.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }

    Some(format!("{owner}/{name}"))
}

/// Atomic write: tempfile in the target directory, fsync, rename.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
