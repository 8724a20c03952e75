//! GitHub contents-API implementation of [`FileStore`].
//!
//! One GET and one PUT per document, both against
//! `/repos/{owner}/{repo}/contents/{path}`. The file's blob `sha` is the
//! version token: GitHub rejects a PUT whose `sha` no longer matches the
//! branch head's copy, which is exactly the conflict semantics the store
//! contract asks for.

use crate::remote::{Document, FileStore, Receipt, StoreError, VersionToken};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

pub struct GithubStore {
    client: Client,
    api_base: String,
    repo: String,
    branch: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    content: String,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
    commit: PutCommit,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Deserialize)]
struct PutCommit {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
}

impl GithubStore {
    /// Build a store for `owner/repo` at `branch`, authenticating with a
    /// personal access token.
    pub fn new(repo: &str, branch: &str, token: &str) -> Result<Self, StoreError> {
        Self::with_api_base(DEFAULT_API_BASE, repo, branch, token)
    }

    /// Same as [`GithubStore::new`] with an explicit API base URL. Used by
    /// tests and GitHub Enterprise installs.
    pub fn with_api_base(
        api_base: &str,
        repo: &str,
        branch: &str,
        token: &str,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .user_agent(concat!("remote-hotfix/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GithubStore {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            token: token.to_string(),
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, self.repo, path)
    }
}

impl FileStore for GithubStore {
    fn fetch(&self, path: &str) -> Result<Document, StoreError> {
        let response = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", self.branch.as_str())])
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT_HEADER)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, path, response.text()?));
        }

        let body: ContentResponse = response.json()?;
        let content = decode_content(path, &body.content)?;

        Ok(Document {
            path: path.to_string(),
            content,
            token: VersionToken(body.sha),
        })
    }

    fn publish(
        &self,
        path: &str,
        content: &str,
        token: &VersionToken,
        message: &str,
    ) -> Result<Receipt, StoreError> {
        let payload = PutRequest {
            message,
            content: BASE64.encode(content.as_bytes()),
            sha: token.as_str(),
            branch: &self.branch,
        };

        let response = self
            .client
            .put(self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT_HEADER)
            .json(&payload)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, path, response.text()?));
        }

        let body: PutResponse = response.json()?;
        Ok(Receipt {
            token: VersionToken(body.content.sha),
            commit: body.commit.html_url.unwrap_or(body.commit.sha),
        })
    }
}

/// Map an error status onto the store's error taxonomy.
///
/// GitHub reports a stale blob sha as 409 on some paths and 422 on others;
/// both mean the branch moved underneath us.
fn classify_failure(status: StatusCode, path: &str, body: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => StoreError::NotFound {
            path: path.to_string(),
        },
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Conflict {
            path: path.to_string(),
        },
        _ => StoreError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// Decode the contents payload. GitHub base64-encodes blobs with embedded
/// newlines every 60 characters; strip all whitespace before decoding.
fn decode_content(path: &str, encoded: &str) -> Result<String, StoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|e| StoreError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
