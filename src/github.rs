//! Destination repository on GitHub, driven through the git data REST API.
//!
//! One [`GithubTree`] is bound to one `owner/repo@branch`. Diffs are computed
//! locally against the branch's recursive tree listing by hashing pending
//! content with the blob convention, so unchanged files never travel.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use wp_mirror_core::binary::blob_address;
use wp_mirror_core::config::{Committer, RepositoryTarget};
use wp_mirror_core::contract::{Change, ChangedFile, CommitInfo, DiffEntry, ProposalReport, TreeService};
use wp_mirror_core::error::SyncError;
use wp_mirror_core::file_map::{join_path, relative_path, FileMap};

use crate::http::{check, decode_json, transport, USER_AGENT};

pub const API_ROOT: &str = "https://api.github.com";
const FILE_MODE: &str = "100644";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeItem {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    object: Sha,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    tree: Sha,
}

#[derive(Debug, Deserialize)]
struct CreatedCommit {
    sha: String,
    html_url: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    #[serde(default)]
    files: Vec<ChangedFileJson>,
}

#[derive(Debug, Deserialize)]
struct ChangedFileJson {
    filename: String,
    status: String,
}

pub struct GithubTree {
    http: Client,
    token: String,
    repo_url: String,
    branch: String,
}

impl GithubTree {
    pub fn new(http: Client, token: String, target: &RepositoryTarget) -> Self {
        Self {
            http,
            token,
            repo_url: format!("{API_ROOT}/repos/{}/{}", target.owner, target.repo),
            branch: target.branch.clone(),
        }
    }

    /// Client preconfigured for the API: user agent set.
    pub fn http_client() -> anyhow::Result<Client> {
        Ok(Client::builder().user_agent(USER_AGENT).build()?)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.repo_url);
        let mut request = self.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|e| transport(&url, e))?;
        let response = check(&url, response).await?;
        decode_json(&url, response).await
    }

    async fn head_commit(&self) -> Result<String, SyncError> {
        let reference: RefObject = self
            .send(Method::GET, &format!("/git/ref/heads/{}", self.branch), None)
            .await?;
        Ok(reference.object.sha)
    }

    async fn commit_tree(&self, commit: &str) -> Result<String, SyncError> {
        let commit: GitCommit = self.send(Method::GET, &format!("/git/commits/{commit}"), None).await?;
        Ok(commit.tree.sha)
    }

    async fn list_tree(&self) -> Result<Vec<TreeItem>, SyncError> {
        let head = self.head_commit().await?;
        let tree = self.commit_tree(&head).await?;
        let listing: TreeListing = self
            .send(Method::GET, &format!("/git/trees/{tree}?recursive=1"), None)
            .await?;
        if listing.truncated {
            warn!(branch = %self.branch, "Tree listing truncated; diff may include spurious writes");
        }
        Ok(listing.tree)
    }
}

/// Entries of `files` (relative to `prefix`) whose blob differs from `tree`,
/// every placeholder, and deletions for blobs under `prefix` that `files` no
/// longer has.
pub fn diff_against_tree(tree: &[TreeItem], files: &FileMap, prefix: &str) -> Vec<DiffEntry> {
    let blobs: HashMap<&str, &str> = tree
        .iter()
        .filter(|item| item.kind == "blob")
        .map(|item| (item.path.as_str(), item.sha.as_str()))
        .collect();

    let mut diff: Vec<DiffEntry> = files
        .iter()
        .filter_map(|(relative, content)| {
            let path = join_path(prefix, relative);
            let unchanged = content
                .render()
                .is_some_and(|text| blobs.get(path.as_str()) == Some(&blob_address(text.as_bytes()).as_str()));
            (!unchanged).then(|| DiffEntry {
                path,
                change: Change::Write(content.clone()),
            })
        })
        .collect();

    diff.extend(
        blobs
            .keys()
            .filter(|path| relative_path(prefix, path).is_some_and(|rel| !files.contains_key(rel)))
            .map(|path| DiffEntry {
                path: path.to_string(),
                change: Change::Delete,
            }),
    );
    diff.sort_by(|a, b| a.path.cmp(&b.path));
    diff
}

/// Tree-creation entries. Deletions carry an explicit `null` sha.
pub fn tree_entries(entries: &[DiffEntry]) -> Result<Vec<Value>, SyncError> {
    entries
        .iter()
        .map(|entry| {
            let path = &entry.path;
            match &entry.change {
                Change::Write(content) => {
                    let text = content
                        .render()
                        .ok_or_else(|| SyncError::Destination(format!("unresolved binary at {path}")))?;
                    Ok(json!({"path": path, "mode": FILE_MODE, "type": "blob", "content": text}))
                }
                Change::Blob(sha) => Ok(json!({"path": path, "mode": FILE_MODE, "type": "blob", "sha": sha})),
                Change::Delete => Ok(json!({"path": path, "mode": FILE_MODE, "type": "blob", "sha": Value::Null})),
            }
        })
        .collect()
}

/// Presence of a blob from the status of its existence check: 404 is absent,
/// other failures are errors.
pub fn object_presence(url: &str, status: StatusCode, body: String) -> Result<bool, SyncError> {
    match status {
        StatusCode::NOT_FOUND => Ok(false),
        status if status.is_success() => Ok(true),
        status => Err(SyncError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        }),
    }
}

#[async_trait]
impl TreeService for GithubTree {
    async fn compute_diff(&self, files: &FileMap, path_prefix: &str) -> Result<Vec<DiffEntry>, SyncError> {
        let tree = self.list_tree().await?;
        let diff = diff_against_tree(&tree, files, path_prefix);
        debug!(prefix = path_prefix, files = files.len(), entries = diff.len(), "Computed diff");
        Ok(diff)
    }

    async fn object_exists(&self, address: &str) -> Result<bool, SyncError> {
        let url = format!("{}/git/blobs/{address}", self.repo_url);
        let response = self
            .request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|e| transport(&url, e))?;
        let status = response.status();
        let body = if status.is_success() || status == StatusCode::NOT_FOUND {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        object_presence(&url, status, body)
    }

    async fn create_object(&self, bytes: &[u8]) -> Result<String, SyncError> {
        let body = json!({"content": STANDARD.encode(bytes), "encoding": "base64"});
        let created: Sha = self.send(Method::POST, "/git/blobs", Some(&body)).await?;
        debug!(sha = %created.sha, size = bytes.len(), "Created blob");
        Ok(created.sha)
    }

    async fn propose_change(
        &self,
        entries: &[DiffEntry],
        title: &str,
        committer: &Committer,
    ) -> Result<Option<ProposalReport>, SyncError> {
        if entries.is_empty() {
            return Ok(None);
        }
        let head = self.head_commit().await?;
        let base_tree = self.commit_tree(&head).await?;

        let tree_body = json!({"base_tree": base_tree, "tree": tree_entries(entries)?});
        let tree: Sha = self.send(Method::POST, "/git/trees", Some(&tree_body)).await?;
        if tree.sha == base_tree {
            info!(title, "Tree unchanged, skipping commit");
            return Ok(None);
        }

        let identity = json!({"name": committer.name, "email": committer.email});
        let commit_body = json!({
            "message": title,
            "tree": tree.sha,
            "parents": [head],
            "author": identity,
            "committer": identity,
        });
        let commit: CreatedCommit = self.send(Method::POST, "/git/commits", Some(&commit_body)).await?;

        let ref_body = json!({"sha": commit.sha});
        let _: Value = self
            .send(Method::PATCH, &format!("/git/refs/heads/{}", self.branch), Some(&ref_body))
            .await?;

        let details: CommitDetails = self.send(Method::GET, &format!("/commits/{}", commit.sha), None).await?;
        info!(sha = %commit.sha, files = details.files.len(), "Committed change");
        Ok(Some(ProposalReport {
            commit: CommitInfo {
                sha: commit.sha,
                html_url: commit.html_url,
                message: commit.message,
            },
            files: details
                .files
                .into_iter()
                .map(|f| ChangedFile {
                    filename: f.filename,
                    status: f.status,
                })
                .collect(),
        }))
    }
}
