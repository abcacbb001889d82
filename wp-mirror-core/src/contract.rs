//! # contract: interfaces to the systems the pipeline talks to
//!
//! The core never opens a socket itself. It talks to three collaborators:
//! - [`SourceClient`]: the paginated content REST API (one attempt per call;
//!   retries are decided by the core, see [`crate::fetch::RetryPolicy`]).
//! - [`TreeService`]: the destination repository (diffing, content-addressed
//!   objects, change proposals).
//! - [`Notifier`]: the chat channel receiving summaries and error reports.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the generated `Mock*` types are
//!   exported behind the `test-export-mocks` feature so downstream crates can
//!   use them in their own tests.

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use serde_json::Value;

use crate::config::Committer;
use crate::error::SyncError;
use crate::file_map::{FileContent, FileMap};

/// One page of rows from a collection request.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    pub rows: Vec<Value>,
    /// Value of the total-pages response header, if the server sent one.
    pub total_pages: Option<u32>,
}

/// Trait for reading from the content source.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page of a collection. `url` is complete, query string included.
    async fn get_page(&self, url: &str) -> Result<SourcePage, SyncError>;

    /// Fetch a JSON document (dictionary lookups).
    async fn get_json(&self, url: &str) -> Result<Value, SyncError>;

    /// Download a binary asset.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SyncError>;
}

/// What a diff entry would do to its path.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Write literal content (or, for [`FileContent::Placeholder`], a binary
    /// that has not been resolved yet).
    Write(FileContent),
    /// Point the path at an existing content-addressed object.
    Blob(String),
    Delete,
}

/// A path the destination reports as different from its current state.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// Full repository path, prefix included.
    pub path: String,
    pub change: Change,
}

impl DiffEntry {
    pub fn is_placeholder(&self) -> bool {
        matches!(&self.change, Change::Write(content) if content.is_placeholder())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub html_url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedFile {
    pub filename: String,
    /// e.g. `added`, `modified`, `removed`.
    pub status: String,
}

/// Descriptor of a change proposal that was actually created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalReport {
    pub commit: CommitInfo,
    pub files: Vec<ChangedFile>,
}

/// Trait for the destination repository.
/// Implementors are bound to one repository and branch.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TreeService: Send + Sync {
    /// Compare `files` (paths relative to `path_prefix`) against the
    /// destination and return only the entries that differ, deletions of
    /// files under the prefix that are absent from `files` included.
    async fn compute_diff(
        &self,
        files: &FileMap,
        path_prefix: &str,
    ) -> Result<Vec<DiffEntry>, SyncError>;

    /// Whether an object with this content-address is already stored.
    /// An absent object is `Ok(false)`, never an error.
    async fn object_exists(&self, address: &str) -> Result<bool, SyncError>;

    /// Store bytes and return their content-address.
    async fn create_object(&self, bytes: &[u8]) -> Result<String, SyncError>;

    /// Submit `entries` as one change. `Ok(None)` when the change turned out
    /// to be a no-op.
    async fn propose_change(
        &self,
        entries: &[DiffEntry],
        title: &str,
        committer: &Committer,
    ) -> Result<Option<ProposalReport>, SyncError>;
}

/// A chat message. `thread` set means "reply into that thread".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub text: String,
    pub username: Option<String>,
    pub thread: Option<String>,
}

/// Trait for the notification channel.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a message and return the id replies can thread under.
    async fn post(&self, message: Message) -> Result<String, SyncError>;
}
