//! Error taxonomy shared by every pipeline stage.
//!
//! Transient errors (transport failures and 5xx statuses) are the only ones
//! the retry loop in [`crate::fetch`] will retry. Everything else propagates
//! on first occurrence and aborts the stage that raised it.

use thiserror::Error;

use crate::record::ContentKind;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: Box<SyncError>,
    },

    #[error("malformed {kind} record: {message}")]
    Record { kind: ContentKind, message: String },

    #[error("{kind} synchronisation failed")]
    Stage {
        kind: ContentKind,
        #[source]
        source: Box<SyncError>,
    },

    #[error("destination error: {0}")]
    Destination(String),

    #[error("notification error: {0}")]
    Notify(String),
}

impl SyncError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
