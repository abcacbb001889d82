//! High-level pipeline: mirrors one endpoint's media, posts and pages into the
//! destination repository.
//!
//! For each content type the pipeline:
//!   - Fetches every row of the collection (paged, retried)
//!   - Normalises rows into a [`FileMap`] of metadata/body files
//!   - Asks the destination for the minimal diff against that map
//!   - For media only: downloads binaries whose metadata changed, uploading
//!     them only when the destination lacks the object, and drops the
//!     remaining placeholders
//!   - Raises a change proposal only when the diff is non-empty
//!
//! # Ordering
//! Media runs first because post/page media usage is detected against the
//! media library built in that stage. Posts run before pages. Nothing runs
//! concurrently within one endpoint.
//!
//! # Error Handling
//! - Dictionary or media fetch failures abort the endpoint: later stages
//!   depend on them.
//! - Any other failure is confined to its content type and recorded in the
//!   [`EndpointReport`]; the remaining types still run.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};

use crate::binary::sync_binary;
use crate::config::{Committer, Endpoint};
use crate::contract::{Change, DiffEntry, ProposalReport, SourceClient, TreeService};
use crate::error::SyncError;
use crate::fetch::{fetch_paged, Dictionaries, RetryPolicy};
use crate::file_map::{join_path, relative_path, FileContent, FileMap};
use crate::media::MediaLibrary;
use crate::record::{ContentKind, SourceRecord};

/// Collaborators and settings for one endpoint run.
pub struct Pipeline<'a, S: ?Sized, T: ?Sized> {
    pub endpoint: &'a Endpoint,
    pub source: &'a S,
    pub tree: &'a T,
    pub committer: &'a Committer,
    pub retry: RetryPolicy,
}

/// A content type that could not be synchronised.
#[derive(Debug)]
pub struct StageFailure {
    pub kind: ContentKind,
    pub error: SyncError,
}

/// Outcome of one endpoint run.
#[derive(Debug)]
pub struct EndpointReport {
    pub endpoint: String,
    /// Proposals actually created, in stage order.
    pub proposals: Vec<ProposalReport>,
    pub failures: Vec<StageFailure>,
}

impl EndpointReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run media, posts and pages for one endpoint.
#[instrument(skip_all, fields(endpoint = %pipeline.endpoint.name))]
pub async fn synchronise<S, T>(pipeline: &Pipeline<'_, S, T>) -> Result<EndpointReport, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService + ?Sized,
{
    let endpoint = pipeline.endpoint;
    let api_url = endpoint.api_url();
    info!(api_url = %api_url, "[SYNC] Starting endpoint synchronisation");

    let dictionaries = Dictionaries::fetch(pipeline.source, &api_url, &pipeline.retry).await?;
    let mut report = EndpointReport {
        endpoint: endpoint.name.clone(),
        proposals: Vec::new(),
        failures: Vec::new(),
    };

    let library = if endpoint.target.sync_media {
        let rows = fetch_paged(pipeline.source, &api_url, ContentKind::Media.collection(), &pipeline.retry).await?;
        let records = parse_records(ContentKind::Media, rows);
        let (library, files) = MediaLibrary::build(&records, endpoint, &dictionaries.users);
        let outcome = propose_media(pipeline, &library, &files).await;
        collect(&mut report, ContentKind::Media, outcome);
        Some(library)
    } else {
        None
    };

    for kind in [ContentKind::Post, ContentKind::Page] {
        let outcome = sync_content(pipeline, kind, &api_url, &dictionaries, library.as_ref()).await;
        collect(&mut report, kind, outcome);
    }

    info!(
        proposals = report.proposals.len(),
        failures = report.failures.len(),
        "[SYNC] Endpoint synchronisation finished"
    );
    Ok(report)
}

fn collect(report: &mut EndpointReport, kind: ContentKind, outcome: Result<Option<ProposalReport>, SyncError>) {
    match outcome {
        Ok(Some(proposal)) => {
            info!(%kind, commit = %proposal.commit.sha, files = proposal.files.len(), "[SYNC] Proposal created");
            report.proposals.push(proposal);
        }
        Ok(None) => info!(%kind, "[SYNC] No changes"),
        Err(error) => {
            error!(%kind, error = %error, "[SYNC][ERROR] Content type failed");
            report.failures.push(StageFailure { kind, error });
        }
    }
}

/// Rows that fail to parse are logged and skipped.
pub fn parse_records(kind: ContentKind, rows: Vec<Value>) -> Vec<SourceRecord> {
    rows.into_iter()
        .filter_map(|row| match SourceRecord::from_row(kind, row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

/// Metadata and body files for every post or page.
pub fn build_content_files(
    records: &[SourceRecord],
    endpoint: &Endpoint,
    dictionaries: &Dictionaries,
    media: Option<&MediaLibrary>,
) -> FileMap {
    let mut files = FileMap::new();
    for record in records {
        record
            .to_output_record(endpoint, dictionaries, media)
            .insert_into(endpoint, &mut files);
    }
    files
}

#[instrument(skip_all, fields(kind = %kind))]
async fn sync_content<S, T>(
    pipeline: &Pipeline<'_, S, T>,
    kind: ContentKind,
    api_url: &str,
    dictionaries: &Dictionaries,
    media: Option<&MediaLibrary>,
) -> Result<Option<ProposalReport>, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService + ?Sized,
{
    let endpoint = pipeline.endpoint;
    let prefix = match kind {
        ContentKind::Page => &endpoint.target.page_path,
        _ => &endpoint.target.post_path,
    };

    let rows = fetch_paged(pipeline.source, api_url, kind.collection(), &pipeline.retry).await?;
    let records = parse_records(kind, rows);
    let files = build_content_files(&records, endpoint, dictionaries, media);

    let diff = pipeline.tree.compute_diff(&files, prefix).await?;
    if diff.is_empty() {
        return Ok(None);
    }
    let updates = diff.iter().filter(|e| e.path.ends_with(".html")).count();
    info!(entries = diff.len(), updates, "[SYNC] Diff computed");
    pipeline
        .tree
        .propose_change(&diff, &kind.commit_title(updates), pipeline.committer)
        .await
}

#[instrument(skip_all, fields(kind = "media"))]
async fn propose_media<S, T>(
    pipeline: &Pipeline<'_, S, T>,
    library: &MediaLibrary,
    files: &FileMap,
) -> Result<Option<ProposalReport>, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService + ?Sized,
{
    let prefix = &pipeline.endpoint.target.media_path;
    let diff = pipeline.tree.compute_diff(files, prefix).await?;
    info!(entries = diff.len(), "[SYNC] Media diff computed");

    let entries = resolve_media_diff(pipeline, library, diff).await?;
    if entries.is_empty() {
        return Ok(None);
    }
    pipeline
        .tree
        .propose_change(&entries, &ContentKind::Media.commit_title(entries.len()), pipeline.committer)
        .await
}

/// Replace placeholders belonging to changed media metadata with resolved
/// objects, then drop every placeholder that is left.
pub async fn resolve_media_diff<S, T>(
    pipeline: &Pipeline<'_, S, T>,
    library: &MediaLibrary,
    diff: Vec<DiffEntry>,
) -> Result<Vec<DiffEntry>, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService + ?Sized,
{
    let endpoint = pipeline.endpoint;
    let prefix = &endpoint.target.media_path;

    let changed_media = diff
        .iter()
        .filter(|e| matches!(e.change, Change::Write(FileContent::Json(_))))
        .filter_map(|e| relative_path(prefix, &e.path))
        .filter_map(|path| library.by_metadata_path(path));

    let mut resolved: HashMap<String, DiffEntry> = HashMap::new();
    for media in changed_media {
        for binary in &media.binaries {
            let path = join_path(prefix, &binary.path);
            if resolved.contains_key(&path) || !diff.iter().any(|e| e.path == path && e.is_placeholder()) {
                continue;
            }
            let url = endpoint.absolute_url(&binary.source_url);
            let entry = sync_binary(pipeline.source, pipeline.tree, &pipeline.retry, &url, &path).await?;
            resolved.insert(path, entry);
        }
    }
    info!(binaries = resolved.len(), "[SYNC] Binaries resolved");

    Ok(diff
        .into_iter()
        .map(|entry| resolved.remove(&entry.path).unwrap_or(entry))
        .filter(|entry| !entry.is_placeholder())
        .collect())
}
