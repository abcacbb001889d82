//! Run trigger: pick the endpoints to process, synchronise them one after the
//! other, and announce what changed.

use tracing::{error, info, instrument};

use crate::config::{Committer, Endpoint};
use crate::contract::{Message, Notifier, SourceClient, TreeService};
use crate::error::SyncError;
use crate::fetch::RetryPolicy;
use crate::report::{reply_message, summary_message};
use crate::synchronise::{synchronise, EndpointReport, Pipeline};

/// `Live` reports failures to the error channel and keeps going; `Debug`
/// stops at the first failure and hands it back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    Debug,
}

impl RunMode {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            RunMode::Debug
        } else {
            RunMode::Live
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    pub committer: Committer,
    pub retry: RetryPolicy,
    /// Channel receiving failure reports in live mode.
    pub error_channel: Option<String>,
}

/// Endpoints named in `names` (all of them when empty) that are switched on
/// for `mode`, in configuration order.
pub fn select_endpoints<'a>(endpoints: &'a [Endpoint], names: &[String], mode: RunMode) -> Vec<&'a Endpoint> {
    endpoints
        .iter()
        .filter(|e| names.is_empty() || names.contains(&e.name))
        .filter(|e| match mode {
            RunMode::Debug => e.enabled_local,
            RunMode::Live => e.enabled,
        })
        .collect()
}

/// Synchronise `endpoints` sequentially. `make_tree` builds the destination
/// client for each endpoint's repository target.
#[instrument(skip_all, fields(mode = ?settings.mode, endpoints = endpoints.len()))]
pub async fn run_endpoints<S, T, N, F>(
    endpoints: &[&Endpoint],
    source: &S,
    make_tree: F,
    notifier: Option<&N>,
    settings: &RunSettings,
) -> Result<Vec<EndpointReport>, SyncError>
where
    S: SourceClient + ?Sized,
    T: TreeService,
    N: Notifier + ?Sized,
    F: Fn(&Endpoint) -> Result<T, SyncError>,
{
    if endpoints.is_empty() {
        error!("No endpoints selected. In debug mode at least one endpoint needs enabled_local set.");
    } else {
        info!("Using {} endpoint(s)", endpoints.len());
    }

    let mut reports = Vec::new();
    for &endpoint in endpoints {
        info!(endpoint = %endpoint.name, "*** Checking endpoint ***");
        let outcome = match make_tree(endpoint) {
            Ok(tree) => {
                let pipeline = Pipeline {
                    endpoint,
                    source,
                    tree: &tree,
                    committer: &settings.committer,
                    retry: settings.retry,
                };
                synchronise(&pipeline).await
            }
            Err(e) => Err(e),
        };

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                handle_failure(endpoint, e, notifier, settings).await?;
                continue;
            }
        };

        if let Err(e) = announce(endpoint, &report, notifier).await {
            handle_failure(endpoint, e, notifier, settings).await?;
        }
        if !report.failures.is_empty() {
            if settings.mode == RunMode::Debug {
                if let Some(failure) = report.failures.into_iter().next() {
                    return Err(SyncError::Stage {
                        kind: failure.kind,
                        source: Box::new(failure.error),
                    });
                }
                continue;
            }
            for failure in &report.failures {
                let text = format!("{} synchronisation failed: {}", failure.kind, error_chain(&failure.error));
                report_failure(endpoint, text, notifier, settings).await;
            }
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Post the summary and one threaded reply per proposal to the endpoint's
/// reporting channel.
async fn announce<N>(endpoint: &Endpoint, report: &EndpointReport, notifier: Option<&N>) -> Result<(), SyncError>
where
    N: Notifier + ?Sized,
{
    let (Some(notifier), Some(channel)) = (notifier, endpoint.reporting_channel.as_ref()) else {
        return Ok(());
    };
    if report.proposals.is_empty() {
        return Ok(());
    }

    let thread = notifier
        .post(Message {
            channel: channel.clone(),
            text: summary_message(&report.proposals),
            username: Some(endpoint.name.clone()),
            thread: None,
        })
        .await?;
    for proposal in &report.proposals {
        notifier
            .post(Message {
                channel: channel.clone(),
                text: reply_message(proposal),
                username: Some(endpoint.name.clone()),
                thread: Some(thread.clone()),
            })
            .await?;
    }
    Ok(())
}

/// Debug mode hands `error` back; live mode reports it and carries on.
async fn handle_failure<N>(
    endpoint: &Endpoint,
    error: SyncError,
    notifier: Option<&N>,
    settings: &RunSettings,
) -> Result<(), SyncError>
where
    N: Notifier + ?Sized,
{
    if settings.mode == RunMode::Debug {
        error!(endpoint = %endpoint.name, error = %error, "Endpoint failed");
        return Err(error);
    }
    report_failure(endpoint, error_chain(&error), notifier, settings).await;
    Ok(())
}

async fn report_failure<N>(endpoint: &Endpoint, text: String, notifier: Option<&N>, settings: &RunSettings)
where
    N: Notifier + ?Sized,
{
    error!(endpoint = %endpoint.name, error = %text, "Endpoint failed");
    let (Some(notifier), Some(channel)) = (notifier, settings.error_channel.as_ref()) else {
        return;
    };
    let message = Message {
        channel: channel.clone(),
        text: format!("wp-mirror failed for endpoint `{}`: {}", endpoint.name, text),
        username: None,
        thread: None,
    };
    if let Err(e) = notifier.post(message).await {
        error!(error = %e, "Could not report failure to the error channel");
    }
}

fn error_chain(error: &SyncError) -> String {
    let mut text = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        text.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    text
}
