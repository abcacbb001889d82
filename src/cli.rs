//! CLI glue: argument parsing, client construction and the run entrypoint.
//!
//! All pipeline logic lives in `wp-mirror-core`; this module only wires the
//! concrete HTTP clients into it.
//!
//! - [`Cli`] defines the user-facing subcommands.
//! - [`run`] is the async entrypoint shared by `main` and the integration tests.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use wp_mirror_core::config::Endpoint;
use wp_mirror_core::fetch::RetryPolicy;
use wp_mirror_core::run::{run_endpoints, select_endpoints, RunMode, RunSettings};

use crate::github::GithubTree;
use crate::load_config::{load_config, Secrets};
use crate::slack::SlackNotifier;
use crate::wordpress::WordpressClient;

/// CLI for wp-mirror: mirror WordPress content into git repositories.
#[derive(Parser)]
#[clap(
    name = "wp-mirror",
    version,
    about = "Mirror WordPress posts, pages and media into GitHub repositories"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise the selected endpoints of the given config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only run these endpoints (repeatable)
        #[clap(long = "endpoint")]
        endpoints: Vec<String>,
        /// Debug mode: use `enabled_local` and stop at the first failure
        #[clap(long)]
        debug: bool,
    },
    /// List configured endpoints and their enablement
    Endpoints {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            endpoints,
            debug,
        } => sync(config, endpoints, debug).await,
        Commands::Endpoints { config } => {
            let config = load_config(config)?;
            for endpoint in &config.endpoints {
                println!("{}", describe(endpoint));
            }
            Ok(())
        }
    }
}

fn describe(endpoint: &Endpoint) -> String {
    let flag = |on: bool| if on { "yes" } else { "no" };
    format!(
        "{}\tenabled={}\tenabled_local={}\t{} -> {}/{}@{}",
        endpoint.name,
        flag(endpoint.enabled),
        flag(endpoint.enabled_local),
        endpoint.wordpress_url,
        endpoint.target.owner,
        endpoint.target.repo,
        endpoint.target.branch,
    )
}

async fn sync(config: PathBuf, names: Vec<String>, debug: bool) -> Result<()> {
    let config = load_config(config)?;
    let secrets = Secrets::from_env()?;
    let mode = RunMode::from_debug_flag(debug || secrets.debug);

    let selected = select_endpoints(&config.endpoints, &names, mode);
    info!(command = "sync", ?mode, selected = selected.len(), "Starting synchronisation");

    let source = WordpressClient::new()?;
    let notifier = match secrets.slack_token.clone() {
        Some(token) => Some(SlackNotifier::new(token)?),
        None => None,
    };
    if notifier.is_none() && config.endpoints.iter().any(|e| e.reporting_channel.is_some()) {
        warn!("Reporting channels configured but notifications are disabled");
    }

    let http = GithubTree::http_client()?;
    let token = secrets.github_token.clone();
    let settings = RunSettings {
        mode,
        committer: secrets.committer.clone(),
        retry: RetryPolicy::default(),
        error_channel: config.error_channel.clone(),
    };

    let reports = run_endpoints(
        &selected,
        &source,
        |endpoint: &Endpoint| Ok(GithubTree::new(http.clone(), token.clone(), &endpoint.target)),
        notifier.as_ref(),
        &settings,
    )
    .await
    .map_err(|e| {
        tracing::error!(command = "sync", error = %e, "Synchronisation failed");
        anyhow::Error::new(e)
    })?;

    for report in &reports {
        info!(
            endpoint = %report.endpoint,
            proposals = report.proposals.len(),
            failures = report.failures.len(),
            "Endpoint done"
        );
        for proposal in &report.proposals {
            println!("{}: {} {}", report.endpoint, proposal.commit.message, proposal.commit.html_url);
        }
    }
    println!("Synchronise complete: {} endpoint(s) processed", reports.len());
    Ok(())
}
