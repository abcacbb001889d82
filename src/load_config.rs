//! Loads the static YAML endpoint list and the secrets injected through the
//! environment.
//!
//! The YAML file never holds credentials. It lists the endpoints to mirror and
//! the channel that receives failure reports:
//!
//! ```yaml
//! error_channel: C0123456
//! endpoints:
//!   - name: example
//!     enabled: true
//!     wordpress_url: https://example.org
//!     target:
//!       owner: example
//!       repo: site
//!       branch: main
//!       sync_media: true
//!       media_path: wordpress/media
//!       post_path: wordpress/posts
//!       page_path: wordpress/pages
//! ```
//!
//! All errors use `anyhow::Error` and surface at the CLI boundary.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

use wp_mirror_core::config::{Committer, Endpoint};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub error_channel: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// Credentials and switches read from the environment.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub github_token: String,
    pub committer: Committer,
    /// Notifications are disabled without it.
    pub slack_token: Option<String>,
    pub debug: bool,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let config: CliConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;

    validate(&config)?;
    for endpoint in &config.endpoints {
        endpoint.trace_loaded();
    }
    info!(endpoints = config.endpoints.len(), "Config loaded successfully");
    Ok(config)
}

pub fn validate(config: &CliConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        let name = endpoint.name.trim();
        if name.is_empty() {
            bail!("Endpoint names must not be empty");
        }
        if !seen.insert(name) {
            bail!("Duplicate endpoint name: {name}");
        }
        if endpoint.wordpress_url.trim().is_empty() {
            bail!("Endpoint {name}: wordpress_url must not be empty");
        }
        let target = &endpoint.target;
        for (field, value) in [("owner", &target.owner), ("repo", &target.repo), ("branch", &target.branch)] {
            if value.trim().is_empty() {
                bail!("Endpoint {name}: target.{field} must not be empty");
            }
        }
    }
    Ok(())
}

fn required(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => {
            error!(key, "Environment variable is empty");
            bail!("{key} environment variable is empty")
        }
        Err(e) => {
            error!(error = ?e, key, "Environment variable not set");
            Err(e).with_context(|| format!("{key} environment variable not set"))
        }
    }
}

impl Secrets {
    pub fn from_env() -> Result<Self> {
        let github_token = required("GITHUB_TOKEN")?;
        let committer = Committer {
            name: required("GITHUB_NAME")?,
            email: required("GITHUB_EMAIL")?,
        };
        let slack_token = env::var("SLACKBOT_TOKEN").ok().filter(|t| !t.trim().is_empty());
        if slack_token.is_none() {
            warn!("SLACKBOT_TOKEN not set; notifications are disabled");
        }
        let debug_flag = env::var("DEBUG").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
        info!(
            committer = %committer.name,
            notifications = slack_token.is_some(),
            debug_mode = debug_flag,
            "Secrets loaded from environment"
        );
        Ok(Self {
            github_token,
            committer,
            slack_token,
            debug: debug_flag,
        })
    }
}
