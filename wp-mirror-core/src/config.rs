//! Endpoint configuration: which site is mirrored into which repository and
//! where each content type lands.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// REST API root below an endpoint's base URL.
pub const API_PATH: &str = "/wp-json/wp/v2/";

/// One configured source -> destination pairing. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub enabled_local: bool,
    /// Chat channel receiving change summaries for this endpoint.
    #[serde(default)]
    pub reporting_channel: Option<String>,
    pub wordpress_url: String,
    /// Field names removed from every output record.
    #[serde(default)]
    pub exclude_properties: Vec<String>,
    pub target: RepositoryTarget,
}

/// Where and how the mirrored files land in the destination repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(default)]
    pub sync_media: bool,
    pub media_path: String,
    pub post_path: String,
    pub page_path: String,
}

impl Endpoint {
    /// `<base>/wp-json/wp/v2/`, tolerating a trailing slash on the base.
    pub fn api_url(&self) -> String {
        format!("{}{}", self.wordpress_url.trim_end_matches('/'), API_PATH)
    }

    /// Resolves a possibly relative asset URL against the base URL.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.wordpress_url.trim_end_matches('/'), url)
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.name,
            wordpress_url = %self.wordpress_url,
            enabled = self.enabled,
            enabled_local = self.enabled_local,
            "Loaded endpoint"
        );
        self.target.trace_loaded();
    }
}

impl RepositoryTarget {
    pub fn deployment_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/tree/{}",
            self.owner, self.repo, self.branch
        )
    }

    pub fn trace_loaded(&self) {
        debug!(
            owner = %self.owner,
            repo = %self.repo,
            branch = %self.branch,
            sync_media = self.sync_media,
            "Loaded repository target"
        );
    }
}

/// Identity recorded on every commit the pipeline creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> Endpoint {
        Endpoint {
            name: "test".into(),
            enabled: true,
            enabled_local: false,
            reporting_channel: None,
            wordpress_url: base.into(),
            exclude_properties: vec![],
            target: RepositoryTarget {
                owner: "org".into(),
                repo: "site".into(),
                branch: "main".into(),
                sync_media: true,
                media_path: "wordpress/media".into(),
                post_path: "wordpress/posts".into(),
                page_path: "wordpress/pages".into(),
            },
        }
    }

    #[test]
    fn api_url_ignores_trailing_slash() {
        assert_eq!(
            endpoint("https://example.org/").api_url(),
            "https://example.org/wp-json/wp/v2/"
        );
        assert_eq!(
            endpoint("https://example.org").api_url(),
            "https://example.org/wp-json/wp/v2/"
        );
    }

    #[test]
    fn absolute_url_prefixes_relative_paths_only() {
        let ep = endpoint("https://example.org");
        assert_eq!(
            ep.absolute_url("/wp-content/uploads/a.jpg"),
            "https://example.org/wp-content/uploads/a.jpg"
        );
        assert_eq!(
            ep.absolute_url("https://cdn.example.org/a.jpg"),
            "https://cdn.example.org/a.jpg"
        );
    }

    #[test]
    fn deployment_url_points_at_branch_tree() {
        assert_eq!(
            endpoint("https://example.org").target.deployment_url(),
            "https://github.com/org/site/tree/main"
        );
    }
}
