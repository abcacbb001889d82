use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

const CONFIG: &str = r#"
error_channel: C-ERRORS
endpoints:
  - name: example
    enabled: false
    enabled_local: false
    wordpress_url: https://example.org
    target:
      owner: org
      repo: site
      branch: main
      media_path: wordpress/media
      post_path: wordpress/posts
      page_path: wordpress/pages
  - name: staging
    enabled: true
    wordpress_url: https://staging.example.org
    target:
      owner: org
      repo: staging-site
      branch: main
      media_path: media
      post_path: posts
      page_path: pages
"#;

fn config_file() -> NamedTempFile {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), CONFIG).expect("Writing temp config failed");
    config
}

#[test]
fn endpoints_lists_configured_endpoints() {
    let config = config_file();
    let mut cmd = Command::cargo_bin("wp-mirror").expect("Binary exists");
    cmd.arg("endpoints").arg("--config").arg(config.path());
    cmd.assert().success().stdout(
        predicate::str::contains("example\tenabled=no\tenabled_local=no")
            .and(predicate::str::contains("staging\tenabled=yes"))
            .and(predicate::str::contains("org/staging-site@main")),
    );
}

#[test]
fn sync_without_selected_endpoints_succeeds_offline() {
    let config = config_file();
    let mut cmd = Command::cargo_bin("wp-mirror").expect("Binary exists");
    cmd.arg("sync")
        .arg("--config")
        .arg(config.path())
        .arg("--endpoint")
        .arg("example")
        .env("GITHUB_TOKEN", "test-token")
        .env("GITHUB_NAME", "bot")
        .env("GITHUB_EMAIL", "bot@example.org")
        .env_remove("SLACKBOT_TOKEN")
        .env_remove("DEBUG");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Synchronise complete: 0 endpoint(s) processed"));
}

#[test]
fn sync_requires_github_token() {
    let config = config_file();
    let mut cmd = Command::cargo_bin("wp-mirror").expect("Binary exists");
    cmd.arg("sync")
        .arg("--config")
        .arg(config.path())
        .env_remove("GITHUB_TOKEN")
        .env("GITHUB_NAME", "bot")
        .env("GITHUB_EMAIL", "bot@example.org");
    cmd.assert().failure().stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn missing_config_file_fails() {
    let mut cmd = Command::cargo_bin("wp-mirror").expect("Binary exists");
    cmd.arg("endpoints").arg("--config").arg("does-not-exist.yaml");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

/// Collects the debug rendering of every emitted event.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector { events: events.clone() };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use wp_mirror::cli::{run, Cli, Commands};

    let cli = Cli {
        command: Commands::Endpoints {
            config: std::path::PathBuf::from("dummy.yaml"),
        },
    };
    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
