//! # discussion_ingest
//!
//! Collects public discussions (posts, comments, reactions) from a social
//! network's REST API, the Disqus comment widget and the comment sections of
//! several German news sites, normalizes them into one canonical model and
//! stores every run as a timestamped snapshot for later analysis.
//!
//! ## Usage
//!
//! ```sh
//! discussion_ingest -c config.yaml download
//! discussion_ingest user-stats --top 30 --rank comment
//! ```
//!
//! ## Architecture
//!
//! The `download` action runs a pipeline:
//! 1. **Classification**: Map every configured handle to a source adapter
//! 2. **Enumeration**: Expand page handles into their feed's posts
//! 3. **Adaptation**: Fetch each post and its comments (parallel, `concurrency` at a time)
//! 4. **Assembly**: Rebuild each comment forest from parent references
//! 5. **Output**: Store the ordered snapshot plus any recorded failures
//!
//! All other actions read the latest stored snapshot.

use clap::Parser;
use itertools::Itertools;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod aggregate;
mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod tree;
mod utils;

use cli::{Action, Cli};
use config::Config;
use models::Snapshot;
use outputs::markdown::Outline;
use outputs::store::{self, SnapshotStore};
use pipeline::IngestionPipeline;
use utils::ensure_writable_dir;

const VERBOSE_FILTER: &str = concat!("info,", env!("CARGO_CRATE_NAME"), "=debug");

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let env_filter = EnvFilter::try_from_default_env().ok();
    let filter_from_env = env_filter.is_some();
    let filter = env_filter.unwrap_or_else(|| EnvFilter::new(if args.verbose { VERBOSE_FILTER } else { "info" }));
    let builder = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_filter_reloading();
    let filter_handle = builder.reload_handle();
    builder.init();

    let config = Config::load(&args.config)?;
    if config.verbose && !args.verbose && !filter_from_env {
        filter_handle.reload(EnvFilter::new(VERBOSE_FILTER))?;
        debug!("Verbose logging enabled by configuration");
    }

    let start_time = std::time::Instant::now();
    info!(action = ?args.action, config = %args.config.display(), "discussion_ingest starting up");

    let code = match &args.action {
        Action::Download => download(&args, &config).await?,
        action => {
            let snapshot = latest_snapshot(&config).await?;
            report(action, &snapshot);
            ExitCode::SUCCESS
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(code)
}

#[instrument(level = "info", skip_all)]
async fn download(args: &Cli, config: &Config) -> Result<ExitCode, Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(&config.download_location).await {
        error!(
            path = %config.download_location.display(),
            error = %e,
            "Download location is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let base_dir = args.config.parent().unwrap_or(Path::new("."));
    let handles: Vec<String> = config
        .page
        .iter()
        .cloned()
        .chain(config.url_groups(base_dir)?.into_iter().flatten())
        .collect();
    if handles.is_empty() {
        error!("Nothing to ingest: set `page`, `urls` or `urls_file`");
        return Ok(ExitCode::FAILURE);
    }
    debug!(?handles, "Collected handles");

    let run_key = store::new_run_key();
    let pipeline = IngestionPipeline::new(config)?.strict(args.strict);
    let snapshot = pipeline.run(&run_key, &handles).await?;

    if snapshot.is_complete() {
        info!(%run_key, posts = snapshot.posts.len(), "Snapshot complete");
        return Ok(ExitCode::SUCCESS);
    }
    warn!(%run_key, failures = snapshot.failures.len(), "Snapshot is partial");
    eprintln!("{} resource(s) could not be ingested:", snapshot.failures.len());
    for failure in &snapshot.failures {
        eprintln!("  {} [{}]: {}", failure.resource, failure.kind, failure.cause);
    }
    Ok(ExitCode::FAILURE)
}

async fn latest_snapshot(config: &Config) -> Result<Snapshot, Box<dyn Error>> {
    let store = SnapshotStore::new(&config.download_location);
    let run_key = store.latest_run_key().await?;
    let snapshot: Snapshot = store.get(&run_key, store::SNAPSHOT).await?;
    info!(%run_key, posts = snapshot.posts.len(), "Loaded latest snapshot");
    if !snapshot.is_complete() {
        warn!(%run_key, failures = snapshot.failures.len(), "Latest snapshot is partial");
    }
    Ok(snapshot)
}

fn report(action: &Action, snapshot: &Snapshot) {
    match action {
        Action::Download => {}
        Action::CommentStats => {
            println!("{} comments", aggregate::comment_count(snapshot));
        }
        Action::CountUsers => {
            let totals = aggregate::action_totals(snapshot);
            println!("{} unique users", totals.users);
            let by_action = totals
                .by_action
                .iter()
                .map(|t| format!("{}: {} entries, {} users", t.action.label(), t.entries, t.users))
                .join(",  ");
            println!("By action: {by_action}");
        }
        Action::DuplicateNames => {
            for (name, ids) in aggregate::duplicate_names(snapshot) {
                println!("{name}: {}", ids.iter().join(", "));
            }
        }
        Action::UserStats { top, rank } => {
            let stats = aggregate::user_stats(snapshot);
            for (place, user) in aggregate::top_users(&stats, *rank, *top).iter().enumerate() {
                println!(
                    "{:>4}. {} ({}): {} comments, {} likes, {} posts, {} total",
                    place + 1,
                    user.name,
                    user.id,
                    user.actions.comment,
                    user.actions.like_post,
                    user.actions.post,
                    user.actions.total()
                );
            }
        }
        Action::Show => print!("{}", Outline(snapshot)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_posts(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/42"))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/43"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "43", "message": "m", "from": {"id": "A", "name": "Anna"}
            })))
            .mount(server)
            .await;
        for tail in ["comments", "likes"] {
            Mock::given(method("GET"))
                .and(path(format!("/43/{tail}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
                .mount(server)
                .await;
        }
    }

    async fn download_posts(ids: &[&str]) -> ExitCode {
        let server = MockServer::start().await;
        mount_posts(&server).await;
        let root = TempDir::new().unwrap();
        let mut config = Config::for_testing(root.path());
        config.endpoints.graph_api = server.uri();
        config.urls = vec![
            ids.iter()
                .map(|id| format!("https://www.facebook.com/p/posts/{id}"))
                .collect(),
        ];
        let config_path = root.path().join("config.yaml");
        let args = Cli::parse_from(["discussion_ingest", "-c", config_path.to_str().unwrap(), "download"]);

        download(&args, &config).await.unwrap()
    }

    #[tokio::test]
    async fn test_partial_download_exits_with_failure() {
        assert_eq!(download_posts(&["42", "43"]).await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn test_complete_download_exits_successfully() {
        assert_eq!(download_posts(&["43"]).await, ExitCode::SUCCESS);
    }
}
