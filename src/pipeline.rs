//! Ingestion pipeline: handles in, one stored [`Snapshot`] out.
//!
//! 1. Classify every configured handle; page handles are expanded into
//!    their feed's posts (the raw feed is stored as `feed`).
//! 2. Adapt up to `concurrency` posts at a time and assemble each comment
//!    forest.
//! 3. Restore input order, record per-post failures and store `snapshot`.
//!
//! Transport failures, unexpected markup and unresolved parents cost only
//! the post they happened on, unless the run is strict. Protocol
//! violations, unsupported handles and missing settings stop the run.

use crate::config::Config;
use crate::error::{IngestError, RunError};
use crate::fetch::PagedFetcher;
use crate::models::{Failure, Post, Snapshot};
use crate::outputs::store::{self, SnapshotStore};
use crate::scrapers::graph::{self, GraphPost};
use crate::scrapers::{AdapterContext, Source, Target, classify};
use crate::tree::build_forest;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

pub struct IngestionPipeline<'a> {
    config: &'a Config,
    fetcher: PagedFetcher,
    store: SnapshotStore,
    strict: bool,
}

fn failure(handle: &str, err: &IngestError) -> Failure {
    Failure {
        resource: err.resource().unwrap_or(handle).to_string(),
        kind: err.kind().to_string(),
        cause: err.to_string(),
    }
}

/// Adapt one source and assemble its comment forest.
async fn ingest_one(ctx: AdapterContext<'_>, source: &Source) -> Result<Post, IngestError> {
    let adapted = source.adapt(&ctx).await?;
    let mut post = adapted.post;
    if !post.has_displayable_identity() {
        return Err(IngestError::structure(source.handle(), "post has neither author id nor author name"));
    }
    post.comments = build_forest(post.identity(), adapted.comments)?;
    Ok(post)
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(config: &'a Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            config,
            fetcher: PagedFetcher::new(config.request_timeout())?,
            store: SnapshotStore::new(&config.download_location),
            strict: config.abort_on_error,
        })
    }

    /// Stop at the first failed post.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = self.strict || strict;
        self
    }

    fn context(&self) -> AdapterContext<'_> {
        AdapterContext {
            config: self.config,
            fetcher: &self.fetcher,
        }
    }

    /// Record a per-post failure, or decide it ends the run.
    fn absorb(&self, handle: &str, err: IngestError, failures: &mut Vec<Failure>) -> Result<(), RunError> {
        if self.strict || err.is_run_fatal() {
            error!(%handle, kind = err.kind(), error = %err, "Aborting run");
            return Err(err.into());
        }
        warn!(%handle, kind = err.kind(), status = ?err.status(), error = %err, "Skipping failed post");
        failures.push(failure(handle, &err));
        Ok(())
    }

    /// Turn the configured handles into the ordered list of items to ingest.
    async fn expand(
        &self,
        handles: &[String],
        feed: &mut Vec<Value>,
        failures: &mut Vec<Failure>,
    ) -> Result<Vec<Source>, RunError> {
        let ctx = self.context();
        let mut sources = Vec::new();
        for handle in handles {
            match classify(handle)? {
                Target::Item(source) => sources.push(source),
                Target::Page(page) => {
                    let entries = match graph::enumerate_feed(&ctx, &page).await {
                        Ok(entries) => entries,
                        Err(e) => {
                            self.absorb(&page, e, failures)?;
                            continue;
                        }
                    };
                    let ids = match graph::feed_post_ids(&page, &entries) {
                        Ok(ids) => ids,
                        Err(e) => {
                            self.absorb(&page, e, failures)?;
                            continue;
                        }
                    };
                    sources.extend(ids.into_iter().map(|id| Source::Graph(GraphPost { id, url: None })));
                    feed.extend(entries);
                }
            }
        }
        Ok(sources)
    }

    /// Run the pipeline under `run_key` and store the resulting snapshot.
    #[instrument(level = "info", skip(self, handles), fields(handles = handles.len(), strict = self.strict))]
    pub async fn run(&self, run_key: &str, handles: &[String]) -> Result<Snapshot, RunError> {
        let start = Instant::now();
        let mut failures = Vec::new();
        let mut feed = Vec::new();

        let sources = self.expand(handles, &mut feed, &mut failures).await?;
        if !feed.is_empty() {
            self.store.put(run_key, store::FEED, &feed).await?;
        }
        info!(posts = sources.len(), concurrency = self.config.concurrency, "Ingesting posts");

        let ctx = self.context();
        let mut results = stream::iter(sources.into_iter().enumerate())
            .map(|(index, source)| async move {
                let outcome = ingest_one(ctx, &source).await;
                (index, source, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut posts: Vec<(usize, Post)> = Vec::new();
        let mut failed: Vec<(usize, Failure)> = Vec::new();
        while let Some((index, source, outcome)) = results.next().await {
            match outcome {
                Ok(post) => {
                    debug!(handle = source.handle(), source = source.kind(), comments = post.comments.len(), "Ingested post");
                    posts.push((index, post));
                }
                Err(e) => {
                    let mut recorded = Vec::new();
                    self.absorb(source.handle(), e, &mut recorded)?;
                    failed.extend(recorded.into_iter().map(|f| (index, f)));
                }
            }
        }

        posts.sort_by_key(|(index, _)| *index);
        failed.sort_by_key(|(index, _)| *index);
        failures.extend(failed.into_iter().map(|(_, f)| f));

        let snapshot = Snapshot {
            run_key: run_key.to_string(),
            posts: posts.into_iter().map(|(_, post)| post).collect(),
            failures,
        };
        self.store.put(run_key, store::SNAPSHOT, &snapshot).await?;

        info!(
            posts = snapshot.posts.len(),
            failures = snapshot.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run finished"
        );
        Ok(snapshot)
    }
}
