//! Disqus comment-widget adapter.
//!
//! News sites embed the widget with a forum short name and an article
//! identifier. The numeric thread id is read from the widget's embed page,
//! then the thread is listed through the public API with its own cursor
//! triplet (`"0:0:0"` first), oldest first. Replies carry their parent's id.

use super::AdapterContext;
use super::graph::json_id;
use crate::error::IngestError;
use crate::models::RawComment;
use crate::utils::redact_url;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

const FIRST_CURSOR: &str = "0:0:0";
const LISTING_LIMIT: &str = "100";

static THREAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""thread":"([0-9]+)""#).expect("valid regex"));

/// A widget thread as referenced from an article page.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetThread {
    pub forum: String,
    pub identifier: String,
}

fn build_url(
    resource: &str,
    base: &str,
    path: &str,
    params: &[(&str, &str)],
) -> Result<String, IngestError> {
    let mut url = Url::parse(&format!("{}{path}", base.trim_end_matches('/')))
        .map_err(|e| IngestError::structure(resource, format!("bad widget endpoint: {e}")))?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(url.to_string())
}

/// Resolve the numeric thread id from the widget's embed page.
#[instrument(level = "debug", skip(ctx))]
async fn resolve_thread_id(
    ctx: &AdapterContext<'_>,
    resource: &str,
    thread: &WidgetThread,
) -> Result<String, IngestError> {
    let embed_url = build_url(
        resource,
        &ctx.config.endpoints.disqus,
        "/embed/comments/",
        &[
            ("base", "default"),
            ("version", ctx.config.disqus_version()?),
            ("f", thread.forum.as_str()),
            ("t_i", thread.identifier.as_str()),
            ("t_t", "volk"),
        ],
    )?;
    let embed = ctx.fetcher.get_text(resource, &embed_url).await?;
    THREAD_RE
        .captures(&embed)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| IngestError::structure(resource, "widget embed page names no thread"))
}

/// Fetch every comment of a widget thread, in ascending order.
#[instrument(level = "info", skip(ctx), fields(forum = %thread.forum, identifier = %thread.identifier))]
pub async fn fetch_thread(
    ctx: &AdapterContext<'_>,
    resource: &str,
    thread: &WidgetThread,
) -> Result<Vec<RawComment>, IngestError> {
    let api_key = ctx.config.disqus_api_key()?;
    let thread_id = resolve_thread_id(ctx, resource, thread).await?;

    let mut comments = Vec::new();
    let mut cursor = FIRST_CURSOR.to_string();
    for page in 1.. {
        let page_url = build_url(
            resource,
            &ctx.config.endpoints.disqus,
            "/api/3.0/threads/listPostsThreaded",
            &[
                ("limit", LISTING_LIMIT),
                ("thread", thread_id.as_str()),
                ("forum", thread.forum.as_str()),
                ("cursor", cursor.as_str()),
                ("api_key", api_key),
                ("order", "asc"),
            ],
        )?;
        debug!(page, url = %redact_url(&page_url), "Fetching widget page");
        let body = ctx.fetcher.get_json(resource, &page_url).await?;

        let entries = body
            .get("response")
            .and_then(Value::as_array)
            .ok_or_else(|| IngestError::protocol(resource, "widget listing without response list"))?;
        for entry in entries {
            comments.push(comment_from_json(resource, entry)?);
        }

        let has_next = body
            .pointer("/cursor/hasNext")
            .and_then(Value::as_bool)
            .ok_or_else(|| IngestError::protocol(resource, "widget listing without cursor.hasNext"))?;
        if !has_next {
            break;
        }
        let next = body
            .pointer("/cursor/next")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestError::protocol(resource, "widget announced a next page without cursor"))?;
        if next == cursor {
            return Err(IngestError::protocol(resource, format!("widget cursor {next} does not advance")));
        }
        cursor = next.to_string();
    }

    info!(thread = %thread_id, comments = comments.len(), "Fetched widget thread");
    Ok(comments)
}

fn comment_from_json(resource: &str, entry: &Value) -> Result<RawComment, IngestError> {
    let id = json_id(entry.get("id"))
        .ok_or_else(|| IngestError::structure(resource, "widget comment without id"))?;
    let author = entry.get("author");
    let author_name = author
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::structure(resource, format!("widget comment {id} without author name")))?
        .to_string();
    Ok(RawComment {
        text: entry
            .get("raw_message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        author_name,
        author_id: author.and_then(|a| json_id(a.get("username"))),
        created_time: entry.get("createdAt").and_then(Value::as_str).map(str::to_string),
        like_count: entry.get("likes").and_then(Value::as_u64),
        parent_id: json_id(entry.get("parent")),
        id,
    })
}
