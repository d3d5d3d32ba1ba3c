//! Graph REST API adapter.
//!
//! A page's feed is enumerated through `<page>/feed`; each post is then read
//! as three resources: the post object, its comment stream
//! (`<id>/comments?filter=stream`, which lists replies flat with a `parent`
//! reference) and its reaction list (`<id>/likes`).

use super::{Adapted, AdapterContext, SourceAdapter};
use crate::error::IngestError;
use crate::fetch::PageQuery;
use crate::models::{Post, RawComment, UserRef};
use serde_json::Value;
use tracing::{info, instrument};

const FEED_FIELDS: &str = "id,message";
const COMMENT_FIELDS: &str = "parent,id,message,created_time,from,like_count";

/// One post of the REST source, optionally reached through its public URL.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPost {
    pub id: String,
    pub url: Option<String>,
}

fn endpoint(ctx: &AdapterContext<'_>, path: &[&str]) -> String {
    let mut url = ctx.config.endpoints.graph_api.trim_end_matches('/').to_string();
    for segment in path {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }
    url
}

/// List the posts of a page in feed order.
///
/// With `feedmessage_grep` set, only entries whose message contains it are
/// kept; entries without a message never match.
#[instrument(level = "info", skip(ctx))]
pub async fn enumerate_feed(ctx: &AdapterContext<'_>, page: &str) -> Result<Vec<Value>, IngestError> {
    let credential = ctx.config.access_token()?;
    let base_url = endpoint(ctx, &[page, "feed"]);
    let grep = ctx.config.feedmessage_grep.as_deref();
    let matches_grep = |entry: &Value| match grep {
        Some(needle) => entry
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains(needle)),
        None => true,
    };

    let query = PageQuery {
        resource: page,
        base_url: &base_url,
        params: &[("fields", FEED_FIELDS)],
        credential,
        page_size: ctx.config.page_size,
    };
    let feed = ctx
        .fetcher
        .fetch(query, Some(&matches_grep))
        .await?
        .into_items(page)?;
    info!(page, posts = feed.len(), "Enumerated page feed");
    Ok(feed)
}

/// Post ids of an enumerated feed, in feed order.
pub fn feed_post_ids(page: &str, feed: &[Value]) -> Result<Vec<String>, IngestError> {
    feed.iter()
        .map(|entry| {
            json_id(entry.get("id"))
                .ok_or_else(|| IngestError::structure(page, "feed entry without id"))
        })
        .collect()
}

impl SourceAdapter for GraphPost {
    fn handle(&self) -> &str {
        &self.id
    }

    #[instrument(level = "info", skip_all, fields(post = %self.id))]
    async fn adapt(&self, ctx: &AdapterContext<'_>) -> Result<Adapted, IngestError> {
        let id = self.id.as_str();
        let credential = ctx.config.access_token()?;
        let page_size = ctx.config.page_size;

        let post_url = endpoint(ctx, &[id]);
        let raw_post = ctx
            .fetcher
            .fetch(
                PageQuery {
                    resource: id,
                    base_url: &post_url,
                    params: &[],
                    credential,
                    page_size,
                },
                None,
            )
            .await?
            .into_object(id)?;

        let comments_url = endpoint(ctx, &[id, "comments"]);
        let raw_comments = ctx
            .fetcher
            .fetch(
                PageQuery {
                    resource: id,
                    base_url: &comments_url,
                    params: &[("filter", "stream"), ("fields", COMMENT_FIELDS)],
                    credential,
                    page_size,
                },
                None,
            )
            .await?
            .into_items(id)?;

        let likes_url = endpoint(ctx, &[id, "likes"]);
        let raw_likes = ctx
            .fetcher
            .fetch(
                PageQuery {
                    resource: id,
                    base_url: &likes_url,
                    params: &[],
                    credential,
                    page_size,
                },
                None,
            )
            .await?
            .into_items(id)?;

        let reactions = raw_likes
            .iter()
            .map(|v| user_from_json(v).ok_or_else(|| IngestError::structure(id, "reaction without id/name")))
            .collect::<Result<Vec<_>, _>>()?;
        let comments = raw_comments
            .iter()
            .map(|v| comment_from_json(id, v))
            .collect::<Result<Vec<_>, _>>()?;
        let post = post_from_json(id, self.url.as_deref(), &raw_post, reactions)?;

        info!(
            comments = comments.len(),
            reactions = post.reactions.len(),
            "Fetched post"
        );
        Ok(Adapted { post, comments })
    }
}

/// Ids come as strings from the REST API, as numbers from some widgets.
pub(crate) fn json_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn user_from_json(value: &Value) -> Option<UserRef> {
    Some(UserRef {
        id: json_id(value.get("id"))?,
        name: value.get("name")?.as_str()?.to_string(),
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn comment_from_json(post_id: &str, value: &Value) -> Result<RawComment, IngestError> {
    let id = json_id(value.get("id"))
        .ok_or_else(|| IngestError::structure(post_id, "comment without id"))?;
    let author = value
        .get("from")
        .and_then(user_from_json)
        .ok_or_else(|| IngestError::structure(post_id, format!("comment {id} without author")))?;
    Ok(RawComment {
        text: str_field(value, "message").unwrap_or_default(),
        author_name: author.name,
        author_id: Some(author.id),
        created_time: str_field(value, "created_time"),
        like_count: value.get("like_count").and_then(Value::as_u64),
        parent_id: value.get("parent").and_then(|p| json_id(p.get("id"))),
        id,
    })
}

/// The source's own like count, if the post object carries one.
fn reported_like_count(raw_post: &Value) -> Option<u64> {
    raw_post
        .pointer("/likes/summary/total_count")
        .or_else(|| raw_post.get("like_count"))
        .and_then(Value::as_u64)
}

fn post_from_json(
    id: &str,
    url: Option<&str>,
    raw_post: &Value,
    reactions: Vec<UserRef>,
) -> Result<Post, IngestError> {
    let author = raw_post
        .get("from")
        .and_then(user_from_json)
        .ok_or_else(|| IngestError::structure(id, "post without author"))?;
    let reaction_count = reactions.len() as u64;
    Ok(Post {
        id: Some(id.to_string()),
        source_url: url.map(str::to_string),
        text: str_field(raw_post, "message")
            .or_else(|| str_field(raw_post, "name"))
            .unwrap_or_default(),
        created_time: str_field(raw_post, "created_time"),
        like_count: Some(reported_like_count(raw_post).unwrap_or(reaction_count)),
        reaction_count: Some(reaction_count),
        share_count: raw_post.pointer("/shares/count").and_then(Value::as_u64),
        medium: Some(str_field(raw_post, "type").unwrap_or_else(|| "unknown".to_string())),
        author_id: Some(author.id),
        author_name: Some(author.name),
        comments: Vec::new(),
        reactions,
    })
}
