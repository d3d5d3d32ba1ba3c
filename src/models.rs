//! Canonical data model shared by every source adapter.
//!
//! This module defines the shapes all sources are normalized into:
//! - [`RawComment`]: a comment as an adapter emits it, referencing its parent by id
//! - [`Comment`]: a comment inside a reconstructed reply tree
//! - [`Post`]: one post or article with its comment forest and reactions
//! - [`Snapshot`]: the full, ordered output of one ingestion run
//!
//! Timestamps stay as the free-form strings the source returned; nothing
//! downstream may assume a fixed format.

use serde::{Deserialize, Serialize};

/// An account that authored or reacted to something.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// A comment as produced by an adapter, before tree reconstruction.
///
/// `parent_id` is `None` for top-level comments. For sources without parent
/// ids (scraped sites) adapters fill it from document order.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RawComment {
    pub id: String,
    pub text: String,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// A comment with its replies, in source order.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// The author as a [`UserRef`], if the source exposed an account id.
    pub fn author(&self) -> Option<UserRef> {
        self.author_id.as_ref().map(|id| UserRef {
            id: id.clone(),
            name: self.author_name.clone(),
        })
    }
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Comment {
            id: raw.id,
            text: raw.text,
            author_name: raw.author_name,
            author_id: raw.author_id,
            created_time: raw.created_time,
            like_count: raw.like_count,
            replies: Vec::new(),
        }
    }
}

/// One post (REST sources) or article (scraped sources).
///
/// Scraped articles carry no `id`; their `source_url` is their identity.
/// `like_count` is the source's own count, falling back to the size of the
/// fetched reaction list; `reaction_count` is always that list's size. The
/// two are kept apart because sources do not agree on which is right.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub reactions: Vec<UserRef>,
}

impl Post {
    /// Stable identity: the source id, else the URL it was scraped from.
    pub fn identity(&self) -> &str {
        self.id
            .as_deref()
            .or(self.source_url.as_deref())
            .unwrap_or_default()
    }

    pub fn author(&self) -> Option<UserRef> {
        self.author_id.as_ref().map(|id| UserRef {
            id: id.clone(),
            name: self.author_name.clone().unwrap_or_default(),
        })
    }

    /// Without an author id, the author name must be present.
    pub fn has_displayable_identity(&self) -> bool {
        self.author_id.is_some() || self.author_name.as_deref().is_some_and(|n| !n.is_empty())
    }
}

/// A post that could not be ingested, with the reason.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Failure {
    pub resource: String,
    pub kind: String,
    pub cause: String,
}

/// The normalized output of one ingestion run.
///
/// Posts appear in feed order. A snapshot with failures is partial: the
/// failed resources are listed, never represented by placeholder posts.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Snapshot {
    pub run_key: String,
    pub posts: Vec<Post>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl Snapshot {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
