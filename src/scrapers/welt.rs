//! WELT article adapter.
//!
//! Comments live in the Disqus widget; the article page names the forum and
//! the thread identifier in inline script variables.

use super::disqus::{self, WidgetThread};
use super::{AdapterContext, Adapted, SourceAdapter, article_post, select_attr};
use crate::error::IngestError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

static SHORTNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+disqus_shortname\s*=\s*'([^']+)';").expect("valid regex"));
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+disqus_identifier\s*=\s*([0-9]+);").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct WeltArticle {
    pub url: String,
}

fn widget_thread(resource: &str, page: &str) -> Result<WidgetThread, IngestError> {
    let forum = SHORTNAME_RE
        .captures(page)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| IngestError::structure(resource, "widget forum missing"))?;
    let identifier = IDENTIFIER_RE
        .captures(page)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| IngestError::structure(resource, "widget identifier missing"))?;
    Ok(WidgetThread { forum, identifier })
}

impl SourceAdapter for WeltArticle {
    fn handle(&self) -> &str {
        &self.url
    }

    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn adapt(&self, ctx: &AdapterContext<'_>) -> Result<Adapted, IngestError> {
        let resource = self.url.as_str();
        let page = ctx.fetcher.get_text(resource, resource).await?;
        let title = select_attr(&page, r#"meta[property="og:title"]"#, "content")
            .ok_or_else(|| IngestError::structure(resource, "article title missing"))?;
        let thread = widget_thread(resource, &page)?;
        debug!(%title, forum = %thread.forum, identifier = %thread.identifier, "Found widget thread");

        let comments = disqus::fetch_thread(ctx, resource, &thread).await?;
        Ok(Adapted {
            post: article_post(resource, title),
            comments,
        })
    }
}
