//! ZEIT ONLINE article scraper.
//!
//! The article page carries the title and a pager whose last entry links to
//! `…?page=N#comments`; pages `1..=N` are fetched from that link. Each page
//! holds a `section.comment-section#comments` with one `article` element per
//! comment. Top-level comments are marked `js-comment-toplevel`; every other
//! comment is a reply to the most recent top-level comment, possibly one
//! from an earlier page.

use super::markup::{self, Element};
use super::{AdapterContext, Adapted, SourceAdapter, article_post, clean_text, resolve, select_text};
use crate::error::IngestError;
use crate::models::RawComment;
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

static PAGER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        <li\s+class="pager__page">\s*
        <a\s+href="(?P<paging_url>[^"]*?\?page=)(?P<pagecount>[0-9]+)\#comments">
        \s*[0-9]+\s*
        </a>\s*</li>\s*</ul>"#,
    )
    .expect("valid regex")
});
static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<section\s+class="comment-section"\s+id="comments">.*?</section>"#)
        .expect("valid regex")
});
static USER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/user/([^/?#]+)/?$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ZeitArticle {
    pub url: String,
}

/// Where the comment pages live and how many there are.
#[derive(Debug, PartialEq)]
struct Pager {
    paging_url: String,
    page_count: u32,
}

fn find_pager(resource: &str, page: &str) -> Result<Pager, IngestError> {
    let caps = PAGER_RE
        .captures(page)
        .ok_or_else(|| IngestError::structure(resource, "no comment pager found"))?;
    let page_count = caps["pagecount"]
        .parse()
        .map_err(|_| IngestError::structure(resource, "comment pager count out of range"))?;
    Ok(Pager {
        paging_url: caps["paging_url"].replace("&amp;", "&"),
        page_count,
    })
}

/// Parse one comment page. `last_toplevel` carries the id of the most
/// recent top-level comment across pages of the same article.
fn parse_comment_page(
    resource: &str,
    page: &str,
    last_toplevel: &mut Option<String>,
) -> Result<Vec<RawComment>, IngestError> {
    let section = SECTION_RE
        .find(page)
        .ok_or_else(|| IngestError::structure(resource, "comment section missing"))?;
    let xml = markup::html_to_xml(section.as_str());
    let tree = markup::parse(&xml).map_err(|e| {
        debug!(preview = %truncate_for_log(&xml, 300), "Comment section did not parse");
        IngestError::structure(resource, e.to_string())
    })?;

    let mut comments = Vec::new();
    for article in tree.descendants().filter(|e| e.name == "article") {
        let mut comment = parse_comment(resource, article)?;
        if article.has_class("js-comment-toplevel") {
            *last_toplevel = Some(comment.id.clone());
        } else {
            let parent = last_toplevel.clone().ok_or_else(|| {
                IngestError::structure(resource, format!("reply {} precedes any top-level comment", comment.id))
            })?;
            comment.parent_id = Some(parent);
        }
        comments.push(comment);
    }
    Ok(comments)
}

fn parse_comment(resource: &str, article: &Element) -> Result<RawComment, IngestError> {
    let id = article
        .attr("id")
        .ok_or_else(|| IngestError::structure(resource, "comment without id"))?
        .to_string();
    let author_link = article
        .find_by_class("comment-meta__name")
        .and_then(|meta| meta.find(|e| e.name == "a"))
        .ok_or_else(|| IngestError::structure(resource, format!("comment {id} without author link")))?;
    let body = article
        .find_by_class("comment__body")
        .ok_or_else(|| IngestError::structure(resource, format!("comment {id} without body")))?;

    Ok(RawComment {
        text: body.text().trim().to_string(),
        author_name: clean_text(&author_link.text()),
        author_id: author_link
            .attr("href")
            .and_then(|href| USER_RE.captures(href))
            .map(|caps| caps[1].to_string()),
        created_time: article
            .find_by_class("comment-meta__date")
            .map(|date| clean_text(&date.text()))
            .filter(|date| !date.is_empty()),
        id,
        ..Default::default()
    })
}

impl SourceAdapter for ZeitArticle {
    fn handle(&self) -> &str {
        &self.url
    }

    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn adapt(&self, ctx: &AdapterContext<'_>) -> Result<Adapted, IngestError> {
        let resource = self.url.as_str();
        let page = ctx.fetcher.get_text(resource, resource).await?;
        let title = select_text(&page, "span.article-heading__title")
            .ok_or_else(|| IngestError::structure(resource, "article title missing"))?;
        let pager = find_pager(resource, &page)?;
        debug!(%title, pages = pager.page_count, "Found comment pager");

        let mut comments = Vec::new();
        let mut last_toplevel = None;
        for n in 1..=pager.page_count {
            let page_url = resolve(resource, resource, &format!("{}{n}", pager.paging_url))?;
            debug!(page = n, of = pager.page_count, "Fetching comment page");
            let page = ctx.fetcher.get_text(resource, &page_url).await?;
            comments.extend(parse_comment_page(resource, &page, &mut last_toplevel)?);
        }

        info!(comments = comments.len(), "Scraped article");
        Ok(Adapted {
            post: article_post(resource, title),
            comments,
        })
    }
}
