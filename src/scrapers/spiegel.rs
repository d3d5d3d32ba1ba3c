//! SPIEGEL ONLINE article scraper.
//!
//! The article page announces the total number of contributions and the
//! forum thread id. Comments are served as HTML fragments of five, addressed
//! by the offset of their last entry. Fragments carry no comment ids and no
//! reply structure, so every comment is top-level and gets a positional id.

use super::markup;
use super::{AdapterContext, Adapted, SourceAdapter, article_post, clean_text, resolve, select_attr, select_text};
use crate::error::IngestError;
use crate::models::RawComment;
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

const COMMENTS_PER_FRAGMENT: u32 = 5;

static TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"insgesamt\s+([0-9]+)\s+Beiträge").expect("valid regex"));
static MEMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/forum/member-([0-9]+)\.html").expect("valid regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct SpiegelArticle {
    pub url: String,
}

fn fragment_count(total: u32) -> u32 {
    total.div_ceil(COMMENTS_PER_FRAGMENT)
}

/// Parse one fragment. `seen` is the number of comments already taken from
/// earlier fragments of the thread.
fn parse_fragment(
    resource: &str,
    thread: &str,
    fragment: &str,
    seen: usize,
) -> Result<Vec<RawComment>, IngestError> {
    let wrapped = format!("<page>{}</page>", markup::html_to_xml(fragment));
    let tree = markup::parse(&wrapped).map_err(|e| {
        debug!(preview = %truncate_for_log(&wrapped, 300), "Comment fragment did not parse");
        IngestError::structure(resource, e.to_string())
    })?;

    let mut comments = Vec::new();
    for entry in tree
        .child_elements()
        .filter(|e| e.name == "div" && e.has_class("article-comment"))
    {
        let id = format!("spon-{thread}-{}", seen + comments.len() + 1);
        let user = entry
            .find_by_class("article-comment-user")
            .ok_or_else(|| IngestError::structure(resource, format!("comment {id} without user block")))?;
        let link = user
            .child_elements()
            .find(|e| e.name == "a")
            .ok_or_else(|| IngestError::structure(resource, format!("comment {id} without author link")))?;
        let body = entry
            .find_by_class("js-article-post-full-text")
            .ok_or_else(|| IngestError::structure(resource, format!("comment {id} without text")))?;

        comments.push(RawComment {
            text: body.text().trim().to_string(),
            author_name: clean_text(&link.text()),
            author_id: link
                .attr("href")
                .and_then(|href| MEMBER_RE.captures(href))
                .map(|caps| caps[1].to_string()),
            created_time: user
                .text_after("a")
                .map(clean_text)
                .filter(|date| !date.is_empty()),
            id,
            ..Default::default()
        });
    }
    Ok(comments)
}

impl SourceAdapter for SpiegelArticle {
    fn handle(&self) -> &str {
        &self.url
    }

    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn adapt(&self, ctx: &AdapterContext<'_>) -> Result<Adapted, IngestError> {
        let resource = self.url.as_str();
        let page = ctx.fetcher.get_text(resource, resource).await?;
        let title = select_text(&page, "h2.article-title")
            .ok_or_else(|| IngestError::structure(resource, "article title missing"))?;
        let total: u32 = TOTAL_RE
            .captures(&page)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| IngestError::structure(resource, "comment total missing"))?;
        let thread = select_attr(&page, r#"input[name="threadid"]"#, "value")
            .ok_or_else(|| IngestError::structure(resource, "forum thread id missing"))?;
        let fragments = fragment_count(total);
        debug!(%title, total, fragments, %thread, "Found forum thread");

        let mut comments = Vec::new();
        for n in 1..=fragments {
            let fragment_url = resolve(
                resource,
                resource,
                &format!("/fragments/community/spon-{thread}-{}.html", n * COMMENTS_PER_FRAGMENT),
            )?;
            debug!(fragment = n, of = fragments, "Fetching comment fragment");
            let fragment = ctx.fetcher.get_text(resource, &fragment_url).await?;
            let parsed = parse_fragment(resource, &thread, &fragment, comments.len())?;
            comments.extend(parsed);
        }

        info!(comments = comments.len(), announced = total, "Scraped article");
        Ok(Adapted {
            post: article_post(resource, title),
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fetch::PagedFetcher;
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(member: &str, name: &str, text: &str) -> String {
        format!(
            r#"<div class="article-comment">
              <div class="article-comment-user"><a href="/forum/member-{member}.html">{name}</a>
                heute, 10:15 Uhr</div>
              <div class="article-comment-title">Titel</div>
              <div class="js-article-post-full-text"> {text} <br> </div>
            </div>"#
        )
    }

    #[test]
    fn test_fragment_count_rounds_up() {
        assert_eq!(fragment_count(0), 0);
        assert_eq!(fragment_count(5), 1);
        assert_eq!(fragment_count(6), 2);
        assert_eq!(fragment_count(12), 3);
    }

    #[test]
    fn test_parse_fragment_assigns_positional_ids() {
        let fragment = [entry("17", "Leser&nbsp;A", "Gut so"), entry("18", "Leser B", "Nein")].join("\n");
        let comments = parse_fragment("a", "123", &fragment, 5).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "spon-123-6");
        assert_eq!(comments[1].id, "spon-123-7");
        assert_eq!(comments[0].author_id.as_deref(), Some("17"));
        assert_eq!(comments[0].author_name, "Leser A");
        assert_eq!(comments[0].created_time.as_deref(), Some("heute, 10:15 Uhr"));
        assert_eq!(comments[0].text, "Gut so");
        assert!(comments.iter().all(|c| c.parent_id.is_none()));
    }

    #[test]
    fn test_broken_fragment_is_a_structure_mismatch() {
        let err = parse_fragment("a", "1", "<div class=\"article-comment\">", 0).unwrap_err();
        assert!(matches!(err, IngestError::StructureMismatch { .. }));
    }

    #[tokio::test]
    async fn test_adapt_fetches_every_fragment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/politik/a-1.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><h2 class="article-title lp-article-title">
                    <span class="headline">Debatte</span></h2>
                  <span>insgesamt 6 Beiträge</span>
                  <form><input type="hidden" name="threadid" value="42" /></form>
                </body></html>"#,
            ))
            .mount(&server)
            .await;
        let first: Vec<String> = (1..=5).map(|i| entry(&i.to_string(), "L", &format!("c{i}"))).collect();
        Mock::given(method("GET"))
            .and(path("/fragments/community/spon-42-5.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(first.join("")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fragments/community/spon-42-10.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(entry("6", "L", "c6")))
            .mount(&server)
            .await;

        let config = Config::for_testing(Path::new("unused"));
        let fetcher = PagedFetcher::for_testing();
        let ctx = AdapterContext { config: &config, fetcher: &fetcher };
        let article = SpiegelArticle {
            url: format!("{}/politik/a-1.html", server.uri()),
        };

        let adapted = article.adapt(&ctx).await.unwrap();
        assert_eq!(adapted.post.text, "Debatte");
        let texts: Vec<&str> = adapted.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["c1", "c2", "c3", "c4", "c5", "c6"]);
        assert_eq!(adapted.comments[5].id, "spon-42-6");
    }
}
