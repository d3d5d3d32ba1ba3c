//! Süddeutsche Zeitung article adapter.
//!
//! The widget container carries its configuration as a JSON `data-bind`
//! attribute: `{"widget.Disqus": {"shortName": …, "identifier": …}}`.

use super::disqus::{self, WidgetThread};
use super::graph::json_id;
use super::{AdapterContext, Adapted, SourceAdapter, article_post, select_attr, select_text};
use crate::error::IngestError;
use serde_json::Value;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq)]
pub struct SzArticle {
    pub url: String,
}

fn widget_thread(resource: &str, page: &str) -> Result<WidgetThread, IngestError> {
    let binding = select_attr(page, ".disqus-container", "data-bind")
        .ok_or_else(|| IngestError::structure(resource, "widget container missing"))?;
    let binding: Value = serde_json::from_str(&binding)
        .map_err(|e| IngestError::structure(resource, format!("widget binding is not JSON: {e}")))?;
    let widget = binding
        .get("widget.Disqus")
        .ok_or_else(|| IngestError::structure(resource, "widget binding without Disqus entry"))?;
    let forum = widget
        .get("shortName")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::structure(resource, "widget forum missing"))?
        .to_string();
    let identifier = json_id(widget.get("identifier"))
        .ok_or_else(|| IngestError::structure(resource, "widget identifier missing"))?;
    Ok(WidgetThread { forum, identifier })
}

impl SourceAdapter for SzArticle {
    fn handle(&self) -> &str {
        &self.url
    }

    #[instrument(level = "info", skip_all, fields(url = %self.url))]
    async fn adapt(&self, ctx: &AdapterContext<'_>) -> Result<Adapted, IngestError> {
        let resource = self.url.as_str();
        let page = ctx.fetcher.get_text(resource, resource).await?;
        let title = select_text(&page, r#"h1[itemprop="headline"]"#)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::PagedFetcher;
    use crate::scrapers::disqus::tests::{config_for, mount_widget};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <h1 itemprop="headline"><span>Politik</span> Neue Regeln für&nbsp;alle</h1>
        <div class="disqus-container" data-bind='{"widget.Disqus":{"shortName":"sz","identifier":"sz.1.2345"}}'></div>
        </body></html>"#;

    #[test]
    fn test_widget_thread_from_data_bind() {
        let thread = widget_thread("a", PAGE).unwrap();
        assert_eq!(thread.forum, "sz");
        assert_eq!(thread.identifier, "sz.1.2345");
    }

    #[test]
    fn test_malformed_binding_is_a_structure_mismatch() {
        let page = r#"<div class="disqus-container" data-bind='{"widget.Disqus":'></div>"#;
        let err = widget_thread("a", page).unwrap_err();
        assert!(matches!(err, IngestError::StructureMismatch { .. }));
        assert!(widget_thread("a", "<p></p>").is_err());
    }

    #[tokio::test]
    async fn test_adapt_reads_widget_comments() {
        let server = MockServer::start().await;
        mount_widget(&server, "sz", "sz.1.2345").await;
        Mock::given(method("GET"))
            .and(path("/politik/x-1.2345"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        let config = config_for(&server);
        let fetcher = PagedFetcher::for_testing();
        let ctx = AdapterContext { config: &config, fetcher: &fetcher };
        let article = SzArticle {
            url: format!("{}/politik/x-1.2345", server.uri()),
        };

        let adapted = article.adapt(&ctx).await.unwrap();
        assert_eq!(adapted.post.text, "Politik Neue Regeln für alle");
        assert_eq!(adapted.post.author_name.as_deref(), Some("127.0.0.1"));
        assert_eq!(adapted.comments.len(), 3);
    }
}
