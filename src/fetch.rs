//! Cursor-following HTTP/JSON fetch primitive.
//!
//! [`PagedFetcher`] wraps one shared `reqwest::Client` and knows the
//! list-envelope convention of the REST source: `{"data": [...], "paging":
//! {"next": "<url>"}}`. A list resource is followed page by page until no
//! `next` cursor is announced; a single-object resource is returned as-is.
//! The same client also downloads plain pages for the scrape adapters.
//!
//! There is no retry: every failure is reported once, tagged with the
//! resource it belongs to.

use crate::error::IngestError;
use crate::utils::redact_url;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Filter applied to items of each list page before they are kept.
pub type IncludePredicate<'a> = &'a (dyn Fn(&Value) -> bool + Sync);

/// What a fetch produced: a whole list, or the single object the server sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    Items(Vec<Value>),
    Object(Value),
}

impl Fetched {
    /// The list items; a single object where a list was expected is a
    /// contract break by the server.
    pub fn into_items(self, resource: &str) -> Result<Vec<Value>, IngestError> {
        match self {
            Fetched::Items(items) => Ok(items),
            Fetched::Object(_) => Err(IngestError::protocol(
                resource,
                "expected a list envelope, got a single object",
            )),
        }
    }

    pub fn into_object(self, resource: &str) -> Result<Value, IngestError> {
        match self {
            Fetched::Object(value) => Ok(value),
            Fetched::Items(_) => Err(IngestError::protocol(
                resource,
                "expected a single object, got a list envelope",
            )),
        }
    }
}

/// Parameters of one paginated request.
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    /// Id of the resource being fetched, attached to every error.
    pub resource: &'a str,
    pub base_url: &'a str,
    pub params: &'a [(&'a str, &'a str)],
    pub credential: &'a str,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct PagedFetcher {
    client: reqwest::Client,
}

impl PagedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self::new(Duration::from_secs(5)).expect("client builds")
    }

    /// Fetch a resource, following `paging.next` cursors to the end.
    ///
    /// `include` filters the items of each page independently; filtering
    /// never stops pagination early. A single-object answer is only legal on
    /// the first request.
    #[instrument(level = "debug", skip_all, fields(resource = %query.resource))]
    pub async fn fetch(
        &self,
        query: PageQuery<'_>,
        include: Option<IncludePredicate<'_>>,
    ) -> Result<Fetched, IngestError> {
        let resource = query.resource;
        let mut url = Url::parse(query.base_url)
            .map_err(|e| IngestError::protocol(resource, format!("invalid URL {}: {e}", query.base_url)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query.params {
                pairs.append_pair(k, v);
            }
            pairs
                .append_pair("access_token", query.credential)
                .append_pair("limit", &query.page_size.to_string());
        }

        let mut items = Vec::new();
        let mut page = 0usize;
        let mut next = Some(url.to_string());
        while let Some(page_url) = next.take() {
            page += 1;
            debug!(page, url = %redact_url(&page_url), "Fetching page");
            let body = self.get_json(resource, &page_url).await?;

            let Some(data) = body.get("data").and_then(Value::as_array) else {
                if page > 1 {
                    return Err(IngestError::protocol(
                        resource,
                        format!("single object received on page {page} of a paginated list"),
                    ));
                }
                return Ok(Fetched::Object(body));
            };

            let before = items.len();
            items.extend(
                data.iter()
                    .filter(|item| include.is_none_or(|keep| keep(*item)))
                    .cloned(),
            );
            debug!(page, received = data.len(), kept = items.len() - before, "Page done");

            next = body
                .pointer("/paging/next")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(Fetched::Items(items))
    }

    /// GET a URL and decode its JSON body.
    pub async fn get_json(&self, resource: &str, url: &str) -> Result<Value, IngestError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IngestError::transport(resource, e.without_url()))?
            .json::<Value>()
            .await
            .map_err(|e| IngestError::transport(resource, e.without_url()))
    }

    /// GET a web page as text, decoded with the charset the server announced.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_text(&self, resource: &str, url: &str) -> Result<String, IngestError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IngestError::transport(resource, e))?
            .text()
            .await
            .map_err(|e| IngestError::transport(resource, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_three_pages(server: &MockServer) {
        let uri = server.uri();
        Mock::given(method("GET"))
            .and(path("/page/feed"))
            .and(query_param("access_token", "TOKEN"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1", "message": "X one"}, {"id": "2", "message": "two"}],
                "paging": {"next": format!("{uri}/cursor/p2?access_token=TOKEN")}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cursor/p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "3", "message": "three"}, {"id": "4", "message": "X four"}],
                "paging": {"next": format!("{uri}/cursor/p3?access_token=TOKEN")}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cursor/p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "5", "message": "X five"}],
                "paging": {"previous": format!("{uri}/cursor/p2")}
            })))
            .mount(server)
            .await;
    }

    fn ids(items: &[Value]) -> Vec<&str> {
        items.iter().filter_map(|v| v["id"].as_str()).collect()
    }

    #[tokio::test]
    async fn test_follows_all_pages_in_order() {
        let server = MockServer::start().await;
        mount_three_pages(&server).await;
        let base = format!("{}/page/feed", server.uri());
        let query = PageQuery {
            resource: "page",
            base_url: &base,
            params: &[],
            credential: "TOKEN",
            page_size: 2,
        };

        let items = PagedFetcher::for_testing()
            .fetch(query, None)
            .await
            .unwrap()
            .into_items("page")
            .unwrap();
        assert_eq!(ids(&items), vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_predicate_filters_within_pages_and_keeps_paginating() {
        let server = MockServer::start().await;
        mount_three_pages(&server).await;
        let base = format!("{}/page/feed", server.uri());
        let query = PageQuery {
            resource: "page",
            base_url: &base,
            params: &[("fields", "id,message")],
            credential: "TOKEN",
            page_size: 2,
        };
        let has_x = |v: &Value| v["message"].as_str().is_some_and(|m| m.contains('X'));

        let items = PagedFetcher::for_testing()
            .fetch(query, Some(&has_x))
            .await
            .unwrap()
            .into_items("page")
            .unwrap();
        assert_eq!(ids(&items), vec!["1", "4", "5"]);
    }

    #[tokio::test]
    async fn test_single_object_on_first_request_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/42"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "42", "message": "hello"})),
            )
            .mount(&server)
            .await;
        let base = format!("{}/42", server.uri());
        let query = PageQuery {
            resource: "42",
            base_url: &base,
            params: &[],
            credential: "TOKEN",
            page_size: 200,
        };

        let fetched = PagedFetcher::for_testing().fetch(query, None).await.unwrap();
        let object = fetched.into_object("42").unwrap();
        assert_eq!(object["message"], "hello");
    }

    #[tokio::test]
    async fn test_single_object_mid_pagination_is_a_protocol_violation() {
        let server = MockServer::start().await;
        let uri = server.uri();
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "1"}],
                "paging": {"next": format!("{uri}/broken")}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "odd"})))
            .mount(&server)
            .await;
        let base = format!("{uri}/list");
        let query = PageQuery {
            resource: "list",
            base_url: &base,
            params: &[],
            credential: "TOKEN",
            page_size: 1,
        };

        let err = PagedFetcher::for_testing().fetch(query, None).await.unwrap_err();
        assert!(matches!(err, IngestError::ProtocolViolation { .. }));
        assert!(err.is_run_fatal());
    }

    #[tokio::test]
    async fn test_http_failure_carries_resource_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/42"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let base = format!("{}/42", server.uri());
        let query = PageQuery {
            resource: "42",
            base_url: &base,
            params: &[],
            credential: "TOKEN",
            page_size: 200,
        };

        let err = PagedFetcher::for_testing().fetch(query, None).await.unwrap_err();
        assert_eq!(err.resource(), Some("42"));
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_run_fatal());
    }

    #[test]
    fn test_fetched_shape_mismatch() {
        assert!(Fetched::Object(json!({})).into_items("r").is_err());
        assert!(Fetched::Items(vec![]).into_object("r").is_err());
    }
}
