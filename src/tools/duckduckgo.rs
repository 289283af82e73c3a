//! Web and news search via DuckDuckGo
//!
//! Plain search goes through the instant-answer API. News needs the `vqd`
//! token that the HTML front page hands out for a query, then `news.js`.

use super::{optional_usize, require_str, Tool};
use crate::error::AgentError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use chrono::{TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_RESULTS: usize = 5;
const TITLE_CHARS: usize = 80;
const NEWS_REGION: &str = "wt-wt";

lazy_static::lazy_static! {
    static ref VQD_PATTERN: Regex =
        Regex::new(r#"vqd=["']?([0-9-]+)"#).expect("vqd pattern must compile");
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub href: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsResult {
    pub date: Option<String>,
    pub title: String,
    pub body: String,
    pub url: String,
    pub image: Option<String>,
    pub source: Option<String>,
}

#[derive(Clone)]
pub struct DuckDuckGoClient {
    client: Client,
    base_url: String,
    news_base_url: String,
}

impl DuckDuckGoClient {
    pub fn new(base_url: &str, news_base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Tool(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            news_base_url: news_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        debug!(query = %query, max_results, "DuckDuckGo search");

        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: format!("DuckDuckGo search error: {}", status),
            });
        }

        let data: Value = response.json().await?;
        Ok(parse_search_results(&data, max_results))
    }

    pub async fn news(&self, query: &str, max_results: usize) -> Result<Vec<NewsResult>> {
        debug!(query = %query, max_results, "DuckDuckGo news");

        let page = self
            .client
            .get(format!("{}/", self.news_base_url))
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let vqd = extract_vqd(&page)
            .ok_or_else(|| AgentError::Tool(format!("DuckDuckGo returned no vqd token for '{}'", query)))?;

        let response = self
            .client
            .get(format!("{}/news.js", self.news_base_url))
            .query(&[
                ("l", NEWS_REGION),
                ("o", "json"),
                ("noamp", "1"),
                ("q", query),
                ("vqd", vqd.as_str()),
                ("p", "-1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Api {
                status: status.as_u16(),
                message: format!("DuckDuckGo news error: {}", status),
            });
        }

        let data: Value = response.json().await?;
        Ok(parse_news_results(&data, max_results))
    }
}

pub fn extract_vqd(html: &str) -> Option<String> {
    VQD_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Map `news.js` results into at most `max_results` stories, skipping ones without a link
pub fn parse_news_results(data: &Value, max_results: usize) -> Vec<NewsResult> {
    let text = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut results: Vec<NewsResult> = Vec::new();
    for item in data["results"].as_array().into_iter().flatten() {
        if results.len() >= max_results {
            break;
        }
        let (Some(title), Some(url)) = (text(item, "title"), text(item, "url")) else {
            continue;
        };
        if results.iter().any(|r| r.url == url) {
            continue;
        }

        let date = item
            .get("date")
            .and_then(Value::as_i64)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .map(|dt| dt.to_rfc3339());

        results.push(NewsResult {
            date,
            title,
            body: text(item, "excerpt").unwrap_or_default(),
            url,
            image: text(item, "image"),
            source: text(item, "source"),
        });
    }

    results
}

fn topic_result(topic: &Value) -> Option<SearchResult> {
    let text = topic.get("Text")?.as_str()?;
    let href = topic.get("FirstURL")?.as_str()?;
    if text.is_empty() || href.is_empty() {
        return None;
    }

    // Topic text reads "Title - description"
    let title = match text.split_once(" - ") {
        Some((head, _)) => head.to_string(),
        None => text.chars().take(TITLE_CHARS).collect(),
    };

    Some(SearchResult {
        title,
        href: href.to_string(),
        body: text.to_string(),
    })
}

/// Flatten an instant-answer payload into at most `max_results` hits
pub fn parse_search_results(data: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(abstract_text) = data["AbstractText"].as_str().filter(|s| !s.is_empty()) {
        results.push(SearchResult {
            title: data["Heading"].as_str().unwrap_or("Result").to_string(),
            href: data["AbstractURL"].as_str().unwrap_or_default().to_string(),
            body: abstract_text.to_string(),
        });
    }

    let direct = data["Results"].as_array().into_iter().flatten();
    let related = data["RelatedTopics"]
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|topic| match topic["Topics"].as_array() {
            // Grouped topics nest one level
            Some(group) => group.iter().collect::<Vec<_>>(),
            None => vec![topic],
        });

    for topic in direct.chain(related) {
        if results.len() >= max_results {
            break;
        }
        if let Some(result) = topic_result(topic) {
            if !results.iter().any(|r| r.href == result.href) {
                results.push(result);
            }
        }
    }

    results.truncate(max_results);
    results
}

pub struct DuckDuckGoSearchTool {
    client: Arc<DuckDuckGoClient>,
}

impl DuckDuckGoSearchTool {
    pub fn new(client: Arc<DuckDuckGoClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo and return titles, links and snippets"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The query to search for"},
                "max_results": {"type": "integer", "description": "Maximum number of results", "default": DEFAULT_MAX_RESULTS}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = require_str(input, "query")?;
        let max_results = optional_usize(input, "max_results", DEFAULT_MAX_RESULTS).clamp(1, 25);

        let results = self.client.search(query, max_results).await?;
        Ok(ToolOutput::ok(serde_json::to_value(results)?))
    }
}

pub struct DuckDuckGoNewsTool {
    client: Arc<DuckDuckGoClient>,
}

impl DuckDuckGoNewsTool {
    pub fn new(client: Arc<DuckDuckGoClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Tool for DuckDuckGoNewsTool {
    fn name(&self) -> &str {
        "duckduckgo_news"
    }

    fn description(&self) -> &str {
        "Get the latest news from DuckDuckGo with dates, sources and links"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The query to search for"},
                "max_results": {"type": "integer", "description": "Maximum number of stories", "default": DEFAULT_MAX_RESULTS}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = require_str(input, "query")?;
        let max_results = optional_usize(input, "max_results", DEFAULT_MAX_RESULTS).clamp(1, 25);

        let results = self.client.news(query, max_results).await?;
        Ok(ToolOutput::ok(serde_json::to_value(results)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "Heading": "Rust (programming language)",
            "AbstractText": "Rust is a general-purpose programming language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "Results": [
                {"Text": "Official site - Rust", "FirstURL": "https://www.rust-lang.org/"}
            ],
            "RelatedTopics": [
                {"Text": "Cargo - The Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {
                    "Name": "See also",
                    "Topics": [
                        {"Text": "Tokio - An asynchronous runtime", "FirstURL": "https://duckduckgo.com/Tokio"},
                        {"Text": "Serde - Serialization framework", "FirstURL": "https://duckduckgo.com/Serde"}
                    ]
                },
                {"Text": "", "FirstURL": "https://duckduckgo.com/Empty"}
            ]
        })
    }

    #[test]
    fn test_parse_orders_abstract_results_then_topics() {
        let results = parse_search_results(&sample(), 10);
        let hrefs: Vec<&str> = results.iter().map(|r| r.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://en.wikipedia.org/wiki/Rust_(programming_language)",
                "https://www.rust-lang.org/",
                "https://duckduckgo.com/Cargo",
                "https://duckduckgo.com/Tokio",
                "https://duckduckgo.com/Serde",
            ]
        );
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[2].title, "Cargo");
        assert_eq!(results[2].body, "Cargo - The Rust package manager");
    }

    #[test]
    fn test_parse_respects_max_results() {
        assert_eq!(parse_search_results(&sample(), 2).len(), 2);
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(parse_search_results(&json!({"AbstractText": "", "RelatedTopics": []}), 5).is_empty());
        assert!(parse_search_results(&Value::Null, 5).is_empty());
    }

    #[test]
    fn test_search_tool_schema() {
        let client = Arc::new(
            DuckDuckGoClient::new("https://api.duckduckgo.com", "https://duckduckgo.com", Duration::from_secs(1))
                .unwrap(),
        );
        let tool = DuckDuckGoSearchTool::new(client);
        let spec = tool.spec();
        assert_eq!(spec.name, "duckduckgo_search");
        assert_eq!(spec.parameters["required"], json!(["query"]));
    }

    fn news_sample() -> Value {
        json!({
            "results": [
                {
                    "date": 1700000000,
                    "title": "Chipmakers rally on AI demand",
                    "excerpt": "Shares of NVIDIA rose after...",
                    "url": "https://news.example.com/ai-chips",
                    "image": "https://news.example.com/ai.jpg",
                    "source": "Reuters"
                },
                {"title": "No link here", "excerpt": "dropped"},
                {"date": 1700003600, "title": "Duplicate", "url": "https://news.example.com/ai-chips"},
                {"title": "Regulators weigh AI rules", "url": "https://news.example.com/ai-rules", "source": "AP"},
                {"title": "Third story", "url": "https://news.example.com/third"}
            ]
        })
    }

    #[test]
    fn test_parse_news_results() {
        let news = parse_news_results(&news_sample(), 5);
        let urls: Vec<&str> = news.iter().map(|n| n.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example.com/ai-chips",
                "https://news.example.com/ai-rules",
                "https://news.example.com/third",
            ]
        );
        assert_eq!(news[0].date.as_deref(), Some("2023-11-14T22:13:20+00:00"));
        assert_eq!(news[0].body, "Shares of NVIDIA rose after...");
        assert_eq!(news[0].source.as_deref(), Some("Reuters"));
        assert!(news[1].date.is_none());
        assert!(news[1].image.is_none());

        assert_eq!(parse_news_results(&news_sample(), 2).len(), 2);
        assert!(parse_news_results(&json!({}), 5).is_empty());
    }

    #[test]
    fn test_extract_vqd() {
        let html = r#"<script>DDG.deep.initialize('/d.js?q=ai&vqd=4-1234567890123456789&kl=wt-wt');</script>"#;
        assert_eq!(extract_vqd(html).as_deref(), Some("4-1234567890123456789"));
        assert_eq!(extract_vqd(r#"vqd="4-99""#).as_deref(), Some("4-99"));
        assert!(extract_vqd("<html>no token</html>").is_none());
    }

    #[tokio::test]
    async fn test_news_fetches_token_then_stories() {
        use axum::{extract::Query, routing::get, Json, Router};
        use std::collections::HashMap;

        let router = Router::new()
            .route("/", get(|| async { "<html><script>vqd=\"4-2024\"</script></html>" }))
            .route(
                "/news.js",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let token = params.get("vqd").cloned().unwrap_or_default();
                    Json(json!({"results": [
                        {"title": format!("token {}", token), "url": "https://news.example.com/1"}
                    ]}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let client = DuckDuckGoClient::new(&base, &base, Duration::from_secs(5)).unwrap();
        let news = client.news("artificial intelligence", 5).await.unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "token 4-2024");
    }
}
