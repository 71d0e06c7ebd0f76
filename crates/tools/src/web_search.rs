//! Web search tool: DuckDuckGo instant-answer API.
//!
//! Results are scored for source credibility and returned best-first as
//! pretty JSON: `[{title, url, snippet, source, confidence}]`.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolHandler, param_str, param_u64};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const DUCKDUCKGO_API: &str = "https://api.duckduckgo.com/";

const TRUSTED_DOMAINS: &[&str] = &[
    "docs.python.org",
    "developer.apple.com",
    "developer.mozilla.org",
    "stackoverflow.com",
    "github.com",
    "arxiv.org",
    "wikipedia.org",
    "en.wikipedia.org",
    "docs.google.com",
    "learn.microsoft.com",
    "doc.rust-lang.org",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    #[serde(default)]
    pub confidence: u8,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    base_url: String,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_base_url(DUCKDUCKGO_API)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Raw, unranked results for `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let body: InstantAnswer = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.into_results())
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs, and snippets ranked by source credibility."
    }

    fn usage(&self) -> &str {
        r#"{"query": "...", "num_results": 5}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let query = param_str(params, "query", "").trim();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'query' argument".into()));
        }
        let num_results = param_u64(params, "num_results").unwrap_or(5).clamp(1, 20) as usize;

        let mut results = match self.search(query).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query = %query, error = %e, "Web search failed");
                Vec::new()
            }
        };
        if results.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("All search methods failed for: {query}"),
            });
        }

        rank_by_credibility(&mut results);
        results.truncate(num_results);
        debug!(query = %query, count = results.len(), "Web search results");

        serde_json::to_string_pretty(&results).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason: e.to_string(),
        })
    }
}

/// Score each result 0-100 and sort best first. Ties keep their order.
pub fn rank_by_credibility(results: &mut [SearchResult]) {
    for result in results.iter_mut() {
        result.confidence = credibility(&result.url);
    }
    results.sort_by(|a, b| b.confidence.cmp(&a.confidence));
}

fn credibility(url: &str) -> u8 {
    let domain = url.split('/').nth(2).unwrap_or("");
    let lower = url.to_lowercase();
    let mut score: u32 = 50;
    if TRUSTED_DOMAINS.contains(&domain) {
        score += 30;
    }
    if ["official", "docs", "documentation"].iter().any(|k| lower.contains(k)) {
        score += 10;
    }
    if domain.ends_with(".edu") || domain.ends_with(".gov") {
        score += 20;
    }
    score.min(100) as u8
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    results: Vec<Topic>,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

#[derive(Debug, Default, Deserialize)]
struct Topic {
    #[serde(default, rename = "Text")]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    /// Present on category groups instead of `Text`
    #[serde(default, rename = "Topics")]
    topics: Vec<Topic>,
}

impl InstantAnswer {
    fn into_results(self) -> Vec<SearchResult> {
        let mut out = Vec::new();
        if !self.abstract_text.is_empty() && !self.abstract_url.is_empty() {
            out.push(SearchResult {
                title: self.heading.clone(),
                url: self.abstract_url,
                snippet: self.abstract_text,
                source: "duckduckgo".into(),
                confidence: 0,
            });
        }

        let mut topics = self.results;
        topics.extend(self.related_topics);
        flatten(topics, &mut out);
        out
    }
}

fn flatten(topics: Vec<Topic>, out: &mut Vec<SearchResult>) {
    for topic in topics {
        if !topic.topics.is_empty() {
            flatten(topic.topics, out);
            continue;
        }
        if topic.text.is_empty() || topic.first_url.is_empty() {
            continue;
        }
        let title = topic.text.split(" - ").next().unwrap_or(&topic.text).to_string();
        out.push(SearchResult {
            title,
            url: topic.first_url,
            snippet: topic.text,
            source: "duckduckgo".into(),
            confidence: 0,
        });
    }
}
