//! `deep_research`: iterative web research. Each round searches, keeps the
//! best new sources, then asks the model which gap to search next.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::{ToolHandler, param_str, param_u64};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::subagent::ask;
use crate::web_search::{WebSearchTool, rank_by_credibility};

const MAX_DEPTH: u64 = 3;
const MAX_SOURCES: u64 = 8;
const SOURCES_PER_ROUND: usize = 3;
const GAP_CONTEXT: usize = 3;
const MIN_FOLLOW_UP_CHARS: usize = 6;
const REPORT_FINDINGS: usize = 15;

pub struct DeepResearchTool {
    runtime: Arc<dyn Provider>,
    search: Arc<WebSearchTool>,
}

impl DeepResearchTool {
    pub fn new(runtime: Arc<dyn Provider>, search: Arc<WebSearchTool>) -> Self {
        Self { runtime, search }
    }

    /// Ask the model for the next search; `None` keeps the current query.
    async fn follow_up(&self, topic: &str, findings: &[String]) -> Option<String> {
        let recent = &findings[findings.len().saturating_sub(GAP_CONTEXT)..];
        let prompt = format!(
            "Based on these findings about '{topic}':\n{}\n\nWhat specific follow-up question would fill the \
             biggest knowledge gap? Reply with ONLY the search query, nothing else.",
            recent.join("\n")
        );
        match ask(self.runtime.as_ref(), self.runtime.model(), prompt).await {
            Ok(reply) => {
                let reply = reply.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());
                (reply.chars().count() >= MIN_FOLLOW_UP_CHARS).then(|| reply.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Could not generate a follow-up query");
                None
            }
        }
    }
}

#[async_trait]
impl ToolHandler for DeepResearchTool {
    fn name(&self) -> &str {
        "deep_research"
    }

    fn description(&self) -> &str {
        "Recursive web research: search, collect sources, find gaps, follow up, and report."
    }

    fn usage(&self) -> &str {
        r#"{"query": "research topic", "depth": 2, "max_sources": 5}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let topic = param_str(params, "query", "").trim();
        if topic.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'query' argument".into()));
        }
        let depth = param_u64(params, "depth").unwrap_or(2).clamp(1, MAX_DEPTH) as usize;
        let max_sources = param_u64(params, "max_sources").unwrap_or(5).clamp(1, MAX_SOURCES) as usize;
        let year = Local::now().year().to_string();

        let mut query = topic.to_string();
        let mut findings: Vec<String> = Vec::new();
        let mut searched: Vec<String> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();

        for round in 1..=depth {
            let mut search_query = if query.contains(&year) {
                query.clone()
            } else {
                format!("{query} {year}")
            };
            if searched.contains(&search_query) {
                if findings.is_empty() {
                    break;
                }
                search_query = format!("{query} {year} details technical specifications");
                if searched.contains(&search_query) {
                    break;
                }
            }
            searched.push(search_query.clone());
            debug!(round, query = %search_query, "Research search");

            let mut results = match self.search.search(&search_query).await {
                Ok(results) => results,
                Err(e) => {
                    findings.push(format!("[Search {round} failed: {e}]"));
                    continue;
                }
            };
            if results.is_empty() {
                findings.push(format!("[Search {round}: no results for '{search_query}']"));
                continue;
            }
            rank_by_credibility(&mut results);
            results.truncate(max_sources);

            for result in results.into_iter().take(SOURCES_PER_ROUND) {
                if seen_urls.insert(result.url.clone()) {
                    findings.push(format!("- **{}** ({})\n  {}", result.title, result.url, result.snippet));
                }
            }

            if round < depth && !findings.is_empty() {
                if let Some(next) = self.follow_up(topic, &findings).await {
                    query = next;
                }
            }
        }

        if findings.is_empty() {
            return Ok(format!(
                "Deep research on '{topic}' found no results after {depth} iterations."
            ));
        }

        let mut report = vec![
            format!("## Deep Research Report: {topic}"),
            format!(
                "**Iterations**: {depth} | **Sources**: {} | **Searches**: {}",
                seen_urls.len(),
                searched.len()
            ),
            String::new(),
            "### Findings".to_string(),
        ];
        report.extend(findings.into_iter().take(REPORT_FINDINGS));
        report.push(String::new());
        report.push("### Queries Used".to_string());
        report.extend(searched.iter().map(|q| format!("- {q}")));
        Ok(report.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedRuntime;
    use axum::extract::Query;
    use axum::{Json, Router, routing::get};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    /// A search API that answers "cancellation" queries with a second page.
    async fn serve_search(queries: Arc<Mutex<Vec<String>>>) -> String {
        let app = Router::new().route(
            "/",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let queries = queries.clone();
                async move {
                    let q = params.get("q").cloned().unwrap_or_default();
                    queries.lock().unwrap().push(q.clone());
                    let topics = if q.contains("cancellation") {
                        json!([
                            {"Text": "Tokio - async runtime", "FirstURL": "https://github.com/tokio-rs/tokio"},
                            {"Text": "Cancel safety - select! pitfalls", "FirstURL": "https://blog.example.com/cancel"}
                        ])
                    } else if q.contains("nothing") {
                        json!([])
                    } else {
                        json!([
                            {"Text": "Tokio - async runtime", "FirstURL": "https://github.com/tokio-rs/tokio"},
                            {"Text": "Async book - the async Rust book", "FirstURL": "https://rust-lang.github.io/async-book"}
                        ])
                    };
                    Json(json!({"Heading": "", "RelatedTopics": topics}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn follows_the_model_into_the_gap() {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let search = Arc::new(WebSearchTool::with_base_url(serve_search(queries.clone()).await));
        let runtime = Arc::new(ScriptedRuntime::new(&["qwen3:30b"], |_, _| {
            Ok("\"rust async cancellation safety\"".into())
        }));
        let tool = DeepResearchTool::new(runtime.clone(), search);

        let out = tool.execute(&obj(json!({"query": "rust async"}))).await.unwrap();
        let year = Local::now().year();

        let queries = queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![
                format!("rust async {year}"),
                format!("rust async cancellation safety {year}")
            ]
        );
        assert_eq!(runtime.calls().len(), 1);
        assert!(runtime.calls()[0].1.contains("findings about 'rust async'"));

        assert!(out.starts_with("## Deep Research Report: rust async\n**Iterations**: 2 | **Sources**: 3 | **Searches**: 2"));
        assert_eq!(out.matches("github.com/tokio-rs/tokio").count(), 1);
        assert!(out.contains("- **Cancel safety** (https://blog.example.com/cancel)"));
        assert!(out.contains(&format!("### Queries Used\n- rust async {year}\n")));
    }

    #[tokio::test]
    async fn empty_search_reports_no_results() {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let search = Arc::new(WebSearchTool::with_base_url(serve_search(queries.clone()).await));
        let runtime = Arc::new(ScriptedRuntime::new(&["qwen3:30b"], |_, _| Ok("unused".into())));
        let tool = DeepResearchTool::new(runtime.clone(), search);

        let out = tool
            .execute(&obj(json!({"query": "nothing here", "depth": 1})))
            .await
            .unwrap();

        assert!(out.contains("### Findings\n[Search 1: no results for 'nothing here"));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn query_is_required() {
        let runtime = Arc::new(ScriptedRuntime::new(&["qwen3:30b"], |_, _| Ok(String::new())));
        let tool = DeepResearchTool::new(runtime, Arc::new(WebSearchTool::with_base_url("http://127.0.0.1:9/")));
        assert!(matches!(
            tool.execute(&Map::new()).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }
}
