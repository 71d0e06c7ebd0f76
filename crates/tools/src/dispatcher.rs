//! Tool dispatcher: uniform retry, caching, and journaling for every tool.
//!
//! The dispatcher never fails: every outcome, including an unknown tool name
//! or an exhausted retry budget, is rendered as observation text for the
//! model. Only handlers that declare themselves `cacheable` have their
//! results cached, keyed by tool name plus a canonical (key-sorted)
//! serialization of the parameters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deskpilot_core::tool::ToolRegistry;
use deskpilot_security::{EntryKind, Journal};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Substituted for a successful but empty tool output.
pub const EMPTY_OUTPUT: &str = "(completed, no output)";

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// The result of one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Observation text for the model
    pub text: String,
    /// Handler invocations made (0 for cache hits and unknown tools)
    pub attempts: u32,
    /// Attempts that returned an error
    pub failed_attempts: u32,
    pub succeeded: bool,
    pub cached: bool,
}

impl DispatchOutcome {
    fn failed(text: String, attempts: u32, failed_attempts: u32) -> Self {
        Self {
            text,
            attempts,
            failed_attempts,
            succeeded: false,
            cached: false,
        }
    }
}

struct CacheEntry {
    result: String,
    stored_at: Instant,
}

/// Routes tool calls to registered handlers.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    journal: Arc<Journal>,
    max_retries: u32,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, journal: Arc<Journal>) -> Self {
        Self {
            registry,
            journal,
            max_retries: DEFAULT_MAX_RETRIES,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute a tool and return only the observation text.
    pub async fn execute(&self, name: &str, params: &Map<String, Value>) -> String {
        self.dispatch(name, params).await.text
    }

    /// Execute a tool, reporting how the call went.
    pub async fn dispatch(&self, name: &str, params: &Map<String, Value>) -> DispatchOutcome {
        let Some(handler) = self.registry.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            let available = self.registry.names().join(", ");
            return DispatchOutcome::failed(format!("Unknown tool: {name}. Available: {available}"), 0, 0);
        };

        let cache_key = handler.cacheable().then(|| cache_key(name, params));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cached(key) {
                debug!(tool = %name, "Tool cache hit");
                return DispatchOutcome {
                    text: hit,
                    attempts: 0,
                    failed_attempts: 0,
                    succeeded: true,
                    cached: true,
                };
            }
        }

        let mut failed_attempts = 0;
        for attempt in 1..=self.max_retries {
            match handler.execute(params).await {
                Ok(output) => {
                    let result = if output.is_empty() {
                        EMPTY_OUTPUT.to_string()
                    } else {
                        output
                    };
                    if let Some(key) = cache_key {
                        self.store(key, &result);
                    }
                    self.journal
                        .record_success(name, format!("Completed: {}", truncate_chars(&result, 100)));
                    return DispatchOutcome {
                        text: result,
                        attempts: attempt,
                        failed_attempts,
                        succeeded: true,
                        cached: false,
                    };
                }
                Err(err) if !err.is_retryable() => {
                    let text = err.to_string();
                    warn!(tool = %name, error = %text, "Tool call refused");
                    self.journal.record_failure(
                        name,
                        format!("Refused: {}", truncate_chars(&text, 150)),
                        text.clone(),
                    );
                    return DispatchOutcome::failed(text, attempt, failed_attempts + 1);
                }
                Err(err) => {
                    failed_attempts += 1;
                    let error = err.to_string();
                    if attempt < self.max_retries {
                        info!(tool = %name, attempt, error = %error, "Tool failed, retrying");
                        self.journal.record_failure(
                            name,
                            format!("Attempt {attempt}: {}", truncate_chars(&error, 150)),
                            error,
                        );
                        continue;
                    }

                    warn!(tool = %name, attempts = attempt, error = %error, "Tool failed on every attempt");
                    self.journal.record(
                        EntryKind::Failure,
                        name,
                        format!("Failed after {attempt} attempts: {}", truncate_chars(&error, 150)),
                        error.clone(),
                        format!("Tool {name} needs alternative approach"),
                    );
                    return DispatchOutcome::failed(
                        format!("Error (after {attempt} attempts): {error}"),
                        attempt,
                        failed_attempts,
                    );
                }
            }
        }

        DispatchOutcome::failed("All retry attempts exhausted.".to_string(), self.max_retries, failed_attempts)
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.cache_ttl => Some(entry.result.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: String, result: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                key,
                CacheEntry {
                    result: result.to_string(),
                    stored_at: Instant::now(),
                },
            );
        }
    }
}

/// `tool:{params}` with object keys sorted at every depth.
pub fn cache_key(tool: &str, params: &Map<String, Value>) -> String {
    format!("{tool}:{}", canonical(&Value::Object(params.clone())))
}

fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// The first `max` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
