//! Memory backends for DeskPilot.
//!
//! All backends implement `deskpilot_core::Memory` and rank recall with the
//! same keyword score, so swapping backends changes durability, not results.

pub mod file_backend;
pub mod in_memory;
pub mod noop;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use noop::NoopMemory;

use deskpilot_core::memory::{MemoryEntry, MemorySnippet};

/// Words shorter than this are ignored when ranking.
const MIN_TERM_LEN: usize = 3;

/// Lowercased search terms from a free-text query.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .map(|t| t.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Keyword relevance: term occurrences, damped for long entries.
fn keyword_score(content: &str, terms: &[String]) -> f32 {
    let lower = content.to_lowercase();
    let occurrences: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
    occurrences as f32 / (content.len() as f32 / 100.0).max(1.0)
}

/// Rank `entries` against `query`, most relevant (then most recent) first.
fn rank(entries: &[MemoryEntry], query: &str, limit: usize) -> Vec<MemorySnippet> {
    let terms = query_terms(query);
    if terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &MemoryEntry)> = entries
        .iter()
        .map(|e| (keyword_score(&e.content, &terms), e))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.created_at.cmp(&a.1.created_at))
    });
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(score, e)| {
            let mut metadata = serde_json::Map::new();
            metadata.insert("role".into(), e.role.clone().into());
            metadata.insert("created_at".into(), e.created_at.to_rfc3339().into());
            MemorySnippet {
                content: e.content.clone(),
                score,
                metadata,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_skip_short_words() {
        assert_eq!(query_terms("Is my Blender render done?"), vec!["blender", "done", "render"]);
        assert!(query_terms("a b ?").is_empty());
    }

    #[test]
    fn longer_entries_are_damped() {
        let terms = query_terms("rust");
        let short = keyword_score("Rust rocks", &terms);
        let long = keyword_score(&format!("Rust {}", "filler ".repeat(100)), &terms);
        assert!(short > long);
    }
}
