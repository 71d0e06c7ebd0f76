//! Tool-call parsing for the text protocol the model is prompted with:
//!
//! ```text
//! Thought: I should look at the file.
//! Action: read_file
//! Action Input: {"path": "~/notes.txt"}
//! ```
//!
//! Parsing is lenient. A missing or malformed parameter blob yields an empty
//! parameter map instead of failing the step.

use std::sync::LazyLock;

use deskpilot_core::tool::ToolCall;
use regex_lite::Regex;
use serde_json::{Map, Value};

const INPUT_MARKER: &str = "Action Input:";

static ACTION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"Action:\s*(\w+)").ok());
static LOOSE_INPUT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)Action Input:\s*(\{.*?\})").ok());

/// Parse the first tool invocation in `text`, if any.
///
/// `None` means the step carries no action and is a final answer.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let action_re = ACTION_RE.as_ref()?;
    let tool = action_re.captures(text)?.get(1)?.as_str().to_string();
    Some(ToolCall::new(tool, parse_params(text)))
}

fn parse_params(text: &str) -> Map<String, Value> {
    let Some(marker) = text.find(INPUT_MARKER) else {
        return Map::new();
    };
    let after = marker + INPUT_MARKER.len();
    let rest = &text[after..];
    let start = after + (rest.len() - rest.trim_start().len());

    if let Some(object) = extract_json_object(text, start).and_then(parse_object) {
        return object;
    }

    LOOSE_INPUT_RE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_object(m.as_str()))
        .unwrap_or_default()
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Extract the balanced `{...}` object that starts at byte offset `start`.
///
/// Braces inside string literals (including escaped quotes) do not count
/// toward depth. Returns `None` when `text[start..]` does not open with `{`
/// or the object never closes.
pub fn extract_json_object(text: &str, start: usize) -> Option<&str> {
    let tail = text.get(start..)?;
    if !tail.starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in tail.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&tail[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
