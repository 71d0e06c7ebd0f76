//! System prompt and user-turn assembly.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, NaiveDate};
use deskpilot_config::AgentConfig;
use deskpilot_core::memory::MemorySnippet;
use deskpilot_core::message::Turn;

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff"];
const IMAGE_KEYWORDS: [&str; 5] = ["image", "screenshot", "photo", "picture", "uploaded"];
const INLINE_FILE_CHARS: usize = 3000;
const MEMORY_PROMPT_CHARS: usize = 200;
const MEMORY_DISPLAY_CHARS: usize = 120;
const MEMORY_DISPLAY_COUNT: usize = 3;

/// Everything the system prompt mentions about the current environment.
pub struct PromptEnv<'a> {
    pub model: &'a str,
    pub today: NaiveDate,
    pub home: &'a str,
    /// One `- name: description usage` line per tool
    pub catalog: &'a str,
    /// Active goals to keep in view, oldest first
    pub goals: &'a [String],
}

pub fn system_prompt(agent: &AgentConfig, env: &PromptEnv<'_>) -> String {
    let name = &agent.agent_name;
    let user = &agent.user_name;
    let year = env.today.year();
    format!(
        "You are {name}, {user}'s desktop agent running on **{model}**.
Today is **{today}**. The current year is **{year}**.
{user}'s home directory is **{home}**. Always use full, correct paths.

RULES:
1. Never open with refusal language. If a capability is missing, propose and attempt an alternative.
2. After writing ANY file, verify it exists with read_file or terminal_command before saying it was created.
3. Always use the matching tool: add_task for tasks, search_memory for recall, check_service_status before claiming a service is up, list_ollama_models before naming installed models, add_calendar_event for reminders.
4. Never claim success without tool output that proves it. Report errors honestly, with the raw output.
5. If the same approach fails 3 times, stop, explain what went wrong to {user}, and suggest alternatives.
6. When asked about earlier mistakes, use check_past_failures and admit them openly.
7. Do only what is asked.

AVAILABLE TOOLS:
{catalog}

TO USE A TOOL:
Thought: [reasoning]
Action: [tool_name]
Action Input: {{\"param\": \"value\"}}

After the Observation, continue or give the final answer (no Action/Action Input = done).{goals}",
        model = env.model,
        today = env.today.format("%Y-%m-%d"),
        home = env.home,
        catalog = env.catalog,
        goals = goal_section(env.goals),
    )
}

fn goal_section(goals: &[String]) -> String {
    if goals.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = goals.iter().map(|g| format!("- {g}")).collect();
    format!("\n\nACTIVE GOALS:\n{}", lines.join("\n"))
}

/// Whether `model` belongs to one of the image-capable `families`.
pub fn is_vision_model(model: &str, families: &[String]) -> bool {
    let model = model.to_lowercase();
    families.iter().any(|family| model.contains(&family.to_lowercase()))
}

/// The `[Memory] ...` system turn injected ahead of the history.
pub fn memory_turn(snippets: &[MemorySnippet]) -> Option<Turn> {
    if snippets.is_empty() {
        return None;
    }
    let lines: Vec<String> = snippets
        .iter()
        .map(|s| format!("[Memory] {}", take_chars(&s.content, MEMORY_PROMPT_CHARS)))
        .collect();
    Some(Turn::system(format!("Relevant memories:\n{}", lines.join("\n"))))
}

/// The collapsed "Relevant Memories" block shown at the top of a transcript.
pub fn memory_block(snippets: &[MemorySnippet]) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    let items: Vec<String> = snippets
        .iter()
        .take(MEMORY_DISPLAY_COUNT)
        .map(|s| format!("- {}", take_chars(&s.content, MEMORY_DISPLAY_CHARS)))
        .collect();
    format!(
        "<details>\n<summary>Relevant Memories</summary>\n\n{}\n</details>\n\n",
        items.join("\n")
    )
}

/// A user message with its attachments folded in.
#[derive(Debug, Default, PartialEq)]
pub struct UserInput {
    pub text: String,
    /// Base64-encoded images, only populated for vision models
    pub images: Vec<String>,
}

impl UserInput {
    pub fn into_turn(self) -> Turn {
        Turn::user(self.text).with_images(self.images)
    }
}

/// Read `attachments` and fold them into `message`.
///
/// Images are base64-encoded for vision models and noted otherwise. Other
/// files are inlined up to a fixed length. A message that talks about an
/// image without attaching anything gets a note saying so.
pub async fn prepare_input(
    message: &str,
    attachments: &[PathBuf],
    model: &str,
    vision_families: &[String],
) -> UserInput {
    let mut text = message.to_string();

    if attachments.is_empty() {
        let lower = message.to_lowercase();
        if IMAGE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            text.push_str(
                "\n\n[SYSTEM NOTE: No image/file was actually received with this message. \
                 If the user claims to have uploaded something, ask them to re-upload or provide the file path.]",
            );
        }
        return UserInput { text, images: Vec::new() };
    }

    let vision = is_vision_model(model, vision_families);
    let mut images = Vec::new();
    let mut notes = Vec::new();
    for path in attachments {
        let name = file_name(path);
        if is_image(path) {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    images.push(STANDARD.encode(bytes));
                    notes.push(format!("[Image uploaded: {name}]"));
                }
                Err(e) => notes.push(format!("[Image read error: {e}]")),
            }
            if !vision {
                notes.push(format!(
                    "[Note: Current model {model} may not support vision. Switch to a vision model for image analysis.]"
                ));
            }
        } else {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => notes.push(format!(
                    "[File uploaded: {name}]\nContent:\n{}",
                    take_chars(&content, INLINE_FILE_CHARS)
                )),
                Err(_) => notes.push(format!("[File uploaded: {name} (binary, cannot display)]")),
            }
        }
    }

    if !notes.is_empty() {
        text.push_str("\n\n");
        text.push_str(&notes.join("\n"));
    }
    if !vision {
        images.clear();
    }
    UserInput { text, images }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn take_chars(text: &str, max: usize) -> &str {
    deskpilot_tools::truncate_chars(text, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_config::ModelConfig;

    fn env<'a>(catalog: &'a str) -> PromptEnv<'a> {
        PromptEnv {
            model: "qwen3:30b",
            today: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            home: "/home/sam",
            catalog,
            goals: &[],
        }
    }

    #[test]
    fn prompt_names_model_date_and_tools() {
        let agent = AgentConfig::default();
        let prompt = system_prompt(&agent, &env("- read_file: Read a file. {\"path\": \"...\"}"));
        assert!(prompt.contains("**qwen3:30b**"));
        assert!(prompt.contains("Today is **2026-03-01**"));
        assert!(prompt.contains("year is **2026**"));
        assert!(prompt.contains("/home/sam"));
        assert!(prompt.contains("- read_file: Read a file."));
        assert!(prompt.contains("Action Input: {\"param\": \"value\"}"));
        assert!(!prompt.contains("ACTIVE GOALS"));
    }

    #[test]
    fn goals_close_the_prompt() {
        let goals = vec!["ship v1".to_string(), "learn Rust".to_string()];
        let prompt = system_prompt(
            &AgentConfig::default(),
            &PromptEnv {
                goals: &goals,
                ..env("")
            },
        );
        assert!(prompt.ends_with("(no Action/Action Input = done).\n\nACTIVE GOALS:\n- ship v1\n- learn Rust"));
    }

    #[test]
    fn vision_detection_uses_families() {
        let families = ModelConfig::default().vision_models;
        assert!(is_vision_model("gemma3:12b", &families));
        assert!(is_vision_model("LLaVA:7b", &families));
        assert!(!is_vision_model("qwen3:30b", &families));
    }

    #[test]
    fn memory_turn_and_block() {
        let snippets: Vec<MemorySnippet> = (0..4)
            .map(|i| MemorySnippet {
                content: format!("fact {i}"),
                score: 1.0,
                metadata: Default::default(),
            })
            .collect();

        let turn = memory_turn(&snippets).unwrap();
        assert_eq!(turn.content, "Relevant memories:\n[Memory] fact 0\n[Memory] fact 1\n[Memory] fact 2\n[Memory] fact 3");

        let block = memory_block(&snippets);
        assert!(block.contains("- fact 2"));
        assert!(!block.contains("fact 3"));
        assert!(memory_turn(&[]).is_none());
        assert_eq!(memory_block(&[]), "");
    }

    #[tokio::test]
    async fn text_attachments_are_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "alpha beta").unwrap();

        let input = prepare_input("summarize this", &[path], "qwen3:30b", &[]).await;
        assert_eq!(input.text, "summarize this\n\n[File uploaded: notes.txt]\nContent:\nalpha beta");
        assert!(input.images.is_empty());
    }

    #[tokio::test]
    async fn images_go_to_vision_models_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.PNG");
        std::fs::write(&path, b"hello").unwrap();
        let families = ModelConfig::default().vision_models;

        let input = prepare_input("what is this", &[path.clone()], "gemma3:12b", &families).await;
        assert_eq!(input.images, vec!["aGVsbG8=".to_string()]);
        assert!(input.text.ends_with("[Image uploaded: shot.PNG]"));

        let input = prepare_input("what is this", &[path], "qwen3:30b", &families).await;
        assert!(input.images.is_empty());
        assert!(input.text.contains("may not support vision"));
    }

    #[tokio::test]
    async fn mentioned_but_missing_image_is_flagged() {
        let input = prepare_input("Look at the screenshot I sent", &[], "qwen3:30b", &[]).await;
        assert!(input.text.contains("[SYSTEM NOTE: No image/file was actually received"));

        let input = prepare_input("hello", &[], "qwen3:30b", &[]).await;
        assert_eq!(input.text, "hello");
    }
}
