//! `model_chain`: run prompts through a pipeline of models, each step able
//! to quote the previous step's output as `{prev}`.

use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::{ToolHandler, param_str};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::dispatcher::truncate_chars;
use crate::subagent::{ask, installed_models, resolve_model};

const PREV_PLACEHOLDER: &str = "{prev}";
const PREV_CHARS: usize = 1500;
const PROMPT_ECHO_CHARS: usize = 100;
const OUTPUT_CHARS: usize = 500;

pub struct ModelChainTool {
    runtime: Arc<dyn Provider>,
}

impl ModelChainTool {
    pub fn new(runtime: Arc<dyn Provider>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl ToolHandler for ModelChainTool {
    fn name(&self) -> &str {
        "model_chain"
    }

    fn description(&self) -> &str {
        "Chain models in a pipeline; each step's output replaces {prev} in the next step's prompt."
    }

    fn usage(&self) -> &str {
        r#"{"steps": [{"model": "qwen3:8b", "prompt": "Summarize: ..."}, {"model": "qwen3:30b", "prompt": "Expand on: {prev}"}]}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let steps = match params.get("steps").and_then(|v| v.as_array()) {
            Some(steps) if !steps.is_empty() => steps,
            _ => {
                return Err(ToolError::InvalidArguments(
                    "Missing 'steps': a list of {\"model\", \"prompt\"} objects".into(),
                ));
            }
        };

        let available = installed_models(self.runtime.as_ref(), self.name()).await?;
        let mut sections = Vec::with_capacity(steps.len());
        let mut prev = String::new();

        for (i, step) in steps.iter().enumerate() {
            let n = i + 1;
            let empty = Map::new();
            let step = step.as_object().unwrap_or(&empty);
            let wanted = param_str(step, "model", self.runtime.model());
            let mut prompt = param_str(step, "prompt", "").to_string();
            if !prev.is_empty() {
                prompt = prompt.replace(PREV_PLACEHOLDER, truncate_chars(&prev, PREV_CHARS));
            }

            if prompt.trim().is_empty() {
                sections.push(format!("Step {n}: (empty prompt, skipped)"));
                continue;
            }
            let Some(model) = resolve_model(&available, wanted) else {
                sections.push(format!("Step {n} ({wanted}): Model not available"));
                continue;
            };

            debug!(step = n, model = %model, "Running chain step");
            match ask(self.runtime.as_ref(), &model, prompt.clone()).await {
                Ok(answer) => {
                    sections.push(format!(
                        "### Step {n}: {model}\n**Prompt**: {}...\n**Output**: {}",
                        truncate_chars(&prompt, PROMPT_ECHO_CHARS),
                        truncate_chars(&answer, OUTPUT_CHARS)
                    ));
                    prev = answer;
                }
                Err(e) => {
                    warn!(step = n, model = %model, error = %e, "Chain step failed");
                    sections.push(format!("Step {n} ({model}): Error: {e}"));
                    prev = format!("(error in step {n})");
                }
            }
        }

        Ok(format!(
            "## Model Chain Pipeline ({} steps)\n\n{}",
            steps.len(),
            sections.join("\n\n")
        ))
    }
}
