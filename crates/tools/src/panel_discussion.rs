//! `panel_discussion`: put one topic to several local models over a few
//! rounds, then have the primary model write the consensus.

use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::{ToolHandler, param_str, param_u64};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::dispatcher::truncate_chars;
use crate::subagent::{ask, installed_models, is_chat_model, resolve_model};

const MAX_ROUNDS: u64 = 3;
const AUTO_PANELISTS: usize = 2;
const CONTEXT_CHARS: usize = 300;
const REPORT_CHARS: usize = 600;
const SYNTHESIS_INPUT_CHARS: usize = 400;
const CONSENSUS_CHARS: usize = 500;

pub struct PanelDiscussionTool {
    runtime: Arc<dyn Provider>,
}

impl PanelDiscussionTool {
    pub fn new(runtime: Arc<dyn Provider>) -> Self {
        Self { runtime }
    }

    /// The requested models that are installed, or the primary model plus
    /// up to two other chat models when fewer than two were named.
    fn pick_panel(&self, available: &[String], requested: &[String]) -> Vec<String> {
        let mut panel: Vec<String> = Vec::new();
        for wanted in requested {
            if let Some(model) = resolve_model(available, wanted) {
                if !panel.contains(&model) {
                    panel.push(model);
                }
            }
        }
        if panel.len() >= 2 {
            return panel;
        }

        let primary = self.runtime.model().to_string();
        let mut panel = vec![primary.clone()];
        panel.extend(
            available
                .iter()
                .filter(|m| is_chat_model(m) && **m != primary)
                .take(AUTO_PANELISTS)
                .cloned(),
        );
        panel
    }
}

#[async_trait]
impl ToolHandler for PanelDiscussionTool {
    fn name(&self) -> &str {
        "panel_discussion"
    }

    fn description(&self) -> &str {
        "Multi-model debate: put a topic to 2-3 local models over several rounds and synthesize a consensus."
    }

    fn usage(&self) -> &str {
        r#"{"topic": "question or topic", "models": ["model1", "model2"], "rounds": 2}"#
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<String, ToolError> {
        let topic = param_str(params, "topic", "").trim();
        if topic.is_empty() {
            return Err(ToolError::InvalidArguments("Missing 'topic' argument".into()));
        }
        let rounds = param_u64(params, "rounds").unwrap_or(2).clamp(1, MAX_ROUNDS);
        let requested: Vec<String> = params
            .get("models")
            .and_then(|v| v.as_array())
            .map(|models| models.iter().filter_map(|m| m.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let available = installed_models(self.runtime.as_ref(), self.name()).await?;
        if available.iter().filter(|m| is_chat_model(m)).count() < 2 {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "Need at least 2 local models for a panel discussion. Pull more models first.".into(),
            });
        }
        let panel = self.pick_panel(&available, &requested);
        if panel.len() < 2 {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Need at least 2 models. Only found: {}", panel.join(", ")),
            });
        }
        debug!(topic = %topic, panel = ?panel, rounds, "Starting panel discussion");

        // Latest answer per panelist, in panel order
        let mut answers: Vec<(String, String)> = Vec::new();
        for round in 1..=rounds {
            let prompt = if round == 1 {
                topic.to_string()
            } else {
                let previous: Vec<String> = answers
                    .iter()
                    .map(|(model, answer)| format!("- {model}: {}", truncate_chars(answer, CONTEXT_CHARS)))
                    .collect();
                format!(
                    "Topic: {topic}\n\nPrevious responses from other models:\n{}\n\nRound {round}: Respond to the above. \
                     Challenge weak points, build on strong ones, and move toward consensus.",
                    previous.join("\n")
                )
            };

            let mut this_round = Vec::with_capacity(panel.len());
            for model in &panel {
                let answer = match ask(self.runtime.as_ref(), model, prompt.clone()).await {
                    Ok(answer) if !answer.is_empty() => answer,
                    Ok(_) => "(no response)".to_string(),
                    Err(e) => {
                        warn!(model = %model, round, error = %e, "Panelist failed");
                        format!("(error: {e})")
                    }
                };
                this_round.push((model.clone(), answer));
            }
            answers = this_round;
        }

        let mut lines = vec![
            format!("## Panel Discussion: {topic}"),
            format!("**Models**: {}", panel.join(", ")),
            format!("**Rounds**: {rounds}"),
            String::new(),
        ];
        for (model, answer) in &answers {
            lines.push(format!("### {model}"));
            lines.push(truncate_chars(answer, REPORT_CHARS).to_string());
            lines.push(String::new());
        }

        let positions: Vec<String> = answers
            .iter()
            .map(|(model, answer)| format!("**{model}**: {}", truncate_chars(answer, SYNTHESIS_INPUT_CHARS)))
            .collect();
        let synthesis = format!(
            "Based on these model responses about '{topic}':\n\n{}\n\nSynthesize a brief consensus (3-5 sentences). \
             Note agreements and key disagreements.",
            positions.join("\n")
        );
        lines.push("### Consensus".into());
        match ask(self.runtime.as_ref(), self.runtime.model(), synthesis).await {
            Ok(consensus) if !consensus.is_empty() => lines.push(truncate_chars(&consensus, CONSENSUS_CHARS).to_string()),
            Ok(_) => lines.push("(no consensus)".into()),
            Err(e) => {
                warn!(error = %e, "Panel synthesis failed");
                lines.push("(Synthesis failed; see the individual responses above)".into());
            }
        }

        Ok(lines.join("\n"))
    }
}
