//! The ReAct loop controller.
//!
//! One [`ReactController::run`] call is one agent turn:
//!
//! 1. recall memory, fold attachments into the user message, build the prompt
//! 2. per step: drain the interrupt slot, stream the model, stop on a repeated
//!    step, cut any observation the model wrote itself, parse for a tool call
//! 3. dispatch the call and feed the observation back, or stop on a final answer
//! 4. retry once with a stripped-down context if the answer came back empty
//! 5. rewrite refusals, append lessons learned, save memory and history
//!
//! Between runs the carried history and active goals can be saved as a named
//! branch and restored later.
//!
//! Callers receive accumulated transcript snapshots (not deltas). Every
//! failure ends up in the transcript as text; there is no separate error path.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use deskpilot_config::{AgentConfig, AppConfig, JournalConfig, ModelConfig, SessionConfig};
use deskpilot_core::error::GatewayError;
use deskpilot_core::memory::Memory;
use deskpilot_core::message::{Turn, trim_history};
use deskpilot_core::provider::{ChatRequest, Provider};
use deskpilot_providers::OBSERVATION_MARKER;
use deskpilot_security::path::home_dir;
use deskpilot_security::{EntryKind, Journal};
use deskpilot_tools::{GoalBoard, ToolDispatcher, truncate_chars};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::branches::{Branch, BranchError, BranchStore, BranchSummary};
use crate::mailbox::Mailbox;
use crate::parser::parse_tool_call;
use crate::postprocess;
use crate::prompt::{self, PromptEnv};

const SNAPSHOT_BUFFER: usize = 64;
const RECENT_STEPS: usize = 3;
const STRIKE_LIMIT: usize = 3;
const FALLBACK_HISTORY: usize = 4;
/// Answers shorter than this (tool blocks removed) count as empty.
const MIN_ANSWER_CHARS: usize = 5;
const HEADER_PARAM_CHARS: usize = 200;
const SIGNATURE_PARAM_CHARS: usize = 100;

const LOOP_TOOL: &str = "react_loop";
const LOOP_NOTICE: &str =
    "\n\n**[Agent detected a loop. Stopping and summarizing what was accomplished so far.]**\n";
const EMPTY_NOTICE: &str = "\n\n**[No answer from the model, even after retrying with a simplified context. \
Try rephrasing the request or switching models.]**\n";

/// Why the step loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A step carried no tool call.
    Answered,
    /// The step budget ran out.
    Exhausted,
    /// Two consecutive steps were the same.
    Looped,
    /// The model gateway returned an error.
    GatewayFailed,
}

/// The end state of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The full user-visible transcript (the last snapshot)
    pub transcript: String,
    /// The final answer as saved to history
    pub answer: String,
    pub stop: StopReason,
    /// Whether the simplified-context retry ran
    pub retried: bool,
}

/// Accumulated transcript plus the optional snapshot channel.
struct Transcript {
    text: String,
    tx: Option<mpsc::Sender<String>>,
}

impl Transcript {
    fn new(tx: Option<mpsc::Sender<String>>) -> Self {
        Self {
            text: String::new(),
            tx,
        }
    }

    async fn push(&mut self, s: &str) {
        self.text.push_str(s);
        self.emit().await;
    }

    async fn emit(&self) {
        if let Some(tx) = &self.tx {
            // A dropped receiver does not stop the run; memory and history still commit.
            let _ = tx.send(self.text.clone()).await;
        }
    }
}

pub struct ReactController {
    gateway: Arc<dyn Provider>,
    dispatcher: Arc<ToolDispatcher>,
    memory: Arc<dyn Memory>,
    journal: Arc<Journal>,
    mailbox: Arc<Mailbox>,
    agent: AgentConfig,
    vision_models: Vec<String>,
    healing_window: usize,
    healing_threshold: usize,
    goals: Arc<GoalBoard>,
    prompt_goals: usize,
    retry_goals: usize,
    branches: Arc<BranchStore>,
    /// Turns carried between runs
    history: Mutex<Vec<Turn>>,
}

impl ReactController {
    /// The journal is the dispatcher's, so tool outcomes and loop events share one log.
    pub fn new(gateway: Arc<dyn Provider>, dispatcher: Arc<ToolDispatcher>, memory: Arc<dyn Memory>) -> Self {
        let journal_defaults = JournalConfig::default();
        let session_defaults = SessionConfig::default();
        Self {
            journal: Arc::clone(dispatcher.journal()),
            gateway,
            dispatcher,
            memory,
            mailbox: Arc::new(Mailbox::new()),
            agent: AgentConfig::default(),
            vision_models: ModelConfig::default().vision_models,
            healing_window: journal_defaults.healing_window,
            healing_threshold: journal_defaults.healing_threshold,
            goals: Arc::new(GoalBoard::in_memory()),
            prompt_goals: session_defaults.prompt_goals,
            retry_goals: session_defaults.retry_goals,
            branches: Arc::new(BranchStore::in_memory()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        gateway: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        memory: Arc<dyn Memory>,
    ) -> Self {
        let mut controller = Self::new(gateway, dispatcher, memory).with_agent_config(config.agent.clone());
        controller.vision_models = config.model.vision_models.clone();
        controller.healing_window = config.journal.healing_window;
        controller.healing_threshold = config.journal.healing_threshold;
        controller.prompt_goals = config.session.prompt_goals;
        controller.retry_goals = config.session.retry_goals;
        controller
    }

    pub fn with_agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    /// Share a mailbox with whoever delivers interrupts (a UI, a chat bridge).
    pub fn with_mailbox(mut self, mailbox: Arc<Mailbox>) -> Self {
        self.mailbox = mailbox;
        self
    }

    /// Share the goal board the `set_goal`/`complete_goal` tools write to.
    pub fn with_goals(mut self, goals: Arc<GoalBoard>) -> Self {
        self.goals = goals;
        self
    }

    pub fn with_branches(mut self, branches: Arc<BranchStore>) -> Self {
        self.branches = branches;
        self
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    /// Save the carried history and active goals as a branch. Without a
    /// name the branch is called `branch_HHMMSS`.
    pub async fn branch(&self, name: Option<&str>) -> Result<BranchSummary, BranchError> {
        let id = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("branch_{}", Local::now().format("%H%M%S")),
        };
        let branch = Branch {
            id,
            created_at: Utc::now(),
            history: self.history.lock().await.clone(),
            goals: self.goals.active().await,
            model: self.gateway.model().to_string(),
        };
        let summary = self.branches.save(branch).await?;
        info!(branch = %summary.id, messages = summary.messages, "Saved conversation branch");
        Ok(summary)
    }

    pub async fn list_branches(&self) -> Vec<BranchSummary> {
        self.branches.list().await
    }

    /// Replace the carried history and active goals with a saved branch.
    /// Returns `false` when no branch has that id.
    pub async fn restore_branch(&self, id: &str) -> Result<bool, BranchError> {
        let Some(branch) = self.branches.get(id).await else {
            return Ok(false);
        };
        if !branch.model.is_empty() && branch.model != self.gateway.model() {
            warn!(
                branch = %branch.id,
                saved_model = %branch.model,
                current_model = %self.gateway.model(),
                "Restoring a branch saved on another model"
            );
        }
        self.goals.replace(branch.goals).await?;
        *self.history.lock().await = branch.history;
        info!(branch = %id, "Restored conversation branch");
        Ok(true)
    }

    pub async fn delete_branch(&self, id: &str) -> Result<bool, BranchError> {
        self.branches.delete(id).await
    }

    /// Start a run in the background and return its snapshot stream.
    ///
    /// The channel closes after the final snapshot.
    pub fn run(self: &Arc<Self>, message: impl Into<String>, attachments: Vec<PathBuf>) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let controller = Arc::clone(self);
        let message = message.into();
        tokio::spawn(async move {
            controller.execute(&message, &attachments, Some(tx)).await;
        });
        rx
    }

    /// Run to completion without streaming.
    pub async fn respond(&self, message: &str, attachments: &[PathBuf]) -> RunOutcome {
        self.execute(message, attachments, None).await
    }

    async fn execute(&self, message: &str, attachments: &[PathBuf], tx: Option<mpsc::Sender<String>>) -> RunOutcome {
        self.mailbox.set_working(true);
        let outcome = self.drive(message, attachments, Transcript::new(tx)).await;
        self.mailbox.set_working(false);
        self.check_self_healing();
        info!(stop = ?outcome.stop, retried = outcome.retried, "Run finished");
        outcome
    }

    async fn drive(&self, message: &str, attachments: &[PathBuf], mut transcript: Transcript) -> RunOutcome {
        let agent = &self.agent;
        let model = self.gateway.model().to_string();
        self.journal.set_model(model.clone());

        let snippets = match self.memory.search(message, agent.memory_snippets).await {
            Ok(snippets) => snippets,
            Err(e) => {
                warn!(error = %e, "Memory recall failed");
                Vec::new()
            }
        };
        if let Err(e) = self.memory.save("user", message).await {
            warn!(error = %e, "Failed to save user message to memory");
        }

        let memory_block = prompt::memory_block(&snippets);
        if !memory_block.is_empty() {
            transcript.push(&memory_block).await;
        }

        let input = prompt::prepare_input(message, attachments, &model, &self.vision_models).await;
        let user_text = input.text.clone();
        let goals = self.goals.recent(self.prompt_goals).await;
        let system = self.system_prompt(&model, &goals);
        let history = self.history.lock().await.clone();

        let mut messages = vec![Turn::system(system)];
        messages.extend(prompt::memory_turn(&snippets));
        messages.extend_from_slice(recent(&history, agent.history_window));
        messages.push(input.into_turn());

        let mut final_text = String::new();
        let mut stop = StopReason::Exhausted;
        let mut recent_steps: VecDeque<String> = VecDeque::with_capacity(RECENT_STEPS + 1);
        let mut failed_signatures: Vec<String> = Vec::new();
        let mut failed_tools: Vec<String> = Vec::new();

        for step in 1..=agent.max_react_steps {
            if let Some(interrupt) = self.mailbox.take_interrupt() {
                info!(step, "Interrupt received");
                transcript
                    .push(&format!(
                        "\n\n---\n**[Interrupt from {}]:** {interrupt}\n---\n\n",
                        agent.user_name
                    ))
                    .await;
                messages.push(Turn::user(format!(
                    "[INTERRUPT FROM {}]: {interrupt}",
                    agent.user_name.to_uppercase()
                )));
            }

            let step_start = transcript.text.len();
            let mut step_text = match self.stream_step(messages.clone(), &mut transcript).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(step, error = %e, "Model gateway failed");
                    transcript.push(&e.user_message()).await;
                    stop = StopReason::GatewayFailed;
                    break;
                }
            };

            let normalized: String = step_text.trim().chars().take(agent.repetition_prefix_chars).collect();
            if normalized.chars().count() >= agent.repetition_min_chars
                && recent_steps.back() == Some(&normalized)
            {
                warn!(step, "Model is repeating itself; stopping the loop");
                self.journal.record(
                    EntryKind::Failure,
                    LOOP_TOOL,
                    format!("Repetition detected at step {step}: model stuck repeating same action"),
                    "",
                    "Break repetition loops early and try simplified context",
                );
                transcript.push(LOOP_NOTICE).await;
                final_text = step_text;
                stop = StopReason::Looped;
                break;
            }
            recent_steps.push_back(normalized);
            if recent_steps.len() > RECENT_STEPS {
                recent_steps.pop_front();
            }

            if let Some(pos) = step_text.find(OBSERVATION_MARKER) {
                warn!(step, "Model wrote its own observation; truncating the step");
                transcript.text.truncate(step_start + pos);
                transcript.emit().await;
                step_text.truncate(pos);
                step_text.truncate(step_text.trim_end().len());
            }

            let Some(call) = parse_tool_call(&step_text) else {
                final_text = step_text;
                stop = StopReason::Answered;
                break;
            };

            let params_json = serde_json::to_string(&call.params).unwrap_or_else(|_| "{}".into());
            transcript
                .push(&format!(
                    "\n\n<details open>\n<summary>` {}({})`</summary>\n\n",
                    call.tool,
                    truncate_chars(&params_json, HEADER_PARAM_CHARS)
                ))
                .await;

            debug!(step, tool = %call.tool, "Dispatching tool call");
            let outcome = self.dispatcher.dispatch(&call.tool, &call.params).await;
            if (outcome.failed_attempts > 0 || !outcome.succeeded) && !failed_tools.contains(&call.tool) {
                failed_tools.push(call.tool.clone());
            }

            let mut observation = outcome.text;
            if !outcome.succeeded {
                failed_signatures.push(format!(
                    "{}:{}",
                    call.tool,
                    truncate_chars(&params_json, SIGNATURE_PARAM_CHARS)
                ));
                if failed_signatures.len() >= STRIKE_LIMIT {
                    observation.push_str(&format!(
                        "\n\n[SYSTEM: You have failed {STRIKE_LIMIT} times. STOP and consider a completely \
                         different approach. Tell {} what went wrong and suggest alternatives.]",
                        agent.user_name
                    ));
                }
            }

            transcript
                .push(&format!(
                    "```\n{}\n```\n</details>\n\n",
                    truncate_chars(&observation, agent.observation_display_chars)
                ))
                .await;
            messages.push(Turn::assistant(step_text.clone()));
            messages.push(Turn::user(format!("Observation: {observation}")));
            final_text = step_text;
        }

        let mut retried = false;
        if stop != StopReason::GatewayFailed
            && postprocess::strip_details(&final_text).chars().count() < MIN_ANSWER_CHARS
        {
            retried = true;
            let retry_goals = self.goals.recent(self.retry_goals).await;
            let retry_system = self.system_prompt(&model, &retry_goals);
            final_text = self
                .simplified_retry(retry_system, &history, user_text.clone(), &mut transcript)
                .await;
        } else if stop == StopReason::Exhausted {
            transcript.text.push_str(&format!(
                "\n\n**[Step limit reached after {} steps. Stopping here; ask me to continue if there is more to do.]**\n",
                agent.max_react_steps
            ));
        }

        transcript.text = postprocess::filter_refusals(&transcript.text);
        let mut answer = postprocess::filter_refusals(&final_text);

        let lessons = postprocess::lessons_line(&failed_tools);
        if !lessons.is_empty() {
            transcript.text.push_str(&lessons);
            answer.push_str(&lessons);
            let summary = lessons.trim().trim_start_matches("**Lessons Learned:**").trim();
            for tool in &failed_tools {
                self.journal
                    .record_lesson(tool, format!("Task completed with errors in {tool}"), summary);
            }
        }
        transcript.emit().await;

        self.commit(user_text, &answer).await;

        RunOutcome {
            transcript: transcript.text,
            answer,
            stop,
            retried,
        }
    }

    /// Stream one model response into the transcript, enforcing the per-step cap.
    async fn stream_step(&self, messages: Vec<Turn>, transcript: &mut Transcript) -> Result<String, GatewayError> {
        let request = ChatRequest::new(self.gateway.model(), messages);
        let mut rx = self.gateway.stream(request).await?;

        let mut step = String::new();
        let mut chars = 0usize;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if !chunk.content.is_empty() {
                chars += chunk.content.chars().count();
                step.push_str(&chunk.content);
                transcript.push(&chunk.content).await;
            }
            if chunk.done {
                break;
            }
            if chars > self.agent.max_step_chars {
                warn!(max_chars = self.agent.max_step_chars, "Step exceeded its character cap; stopping generation");
                break;
            }
        }
        Ok(step)
    }

    /// One retry with only the system prompt, a little history and the user
    /// message. No tools run; reasoning lines are stripped from the output.
    async fn simplified_retry(
        &self,
        system: String,
        history: &[Turn],
        user_text: String,
        transcript: &mut Transcript,
    ) -> String {
        warn!("Empty answer; retrying once with a simplified context");
        let mut messages = vec![Turn::system(system)];
        messages.extend_from_slice(recent(history, FALLBACK_HISTORY));
        messages.push(Turn::user(user_text));

        transcript.text.clear();
        let (raw, error) = match self.stream_step(messages, transcript).await {
            Ok(text) => (text, None),
            Err(e) => (String::new(), Some(e)),
        };

        let answer = postprocess::strip_tool_lines(&raw);
        transcript.text = answer.clone();
        if answer.chars().count() < MIN_ANSWER_CHARS {
            warn!("Simplified retry also came back empty");
            self.journal.record(
                EntryKind::Failure,
                LOOP_TOOL,
                "Empty response after simplified-context retry",
                error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "Simplify the request or switch to another model",
            );
            transcript.text.push_str(EMPTY_NOTICE);
            if let Some(e) = error {
                transcript.text.push_str(&e.user_message());
            }
        }
        transcript.emit().await;
        answer
    }

    /// Save the answer to memory and both turns to the carried history.
    async fn commit(&self, user_text: String, answer: &str) {
        let record = postprocess::memory_record(answer);
        if !record.is_empty() {
            if let Err(e) = self.memory.save("assistant", &record).await {
                warn!(error = %e, "Failed to save answer to memory");
            }
        }

        let mut history = self.history.lock().await;
        history.push(Turn::user(user_text));
        history.push(Turn::assistant(answer));
        trim_history(&mut history, self.agent.history_limit);
    }

    fn system_prompt(&self, model: &str, goals: &[String]) -> String {
        let home = home_dir().unwrap_or_else(|| "~".into());
        let catalog = self.dispatcher.registry().catalog();
        prompt::system_prompt(
            &self.agent,
            &PromptEnv {
                model,
                today: Local::now().date_naive(),
                home: &home,
                catalog: &catalog,
                goals,
            },
        )
    }

    /// Flag tools that keep failing across runs.
    fn check_self_healing(&self) {
        for pattern in self
            .journal
            .repeated_failures(self.healing_window, self.healing_threshold)
        {
            warn!(
                tool = %pattern.tool,
                count = pattern.count,
                last_error = %pattern.last_error,
                "Tool keeps failing; flagged for investigation"
            );
        }
    }
}

fn recent(history: &[Turn], n: usize) -> &[Turn] {
    &history[history.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BrokenTool, EchoTool, ScriptedGateway};
    use deskpilot_core::message::Role;
    use deskpilot_core::tool::{ToolHandler, ToolRegistry};
    use deskpilot_memory::{InMemoryBackend, NoopMemory};

    fn controller(
        gateway: &Arc<ScriptedGateway>,
        tools: Vec<Arc<dyn ToolHandler>>,
        agent: AgentConfig,
        memory: Arc<dyn Memory>,
    ) -> ReactController {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        let dispatcher = ToolDispatcher::new(registry, Arc::new(Journal::in_memory(200))).with_max_retries(1);
        ReactController::new(gateway.clone(), Arc::new(dispatcher), memory).with_agent_config(agent)
    }

    fn simple(gateway: &Arc<ScriptedGateway>, tools: Vec<Arc<dyn ToolHandler>>) -> ReactController {
        controller(gateway, tools, AgentConfig::default(), Arc::new(NoopMemory))
    }

    #[tokio::test]
    async fn direct_answer_ends_the_run() {
        let gateway = Arc::new(ScriptedGateway::steps(&["Paris is the capital of France."]));
        let controller = simple(&gateway, vec![]);

        let out = controller.respond("capital of France?", &[]).await;
        assert_eq!(out.stop, StopReason::Answered);
        assert_eq!(out.transcript, "Paris is the capital of France.");
        assert_eq!(out.answer, "Paris is the capital of France.");
        assert!(!out.retried);
        assert_eq!(gateway.call_count(), 1);

        let request = &gateway.requests()[0];
        assert_eq!(request.model, "scripted-model");
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages.last().unwrap().content, "capital of France?");
        assert_eq!(controller.history().await.len(), 2);
        assert!(!controller.mailbox().is_working());
    }

    #[tokio::test]
    async fn tool_step_feeds_observation_back() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Thought: check the list\nAction: list_tasks\nAction Input: {}",
            "You have no tasks.",
        ]));
        let tool = Arc::new(EchoTool::new("list_tasks", "No tasks in the task manager."));
        let controller = simple(&gateway, vec![tool.clone()]);

        let out = controller.respond("what is on my list?", &[]).await;
        assert_eq!(tool.calls(), 1);
        assert!(out.transcript.contains(
            "\n\n<details open>\n<summary>` list_tasks({})`</summary>\n\n```\nNo tasks in the task manager.\n```\n</details>\n\n"
        ));
        assert!(out.transcript.ends_with("You have no tasks."));

        let second = &gateway.requests()[1].messages;
        let n = second.len();
        assert_eq!(second[n - 2], Turn::assistant("Thought: check the list\nAction: list_tasks\nAction Input: {}"));
        assert_eq!(second[n - 1], Turn::user("Observation: No tasks in the task manager."));
    }

    #[tokio::test]
    async fn fabricated_observation_is_cut() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Action: list_tasks\nAction Input: {}\nObservation: 3 tasks due today",
            "Done.",
        ]));
        let tool = Arc::new(EchoTool::new("list_tasks", "No tasks in the task manager."));
        let controller = simple(&gateway, vec![tool.clone()]);

        let out = controller.respond("tasks?", &[]).await;
        assert!(!out.transcript.contains("3 tasks due today"));
        assert_eq!(tool.calls(), 1);
        let second = &gateway.requests()[1].messages;
        assert_eq!(second[second.len() - 2].content, "Action: list_tasks\nAction Input: {}");
    }

    #[tokio::test]
    async fn repeated_step_stops_without_running_the_tool() {
        let step = "Thought: I will look at the task list again\nAction: list_tasks\nAction Input: {}";
        let gateway = Arc::new(ScriptedGateway::steps(&[step, step, "never reached"]));
        let tool = Arc::new(EchoTool::new("list_tasks", "No tasks in the task manager."));
        let controller = simple(&gateway, vec![tool.clone()]);

        let out = controller.respond("tasks?", &[]).await;
        assert_eq!(out.stop, StopReason::Looped);
        assert_eq!(tool.calls(), 1);
        assert_eq!(gateway.call_count(), 2);
        assert!(out.transcript.contains("Agent detected a loop"));
        assert!(
            controller
                .journal()
                .recent_failures(Some("react_loop"), 10)
                .iter()
                .any(|e| e.what_happened.starts_with("Repetition detected at step 2"))
        );
    }

    #[tokio::test]
    async fn short_repeats_are_not_loops() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Action: list_tasks",
            "Action: list_tasks",
            "All done here.",
        ]));
        let tool = Arc::new(EchoTool::new("list_tasks", "none"));
        let controller = simple(&gateway, vec![tool.clone()]);

        let out = controller.respond("tasks?", &[]).await;
        assert_eq!(out.stop, StopReason::Answered);
        assert_eq!(tool.calls(), 2);
    }

    #[tokio::test]
    async fn interrupt_is_spliced_into_the_next_step() {
        let gateway = Arc::new(ScriptedGateway::steps(&["OK, using the Desktop."]));
        let controller = simple(&gateway, vec![]);
        controller.mailbox().send_interrupt("use the Desktop folder");

        let out = controller.respond("save the report", &[]).await;
        assert!(
            out.transcript
                .starts_with("\n\n---\n**[Interrupt from user]:** use the Desktop folder\n---\n\n")
        );
        let first = &gateway.requests()[0].messages;
        assert_eq!(first.last().unwrap().content, "[INTERRUPT FROM USER]: use the Desktop folder");
        assert_eq!(controller.mailbox().take_interrupt(), None);
    }

    #[tokio::test]
    async fn third_failure_escalates_and_lessons_are_added() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Action: open_app\nAction Input: {\"name\": \"a\"}",
            "Action: open_app\nAction Input: {\"name\": \"b\"}",
            "Action: open_app\nAction Input: {\"name\": \"c\"}",
            "It did not work.",
        ]));
        let controller = simple(&gateway, vec![Arc::new(BrokenTool::new("open_app"))]);

        let out = controller.respond("open the app", &[]).await;
        let requests = gateway.requests();
        let observation = |i: usize| requests[i].messages.last().unwrap().content.clone();
        assert!(observation(1).starts_with("Observation: Error (after 1 attempts)"));
        assert!(!observation(2).contains("[SYSTEM: You have failed 3 times"));
        assert!(observation(3).contains("[SYSTEM: You have failed 3 times"));

        let lessons = "\n**Lessons Learned:** Verify open_app output before claiming success.";
        assert!(out.answer.ends_with(lessons));
        assert!(out.transcript.ends_with(lessons));

        let lesson_entries: Vec<_> = controller
            .journal()
            .entries()
            .into_iter()
            .filter(|e| e.kind == EntryKind::Lesson)
            .collect();
        assert_eq!(lesson_entries.len(), 1);
        assert_eq!(lesson_entries[0].tool, "open_app");
        assert_eq!(lesson_entries[0].lesson, "Verify open_app output before claiming success.");
    }

    #[tokio::test]
    async fn empty_answer_retries_with_simplified_context() {
        let memory = Arc::new(InMemoryBackend::new());
        memory.save("user", "The user keeps files on the Desktop folder").await.unwrap();
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "",
            "Thought: answer directly\n\nYou keep them on the Desktop.",
        ]));
        let controller = controller(&gateway, vec![], AgentConfig::default(), memory);

        let out = controller.respond("where do I keep files on the desktop?", &[]).await;
        assert!(out.retried);
        assert_eq!(out.transcript, "You keep them on the Desktop.");
        assert_eq!(out.answer, "You keep them on the Desktop.");

        let requests = gateway.requests();
        assert!(requests[0].messages.iter().any(|t| t.content.starts_with("Relevant memories:")));
        assert_eq!(requests[1].messages.len(), 2);
        assert!(requests[1].messages.iter().all(|t| !t.content.contains("[Memory]")));
    }

    #[tokio::test]
    async fn empty_retry_is_a_visible_hard_failure() {
        let gateway = Arc::new(ScriptedGateway::steps(&[]));
        let controller = simple(&gateway, vec![]);

        let out = controller.respond("hello?", &[]).await;
        assert!(out.retried);
        assert_eq!(gateway.call_count(), 2);
        assert!(out.transcript.contains("No answer from the model"));
        assert!(
            controller
                .journal()
                .recent_failures(Some("react_loop"), 10)
                .iter()
                .any(|e| e.what_happened == "Empty response after simplified-context retry")
        );
    }

    #[tokio::test]
    async fn refusals_are_rewritten() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "I can't reach that site, but here is a cached copy.",
        ]));
        let controller = simple(&gateway, vec![]);

        let out = controller.respond("open the site", &[]).await;
        assert_eq!(out.answer, "I'll find a way to reach that site, but here is a cached copy.");
        assert_eq!(out.transcript, out.answer);
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Action: list_tasks\nAction Input: {\"page\": 1}",
            "Action: list_tasks\nAction Input: {\"page\": 2}",
            "never reached",
        ]));
        let tool = Arc::new(EchoTool::new("list_tasks", "none"));
        let agent = AgentConfig {
            max_react_steps: 2,
            ..AgentConfig::default()
        };
        let controller = controller(&gateway, vec![tool.clone()], agent, Arc::new(NoopMemory));

        let out = controller.respond("page through tasks", &[]).await;
        assert_eq!(out.stop, StopReason::Exhausted);
        assert_eq!(tool.calls(), 2);
        assert_eq!(gateway.call_count(), 2);
        assert!(out.transcript.contains("Step limit reached after 2 steps"));
    }

    #[tokio::test]
    async fn gateway_error_is_surfaced_without_retry() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::Unavailable {
            host: "http://localhost:11434".into(),
            reason: "connection refused".into(),
        })]));
        let controller = simple(&gateway, vec![]);

        let out = controller.respond("hi", &[]).await;
        assert_eq!(out.stop, StopReason::GatewayFailed);
        assert!(!out.retried);
        assert_eq!(gateway.call_count(), 1);
        assert!(out.transcript.contains("ollama serve"));
    }

    #[tokio::test]
    async fn runaway_step_is_capped() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(vec!["x".repeat(30); 10])]));
        let agent = AgentConfig {
            max_step_chars: 50,
            ..AgentConfig::default()
        };
        let controller = controller(&gateway, vec![], agent, Arc::new(NoopMemory));

        let out = controller.respond("go", &[]).await;
        assert_eq!(out.transcript, "x".repeat(60));
    }

    #[tokio::test]
    async fn long_observation_is_clipped_in_transcript_only() {
        let gateway = Arc::new(ScriptedGateway::steps(&[
            "Action: read_file\nAction Input: {}",
            "Done reading.",
        ]));
        let agent = AgentConfig {
            observation_display_chars: 10,
            ..AgentConfig::default()
        };
        let tool = Arc::new(EchoTool::new("read_file", "0123456789abcdef"));
        let controller = controller(&gateway, vec![tool], agent, Arc::new(NoopMemory));

        let out = controller.respond("read it", &[]).await;
        assert!(out.transcript.contains("```\n0123456789\n```"));
        let second = &gateway.requests()[1].messages;
        assert_eq!(second.last().unwrap().content, "Observation: 0123456789abcdef");
    }

    #[tokio::test]
    async fn memory_and_history_carry_across_runs() {
        let memory = Arc::new(InMemoryBackend::new());
        let gateway = Arc::new(ScriptedGateway::steps(&["Your meeting is at noon.", "It was at noon."]));
        let controller = controller(&gateway, vec![], AgentConfig::default(), memory.clone());

        controller.respond("when is my meeting?", &[]).await;
        controller.respond("remind me when it was", &[]).await;

        let second = &gateway.requests()[1].messages;
        assert!(second.iter().any(|t| t.role == Role::Assistant && t.content == "Your meeting is at noon."));
        assert_eq!(controller.history().await.len(), 4);
        assert_eq!(memory.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn run_streams_accumulated_snapshots() {
        let gateway = Arc::new(ScriptedGateway::new(vec![Ok(vec![
            "Hello there, ".into(),
            "how can I help?".into(),
        ])]));
        let controller = Arc::new(simple(&gateway, vec![]));

        let mut rx = controller.run("hi", Vec::new());
        let mut snapshots = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            snapshots.push(snapshot);
        }
        assert_eq!(snapshots[0], "Hello there, ");
        assert_eq!(snapshots.last().unwrap(), "Hello there, how can I help?");
    }

    #[tokio::test]
    async fn recent_goals_reach_the_prompt_and_fewer_reach_the_retry() {
        let goals = Arc::new(GoalBoard::in_memory());
        for goal in ["learn Rust", "ship v1", "fix the build", "write docs"] {
            goals.add(goal).await.unwrap();
        }
        let gateway = Arc::new(ScriptedGateway::steps(&["", "Working on the docs now."]));
        let controller = simple(&gateway, vec![]).with_goals(goals);

        let out = controller.respond("what next?", &[]).await;
        assert!(out.retried);

        let requests = gateway.requests();
        let first = &requests[0].messages[0].content;
        assert!(first.ends_with("ACTIVE GOALS:\n- ship v1\n- fix the build\n- write docs"));
        assert!(!first.contains("learn Rust"));
        let retry = &requests[1].messages[0].content;
        assert!(retry.ends_with("ACTIVE GOALS:\n- fix the build\n- write docs"));
    }

    #[tokio::test]
    async fn restoring_a_branch_rewinds_history_and_goals() {
        let goals = Arc::new(GoalBoard::in_memory());
        goals.add("ship v1").await.unwrap();
        let gateway = Arc::new(ScriptedGateway::steps(&["First answer.", "Second answer."]));
        let controller = simple(&gateway, vec![]).with_goals(goals.clone());

        controller.respond("first question", &[]).await;
        let saved = controller.branch(Some("before-detour")).await.unwrap();
        assert_eq!(saved.id, "before-detour");
        assert_eq!(saved.messages, 2);
        assert_eq!(saved.model, "scripted-model");

        controller.respond("second question", &[]).await;
        goals.add("detour").await.unwrap();
        assert_eq!(controller.history().await.len(), 4);

        assert!(controller.restore_branch("before-detour").await.unwrap());
        let history = controller.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Turn::assistant("First answer."));
        assert_eq!(goals.active().await, vec!["ship v1"]);

        assert!(!controller.restore_branch("missing").await.unwrap());
        assert_eq!(controller.list_branches().await.len(), 1);
        assert!(controller.delete_branch("before-detour").await.unwrap());
        assert!(controller.list_branches().await.is_empty());
    }

    #[tokio::test]
    async fn unnamed_branch_gets_a_time_based_id() {
        let gateway = Arc::new(ScriptedGateway::steps(&[]));
        let controller = simple(&gateway, vec![]);

        let saved = controller.branch(None).await.unwrap();
        assert!(saved.id.starts_with("branch_"));
        assert_eq!(saved.id.len(), "branch_".len() + 6);
        assert_eq!(saved.messages, 0);
    }
}
