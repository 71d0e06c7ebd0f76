//! Built-in tools and the dispatcher that runs them.
//!
//! Tools give the agent the ability to act on the host: run shell commands,
//! read and write files, search the web, check local services, and manage
//! memory, tasks, goals, and the calendar. A few tools consult other models
//! themselves (panels, chains, research, debriefs). The [`ToolDispatcher`]
//! wraps every call in the same retry, cache, and journaling policy.

pub mod calendar;
pub mod daily_debrief;
pub mod deep_research;
pub mod dispatcher;
pub mod file_read;
pub mod file_write;
pub mod goals;
pub mod memory_search;
pub mod model_chain;
pub mod ollama_models;
pub mod panel_discussion;
pub mod past_failures;
pub mod service_status;
pub mod shell;
pub mod subagent;
pub mod tasks;
pub mod web_search;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use deskpilot_config::AppConfig;
use deskpilot_core::collab::{Scheduler, TaskManager};
use deskpilot_core::memory::Memory;
use deskpilot_core::provider::Provider;
use deskpilot_core::tool::ToolRegistry;
use deskpilot_security::{BannedPathGuard, Journal};

pub use calendar::Calendar;
pub use dispatcher::{DispatchOutcome, EMPTY_OUTPUT, ToolDispatcher, truncate_chars};
pub use goals::GoalBoard;
pub use shell::{CommandOutput, CommandRunner, ShellTool, SystemRunner};
pub use tasks::TaskBoard;

/// The collaborators the built-in tools act on.
#[derive(Clone)]
pub struct ToolContext {
    pub runtime: Arc<dyn Provider>,
    pub memory: Arc<dyn Memory>,
    pub tasks: Arc<dyn TaskManager>,
    pub scheduler: Arc<dyn Scheduler>,
    pub goals: Arc<GoalBoard>,
    pub journal: Arc<Journal>,
}

/// Create a registry with every built-in tool.
pub fn default_registry(config: &AppConfig, ctx: &ToolContext) -> ToolRegistry {
    let shell = ShellTool::new(BannedPathGuard::new(config.risk.banned_paths.as_slice()))
        .with_timeout(Duration::from_secs(config.tools.command_timeout_secs));
    registry_with_shell(config, ctx, shell)
}

/// Like [`default_registry`], with a caller-supplied shell tool.
pub fn registry_with_shell(config: &AppConfig, ctx: &ToolContext, shell: ShellTool) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(shell));
    registry.register(Arc::new(file_read::FileReadTool::with_limit(config.tools.read_limit_chars)));
    registry.register(Arc::new(file_write::FileWriteTool));
    let search = Arc::new(web_search::WebSearchTool::new());
    registry.register(search.clone());
    registry.register(Arc::new(service_status::ServiceStatusTool::new(ctx.runtime.clone())));
    registry.register(Arc::new(ollama_models::OllamaModelsTool::new(ctx.runtime.clone())));
    registry.register(Arc::new(memory_search::MemorySearchTool::new(ctx.memory.clone())));
    registry.register(Arc::new(tasks::AddTaskTool::new(ctx.tasks.clone())));
    registry.register(Arc::new(tasks::ListTasksTool::new(ctx.tasks.clone())));
    registry.register(Arc::new(calendar::AddCalendarEventTool::new(ctx.scheduler.clone())));
    registry.register(Arc::new(past_failures::PastFailuresTool::new(ctx.journal.clone())));
    registry.register(Arc::new(goals::SetGoalTool::new(ctx.goals.clone())));
    registry.register(Arc::new(goals::CompleteGoalTool::new(ctx.goals.clone())));
    registry.register(Arc::new(panel_discussion::PanelDiscussionTool::new(ctx.runtime.clone())));
    registry.register(Arc::new(model_chain::ModelChainTool::new(ctx.runtime.clone())));
    registry.register(Arc::new(deep_research::DeepResearchTool::new(ctx.runtime.clone(), search)));
    registry.register(Arc::new(daily_debrief::DailyDebriefTool::new(
        ctx.runtime.clone(),
        ctx.tasks.clone(),
        ctx.scheduler.clone(),
        ctx.goals.clone(),
        ctx.journal.clone(),
    )));
    registry
}

/// A dispatcher over [`default_registry`] configured from `config`.
pub fn default_dispatcher(config: &AppConfig, ctx: &ToolContext) -> ToolDispatcher {
    ToolDispatcher::new(default_registry(config, ctx), ctx.journal.clone())
        .with_max_retries(config.agent.max_tool_retries)
        .with_cache_ttl(Duration::from_secs(config.tools.cache_ttl_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_memory::InMemoryBackend;
    use test_helpers::StaticRuntime;

    fn context() -> ToolContext {
        ToolContext {
            runtime: Arc::new(StaticRuntime::online(&["qwen3:8b"])),
            memory: Arc::new(InMemoryBackend::new()),
            tasks: Arc::new(TaskBoard::new()),
            scheduler: Arc::new(Calendar::new()),
            goals: Arc::new(GoalBoard::in_memory()),
            journal: Arc::new(Journal::in_memory(200)),
        }
    }

    #[test]
    fn registry_has_every_builtin() {
        let registry = default_registry(&AppConfig::default(), &context());
        assert_eq!(
            registry.names(),
            vec![
                "add_calendar_event",
                "add_task",
                "check_past_failures",
                "check_service_status",
                "complete_goal",
                "daily_debrief",
                "deep_research",
                "list_ollama_models",
                "list_tasks",
                "model_chain",
                "panel_discussion",
                "read_file",
                "search_memory",
                "set_goal",
                "terminal_command",
                "web_search",
                "write_file",
            ]
        );
    }

    #[test]
    fn only_read_only_tools_are_cacheable() {
        let registry = default_registry(&AppConfig::default(), &context());
        let cacheable: Vec<&str> = registry
            .names()
            .into_iter()
            .filter(|name| registry.get(name).is_some_and(|t| t.cacheable()))
            .collect();
        assert_eq!(cacheable, vec!["check_service_status", "list_ollama_models"]);
    }

    #[tokio::test]
    async fn dispatcher_caches_model_listing() {
        let ctx = context();
        let dispatcher = default_dispatcher(&AppConfig::default(), &ctx);
        let params = serde_json::Map::new();
        let first = dispatcher.dispatch("list_ollama_models", &params).await;
        let second = dispatcher.dispatch("list_ollama_models", &params).await;
        assert!(first.succeeded && !first.cached);
        assert!(second.cached);
        assert_eq!(first.text, second.text);
        assert_eq!(ctx.journal.len(), 1);
    }
}
