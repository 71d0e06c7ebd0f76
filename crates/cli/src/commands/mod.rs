pub mod agent;
pub mod config_cmd;
pub mod journal;
pub mod risk;
pub mod status;

use std::sync::Arc;

use deskpilot_agent::BranchStore;
use deskpilot_config::AppConfig;
use deskpilot_core::memory::Memory;
use deskpilot_memory::{FileBackend, InMemoryBackend, NoopMemory};
use deskpilot_providers::{OllamaGateway, RequestGate};
use deskpilot_security::Journal;
use deskpilot_tools::GoalBoard;
use tracing::debug;

fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

fn open_journal(config: &AppConfig) -> Arc<Journal> {
    Arc::new(Journal::open(config.journal.resolved_path(), config.journal.max_entries))
}

fn build_gateway(config: &AppConfig) -> Result<Arc<OllamaGateway>, Box<dyn std::error::Error>> {
    let gateway = OllamaGateway::from_config(&config.model, RequestGate::new())
        .map_err(|e| format!("Failed to create model gateway: {e}"))?;
    Ok(Arc::new(gateway))
}

fn build_memory(config: &AppConfig) -> Arc<dyn Memory> {
    debug!(backend = %config.memory.backend, "Opening memory backend");
    match config.memory.backend.as_str() {
        "in_memory" => Arc::new(InMemoryBackend::new()),
        "none" => Arc::new(NoopMemory),
        _ => Arc::new(FileBackend::new(config.memory.resolved_path())),
    }
}

fn open_goals(config: &AppConfig) -> Arc<GoalBoard> {
    Arc::new(GoalBoard::open(config.session.resolved_goals_path()))
}

fn open_branches(config: &AppConfig) -> Arc<BranchStore> {
    Arc::new(BranchStore::open(config.session.resolved_branches_path()))
}
