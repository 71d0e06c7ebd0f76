//! `deskpilot status`: is the model runtime up, and what does it serve?

use deskpilot_config::AppConfig;
use deskpilot_core::provider::Provider;

use super::{build_gateway, load_config};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let gateway = build_gateway(&config)?;

    println!("DeskPilot Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Runtime:      {}", gateway.host());
    println!("  Model:        {}", config.model.model);
    println!("  Memory:       {}", config.memory.backend);
    println!("  Journal:      {}", config.journal.resolved_path().display());
    println!("  Max steps:    {}", config.agent.max_react_steps);

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  [ok] Config file found");
    } else {
        println!("\n  [!]  No config file, using defaults (`deskpilot config --init` writes one)");
    }

    if !gateway.health_check().await {
        println!("  [!]  Runtime not reachable. Start it with `ollama serve`.");
        return Ok(());
    }
    println!("  [ok] Runtime reachable");

    match gateway.list_models().await {
        Ok(models) if models.is_empty() => println!("  [!]  No models installed"),
        Ok(models) => {
            let configured = models.iter().any(|m| m.name == config.model.model);
            println!("\n  Installed models:");
            for model in &models {
                let mark = if model.name == config.model.model { "*" } else { " " };
                println!("   {mark} {} ({:.1} GB)", model.name, model.size_gb());
            }
            if !configured {
                println!("\n  [!]  Configured model {} is not installed", config.model.model);
            }
        }
        Err(e) => println!("  [!]  Could not list models: {e}"),
    }

    Ok(())
}
