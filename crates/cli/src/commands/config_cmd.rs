//! `deskpilot config`: show or initialize the configuration.

use std::path::Path;

use deskpilot_config::AppConfig;

use super::load_config;

pub fn run(init: bool) -> Result<(), Box<dyn std::error::Error>> {
    if init {
        let path = AppConfig::config_dir().join("config.toml");
        if write_default(&path)? {
            println!("  Wrote default config to {}", path.display());
        } else {
            println!("  Config already exists at {}", path.display());
        }
        return Ok(());
    }

    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Write the default config to `path` unless a file is already there.
fn write_default(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
