//! DeskPilot CLI, the main entry point.
//!
//! Commands:
//! - `agent`    Interactive chat or single-message mode
//! - `risk`     Classify a shell command without running it
//! - `journal`  Inspect the failure journal
//! - `status`   Check the model runtime
//! - `config`   Show or initialize the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "deskpilot",
    about = "DeskPilot, a desktop agent for local models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Attach a file or image to the message
        #[arg(short, long = "attach", value_name = "FILE")]
        attachments: Vec<PathBuf>,
    },

    /// Show the risk tier of a shell command
    Risk {
        /// The command to classify
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Inspect the failure journal
    Journal {
        /// Only show failures
        #[arg(long)]
        failures: bool,

        /// Only show entries for this tool
        #[arg(long)]
        tool: Option<String>,

        /// How many entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Show tools that keep failing
        #[arg(long)]
        flagged: bool,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check the model runtime and list installed models
    Status,

    /// Print the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Agent { message, attachments } => commands::agent::run(message, attachments).await?,
        Commands::Risk { command } => commands::risk::run(&command.join(" "))?,
        Commands::Journal {
            failures,
            tool,
            limit,
            flagged,
            json,
        } => commands::journal::run(commands::journal::JournalQuery {
            failures,
            tool,
            limit,
            flagged,
            json,
        })?,
        Commands::Status => commands::status::run().await?,
        Commands::Config { init } => commands::config_cmd::run(init)?,
    }

    Ok(())
}
