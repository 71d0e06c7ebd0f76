//! `deskpilot agent`: interactive or single-message chat mode.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use deskpilot_agent::ReactController;
use deskpilot_core::provider::Provider;
use deskpilot_security::Journal;
use deskpilot_tools::{Calendar, GoalBoard, TaskBoard, ToolContext, default_dispatcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::{build_gateway, build_memory, load_config, open_branches, open_goals, open_journal};

pub async fn run(message: Option<String>, attachments: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let gateway = build_gateway(&config)?;

    if !gateway.health_check().await {
        eprintln!();
        eprintln!("  WARNING: the model runtime at {} is not answering.", gateway.host());
        eprintln!("  Start it with `ollama serve`, then try again.");
        eprintln!();
    }

    let journal = open_journal(&config);
    journal.set_model(config.model.model.clone());
    let memory = build_memory(&config);
    let goals = open_goals(&config);
    let ctx = ToolContext {
        runtime: gateway.clone(),
        memory: memory.clone(),
        tasks: Arc::new(TaskBoard::new()),
        scheduler: Arc::new(Calendar::new()),
        journal: journal.clone(),
        goals: goals.clone(),
    };
    let dispatcher = Arc::new(default_dispatcher(&config, &ctx));
    let tool_count = dispatcher.registry().len();
    let controller = Arc::new(
        ReactController::from_config(&config, gateway, dispatcher, memory)
            .with_goals(goals.clone())
            .with_branches(open_branches(&config)),
    );
    info!(model = %config.model.model, tools = tool_count, "Agent ready");

    if let Some(msg) = message {
        let mut rx = controller.run(msg, attachments);
        let mut shown = String::new();
        while let Some(snapshot) = rx.recv().await {
            print_snapshot(&mut shown, &snapshot)?;
        }
        println!();
        flush_journal(&journal);
        return Ok(());
    }

    println!();
    println!("  DeskPilot, interactive mode");
    println!();
    println!("  Agent:  {}", config.agent.agent_name);
    println!("  Model:  {}", config.model.model);
    println!("  Tools:  {tool_count}");
    println!();
    println!("  Type your message and press Enter. While the agent works,");
    println!("  a new line interrupts it and `/queue <msg>` holds a message for later.");
    println!("  `/branch [name]`, `/branches`, `/restore <id>` and `/delete-branch <id>`");
    println!("  save and rewind the conversation; `/goals` lists active goals.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = attachments;
    loop {
        let input = match controller.mailbox().pop_queued() {
            Some(queued) => {
                println!("  You (queued) > {queued}");
                queued
            }
            None => {
                print!("  You > ");
                std::io::stdout().flush()?;
                match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };

        let input = input.trim().to_string();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        if let Some(command) = SessionCommand::parse(&input) {
            run_session_command(&controller, &goals, command).await;
            continue;
        }

        let mut rx = controller.run(input, std::mem::take(&mut pending));
        let mut shown = String::new();
        println!();
        loop {
            tokio::select! {
                snapshot = rx.recv() => match snapshot {
                    Some(snapshot) => print_snapshot(&mut shown, &snapshot)?,
                    None => break,
                },
                line = lines.next_line() => match line? {
                    Some(line) => route_side_message(&controller, line.trim()),
                    None => break,
                },
            }
        }
        println!();
        println!();
    }

    flush_journal(&journal);
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn flush_journal(journal: &Journal) {
    if let Err(e) = journal.flush() {
        warn!(error = %e, "Could not flush the journal on exit");
    }
}

/// Conversation-management commands typed between runs.
#[derive(Debug, PartialEq, Eq)]
enum SessionCommand {
    Branch(Option<String>),
    Branches,
    Restore(String),
    DeleteBranch(String),
    Goals,
}

impl SessionCommand {
    fn parse(input: &str) -> Option<Self> {
        let (head, arg) = match input.split_once(char::is_whitespace) {
            Some((head, arg)) => (head, arg.trim()),
            None => (input, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());
        match head {
            "/branch" => Some(Self::Branch(arg)),
            "/branches" => Some(Self::Branches),
            "/restore" => arg.map(Self::Restore),
            "/delete-branch" => arg.map(Self::DeleteBranch),
            "/goals" => Some(Self::Goals),
            _ => None,
        }
    }
}

async fn run_session_command(controller: &ReactController, goals: &GoalBoard, command: SessionCommand) {
    match command {
        SessionCommand::Branch(name) => match controller.branch(name.as_deref()).await {
            Ok(saved) => println!("  Saved branch '{}' ({} messages)", saved.id, saved.messages),
            Err(e) => println!("  Could not save branch: {e}"),
        },
        SessionCommand::Branches => {
            let branches = controller.list_branches().await;
            if branches.is_empty() {
                println!("  No saved branches.");
            }
            for branch in branches {
                println!(
                    "  {}  {}  {} messages  {}",
                    branch.id,
                    branch.created_at.format("%Y-%m-%d %H:%M"),
                    branch.messages,
                    branch.model
                );
            }
        }
        SessionCommand::Restore(id) => match controller.restore_branch(&id).await {
            Ok(true) => println!("  Restored branch '{id}'"),
            Ok(false) => println!("  No branch named '{id}'"),
            Err(e) => println!("  Could not restore branch: {e}"),
        },
        SessionCommand::DeleteBranch(id) => match controller.delete_branch(&id).await {
            Ok(true) => println!("  Deleted branch '{id}'"),
            Ok(false) => println!("  No branch named '{id}'"),
            Err(e) => println!("  Could not delete branch: {e}"),
        },
        SessionCommand::Goals => {
            let active = goals.active().await;
            if active.is_empty() {
                println!("  No active goals.");
            }
            for goal in active {
                println!("  - {goal}");
            }
        }
    }
    println!();
}

/// Deliver a line typed while a run is in progress.
fn route_side_message(controller: &ReactController, line: &str) {
    if line.is_empty() {
        return;
    }
    match line.strip_prefix("/queue ") {
        Some(queued) => controller.mailbox().queue_message(queued.trim()),
        None => controller.mailbox().send_interrupt(line),
    }
}

fn print_snapshot(shown: &mut String, snapshot: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    match delta(shown, snapshot) {
        Some(tail) => write!(stdout, "{tail}")?,
        None => write!(stdout, "\n\n{snapshot}")?,
    }
    stdout.flush()?;
    shown.clear();
    shown.push_str(snapshot);
    Ok(())
}

/// The new text in `snapshot`, or `None` when it no longer extends what was shown.
fn delta<'a>(shown: &str, snapshot: &'a str) -> Option<&'a str> {
    snapshot.strip_prefix(shown)
}
