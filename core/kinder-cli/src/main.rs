//! kinder: command line driver for the kinder voting engine.
//!
//! ## Subcommands
//!
//! - `replay`: Runs a recorded session script, printing notifications as JSON lines
//! - `check-config`: Loads engine configuration and prints the effective values
//! - `session-name`: Suggests a free `adjective subject` session name

mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kinder_core::{
    load_engine_config, load_replay_script, run_replay, session_name, CallbackSink, Notification,
};

#[derive(Parser)]
#[command(name = "kinder")]
#[command(about = "Movie voting session engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a session script through the engine
    Replay {
        /// JSON replay script
        #[arg(long, value_name = "PATH")]
        script: PathBuf,

        /// Engine configuration (defaults to ~/.kinder/engine.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Validate and print the engine configuration
    CheckConfig {
        /// Engine configuration (defaults to ~/.kinder/engine.toml)
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Suggest a session name not already in use
    SessionName {
        /// Names already taken (repeatable)
        #[arg(long = "taken", value_name = "NAME")]
        taken: Vec<String>,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { script, config } => {
            if let Err(e) = replay(script, config) {
                tracing::error!(error = %e, "kinder replay failed");
                std::process::exit(1);
            }
        }
        Commands::CheckConfig { config } => {
            if let Err(e) = check_config(config) {
                tracing::error!(error = %e, "kinder check-config failed");
                std::process::exit(1);
            }
        }
        Commands::SessionName { taken } => match session_name(&taken) {
            Some(name) => println!("{}", name),
            None => {
                tracing::warn!(taken = taken.len(), "Every session name is taken");
                std::process::exit(1);
            }
        },
    }
}

fn replay(script: PathBuf, config: Option<PathBuf>) -> kinder_core::Result<()> {
    let config = load_engine_config(config)?;
    let script = load_replay_script(&script)?;

    let sink = CallbackSink(|notification: Notification| {
        match serde_json::to_string(&notification) {
            Ok(line) => println!("{}", line),
            Err(err) => tracing::warn!(error = %err, "Failed to encode notification"),
        }
    });
    let summary = run_replay(script, config, Box::new(sink))?;

    match summary.end_cause {
        Some(cause) => eprintln!(
            "{} steps, {} votes submitted, over: {}",
            summary.steps,
            summary.votes_submitted,
            cause.reason()
        ),
        None => eprintln!(
            "{} steps, {} votes submitted, still running",
            summary.steps, summary.votes_submitted
        ),
    }
    Ok(())
}

fn check_config(config: Option<PathBuf>) -> kinder_core::Result<()> {
    let config = load_engine_config(config)?;
    match serde_json::to_string_pretty(&config) {
        Ok(rendered) => println!("{}", rendered),
        Err(err) => tracing::warn!(error = %err, "Failed to render configuration"),
    }
    if !config.reminder.is_enabled() {
        eprintln!("Reminder disabled (min_ms and max_ms are both <= 0)");
    }
    Ok(())
}
