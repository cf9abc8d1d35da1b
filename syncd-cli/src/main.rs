//! syncd: drive the change-processing engine from the command line.
//!
//! # Usage
//!
//! ```text
//! syncd replay <events.jsonl> [--config <path>] [--persist <project-root>] [--json]
//! syncd config show [--config <path>] [--json]
//! syncd config init [--config <path>] [--force]
//! syncd state show <state-file> [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config::ConfigCommand, replay::ReplayArgs, state::StateCommand};

#[derive(Parser, Debug)]
#[command(
    name = "syncd",
    version,
    about = "Replay change events through the sync engine and inspect its state",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push a JSON-lines stream of change events through the pipeline.
    Replay(ReplayArgs),

    /// Show or create the engine configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Inspect a persisted project state file.
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    syncd_engine::init_tracing(cli.log_json);
    match cli.command {
        Commands::Replay(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::State { command } => commands::state::run(command),
    }
}
