//! `syncd state show <file>`: summarise a persisted state document.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use syncd_state::{checksum, persist};

use super::label;

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Summarise a state file written with persistence enabled.
    Show {
        /// Path to the state file (e.g. <project>/.sync-state.json).
        file: PathBuf,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn run(cmd: StateCommand) -> Result<()> {
    match cmd {
        StateCommand::Show { file, json } => show(file, json),
    }
}

#[derive(Serialize)]
struct StateSummary {
    version: u64,
    last_update: String,
    saved_at: String,
    checksum: String,
    checksum_valid: bool,
    files: usize,
    dependencies: usize,
    git_branch: String,
    git_status: String,
    build_status: String,
    server_status: String,
    snapshots: usize,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn show(file: PathBuf, json: bool) -> Result<()> {
    let persisted = persist::load_at(&file)
        .with_context(|| format!("failed to read state file '{}'", file.display()))?
        .with_context(|| format!("no state file at '{}'", file.display()))?;
    let state = &persisted.state;
    let recomputed = checksum::compute(state).context("failed to recompute checksum")?;

    let summary = StateSummary {
        version: state.version,
        last_update: state.last_update.to_rfc3339(),
        saved_at: persisted.saved_at.to_rfc3339(),
        checksum_valid: recomputed == state.checksum,
        checksum: state.checksum.clone(),
        files: state.files.len(),
        dependencies: state.dependencies.len(),
        git_branch: state.git.branch.clone(),
        git_status: label(&state.git.status),
        build_status: label(&state.build.status),
        server_status: label(&state.server.status),
        snapshots: persisted.history.len(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", "State".bold(), file.display());
    let git = format!(
        "{} ({})",
        display_or_dash(&summary.git_branch),
        summary.git_status
    );
    let rows = vec![
        row("version", summary.version),
        row("last update", &summary.last_update),
        row("saved at", &summary.saved_at),
        row("files", summary.files),
        row("dependencies", summary.dependencies),
        row("git", git),
        row("build", &summary.build_status),
        row("server", &summary.server_status),
        row("snapshots", summary.snapshots),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if summary.checksum_valid {
        println!("{} checksum {}", "✓".green(), summary.checksum);
    } else {
        println!(
            "{} checksum mismatch: stored {}, computed {}",
            "✗".red(),
            summary.checksum,
            recomputed
        );
    }
    Ok(())
}

fn row(field: &'static str, value: impl ToString) -> Row {
    Row {
        field,
        value: value.to_string(),
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
