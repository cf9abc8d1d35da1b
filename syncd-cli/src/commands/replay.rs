//! `syncd replay <events.jsonl>`: push a recorded event stream through the
//! full pipeline and report what happened to it.
//!
//! One event per line:
//!
//! ```text
//! {"type":"file","metadata":{},"operation":"modified","target":"src/lib.rs"}
//! {"type":"git","metadata":{"branch":"main"},"operation":"conflict","target":"main","priority":"critical"}
//! ```
//!
//! `priority`, `timestamp`, `id` and `source` are optional; a missing
//! priority is assigned by the producer heuristics. `remote: true` (or a
//! `base_version`) marks the event as coming from a peer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::broadcast::{self, error::RecvError};

use syncd_core::{config, ChangeEvent, ChangePayload, EngineConfig, Priority};
use syncd_engine::{Admission, ProcessingMetrics, ProcessorEvent, SyncEngine};

use super::resolve_config_path;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSON-lines file with one change event per line.
    pub events: PathBuf,

    /// Config file to read instead of ~/.syncd/config.yaml.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable state persistence under this project root.
    #[arg(long, value_name = "PROJECT_ROOT")]
    pub persist: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ReplayArgs {
    pub fn run(self) -> Result<()> {
        let config_path = resolve_config_path(self.config.as_deref())?;
        let mut engine_config = config::load_at(&config_path)
            .with_context(|| format!("failed to load config '{}'", config_path.display()))?;
        if let Some(root) = self.persist {
            engine_config.state.persist_state = true;
            engine_config.state.project_root = root;
        }

        let events = read_events(&self.events)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let report = runtime.block_on(replay(engine_config, events))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(flatten)]
    payload: ChangePayload,
    operation: String,
    target: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    remote: bool,
    #[serde(default)]
    base_version: Option<u64>,
}

fn default_source() -> String {
    "replay".to_string()
}

impl ReplayLine {
    fn into_event(self) -> ChangeEvent {
        let mut event = ChangeEvent::new(self.payload, self.operation, self.target, self.source);
        if let Some(priority) = self.priority {
            event = event.with_priority(priority);
        }
        if let Some(timestamp) = self.timestamp {
            event = event.with_timestamp(timestamp);
        }
        if let Some(id) = self.id {
            event = event.with_id(id);
        }
        if self.remote || self.base_version.is_some() {
            event = event.remote(self.base_version);
        }
        event
    }
}

fn read_events(path: &Path) -> Result<Vec<ChangeEvent>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("cannot read events file '{}'", path.display()))?;
    let mut events = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parsed: ReplayLine = serde_json::from_str(line).with_context(|| {
            format!("{}:{}: invalid change event", path.display(), index + 1)
        })?;
        events.push(parsed.into_event());
    }
    Ok(events)
}

#[derive(Debug, Default, Serialize)]
struct AdmissionCounts {
    accepted: usize,
    duplicates: usize,
    rate_limited: usize,
    evicted: usize,
}

#[derive(Debug, Serialize)]
struct ConflictEntry {
    event_id: String,
    target: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct FailureEntry {
    event_id: String,
    target: String,
    attempts: u32,
    error: String,
}

#[derive(Debug, Default, Serialize)]
struct Outcomes {
    processed: usize,
    batches: usize,
    conflicts: Vec<ConflictEntry>,
    failures: Vec<FailureEntry>,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    submitted: usize,
    admissions: AdmissionCounts,
    outcomes: Outcomes,
    metrics: ProcessingMetrics,
    state_version: u64,
    state_checksum: String,
}

async fn replay(config: EngineConfig, events: Vec<ChangeEvent>) -> Result<ReplayReport> {
    let engine = SyncEngine::open(config).context("failed to open sync engine")?;
    let collector = tokio::spawn(collect_outcomes(engine.processor().subscribe()));
    engine.start().await?;

    let submitted = events.len();
    let mut admissions = AdmissionCounts::default();
    for event in events {
        match engine.processor().submit(event).await? {
            Admission::Accepted { evicted } => {
                admissions.accepted += 1;
                if evicted.is_some() {
                    admissions.evicted += 1;
                }
            }
            Admission::Duplicate => admissions.duplicates += 1,
            Admission::RateLimited => admissions.rate_limited += 1,
        }
    }

    engine.stop().await?;
    let outcomes = collector.await.context("event collector failed")?;
    let metrics = engine.processor().metrics().await?;
    let state = engine.current_state();

    Ok(ReplayReport {
        submitted,
        admissions,
        outcomes,
        metrics,
        state_version: state.version,
        state_checksum: state.checksum.clone(),
    })
}

async fn collect_outcomes(mut rx: broadcast::Receiver<ProcessorEvent>) -> Outcomes {
    let mut outcomes = Outcomes::default();
    loop {
        match rx.recv().await {
            Ok(ProcessorEvent::Processed { .. }) => outcomes.processed += 1,
            Ok(ProcessorEvent::BatchProcessed { .. }) => outcomes.batches += 1,
            Ok(ProcessorEvent::Conflict { event, reason, .. }) => {
                outcomes.conflicts.push(ConflictEntry {
                    event_id: event.id.0,
                    target: event.target,
                    reason: reason.to_string(),
                });
            }
            Ok(ProcessorEvent::ProcessingError { event, error }) => {
                outcomes.failures.push(FailureEntry {
                    event_id: event.id.0,
                    target: event.target,
                    attempts: event.attempts,
                    error: error.to_string(),
                });
            }
            Ok(ProcessorEvent::Stopped) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
    outcomes
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "metric")]
    metric: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn print_report(report: &ReplayReport) {
    let metrics = &report.metrics;
    println!(
        "{} {} events ({} accepted, {} duplicate, {} rate-limited, {} evicted)",
        "Replayed".bold(),
        report.submitted,
        report.admissions.accepted,
        report.admissions.duplicates,
        report.admissions.rate_limited,
        report.admissions.evicted,
    );

    let rows = vec![
        metric("processed", report.outcomes.processed),
        metric("batches", report.outcomes.batches),
        metric("conflicts", report.outcomes.conflicts.len()),
        metric("failures", report.outcomes.failures.len()),
        metric(
            "avg processing",
            format!("{:.1} ms", metrics.average_processing_time_ms),
        ),
        metric("error rate", format!("{:.1}%", metrics.error_rate * 100.0)),
        metric("state version", report.state_version),
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for conflict in &report.outcomes.conflicts {
        println!(
            "{} conflict on {} ({}): {}",
            "!".yellow(),
            conflict.target,
            conflict.event_id,
            conflict.reason
        );
    }
    for failure in &report.outcomes.failures {
        println!(
            "{} failed {} ({}) after {} attempt(s): {}",
            "✗".red(),
            failure.target,
            failure.event_id,
            failure.attempts,
            failure.error
        );
    }
    if report.outcomes.conflicts.is_empty() && report.outcomes.failures.is_empty() {
        println!("{} state checksum {}", "✓".green(), report.state_checksum);
    }
}

fn metric(metric: &'static str, value: impl ToString) -> MetricRow {
    MetricRow {
        metric,
        value: value.to_string(),
    }
}
