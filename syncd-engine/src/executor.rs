//! Concurrency-controlled execution of change events.
//!
//! Every event takes the same path: impact analysis, `Processing` emission,
//! the per-priority throttle delay (once), then apply attempts. Each attempt
//! holds a [`GatePermit`]; the permit is released while waiting out a retry
//! backoff so a retrying event never pins a concurrency slot.
//!
//! Terminal outcomes are reported back to the processor actor as
//! [`Report`]s; the actor owns metrics, history and the remaining lifecycle
//! emissions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use syncd_core::{
    BatchId, ChangeEvent, Priority, PriorityThresholds, ProjectState, RetryPolicy, ThrottleDelays,
};
use syncd_state::{ApplyError, ApplyOutcome, ChangeApplier, ConflictReason};

use crate::batch::ProcessingBatch;
use crate::error::ProcessorError;
use crate::events::ProcessorEvent;
use crate::impact::{self, ChangeImpact};

// ---------------------------------------------------------------------------
// Concurrency gate
// ---------------------------------------------------------------------------

/// Per-priority ceilings plus a global ceiling on in-flight events.
#[derive(Debug)]
pub struct ConcurrencyGate {
    tiers: [Arc<Semaphore>; 4],
    limits: [usize; 4],
    global: Arc<Semaphore>,
    global_limit: usize,
}

/// Held for the duration of one apply attempt.
#[derive(Debug)]
pub struct GatePermit {
    _tier: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(thresholds: &PriorityThresholds, max_concurrent: usize) -> Self {
        let limits = Priority::ALL.map(|p| thresholds.get(p).max(1));
        Self {
            tiers: limits.map(|n| Arc::new(Semaphore::new(n))),
            limits,
            global: Arc::new(Semaphore::new(max_concurrent.max(1))),
            global_limit: max_concurrent.max(1),
        }
    }

    /// Wait until both the tier and the global ceiling have room.
    pub async fn acquire(&self, priority: Priority) -> Result<GatePermit, ProcessorError> {
        let tier = self.tiers[tier_index(priority)]
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProcessorError::ChannelClosed("concurrency gate"))?;
        let global = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProcessorError::ChannelClosed("concurrency gate"))?;
        Ok(GatePermit {
            _tier: tier,
            _global: global,
        })
    }

    pub fn in_flight(&self, priority: Priority) -> usize {
        let i = tier_index(priority);
        self.limits[i] - self.tiers[i].available_permits()
    }

    pub fn total_in_flight(&self) -> usize {
        self.global_limit - self.global.available_permits()
    }
}

fn tier_index(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Medium => 2,
        Priority::Low => 3,
    }
}

/// Whole-batch smoothing delay: `len / changes_per_second` seconds.
pub fn batch_delay(len: usize, changes_per_second: u32) -> Duration {
    if changes_per_second == 0 {
        return Duration::ZERO;
    }
    let nanos = (len as u64).saturating_mul(1_000_000_000) / u64::from(changes_per_second);
    Duration::from_nanos(nanos)
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Everything an executing task needs; cheap to clone.
#[derive(Clone)]
pub(crate) struct ExecContext {
    pub applier: Arc<dyn ChangeApplier>,
    pub gate: Arc<ConcurrencyGate>,
    pub retry: RetryPolicy,
    pub throttle: ThrottleDelays,
    pub changes_per_second: u32,
    pub lifecycle: broadcast::Sender<ProcessorEvent>,
    pub reports: mpsc::UnboundedSender<Report>,
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Processed,
    Conflict {
        reason: ConflictReason,
        state: Arc<ProjectState>,
    },
    Failed(ApplyError),
}

#[derive(Debug)]
pub(crate) struct Completion {
    pub event: ChangeEvent,
    pub impact: ChangeImpact,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub(crate) enum Report {
    Completed(Completion),
    BatchDone {
        batch_id: BatchId,
        events: Vec<ChangeEvent>,
        elapsed: Duration,
    },
}

/// Drive one event to a terminal outcome.
pub(crate) async fn run_event(ctx: &ExecContext, mut event: ChangeEvent) -> Completion {
    let started = Instant::now();
    if event.processing_started.is_none() {
        event.processing_started = Some(Utc::now());
    }

    let impact = impact::analyze(&event);
    let _ = ctx.lifecycle.send(ProcessorEvent::Processing {
        event: event.clone(),
        impact: impact.clone(),
    });

    let delay = ctx.throttle.delay(event.priority);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let outcome = loop {
        let result = match ctx.gate.acquire(event.priority).await {
            Ok(_permit) => {
                event.attempts += 1;
                ctx.applier.apply(&event).await
            }
            Err(err) => Err(ApplyError::other(err.to_string())),
        };

        match result {
            Ok(ApplyOutcome::Applied { version }) => {
                tracing::debug!(event_id = %event.id, version, attempt = event.attempts, "change applied");
                break Outcome::Processed;
            }
            Ok(ApplyOutcome::Conflict { reason, state }) => break Outcome::Conflict { reason, state },
            Err(err) => {
                event.last_error = Some(err.to_string());
                if err.is_retryable() && event.attempts < ctx.retry.max_attempts {
                    let backoff = ctx.retry.backoff(event.attempts);
                    tracing::warn!(
                        event_id = %event.id,
                        attempt = event.attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        tier_in_flight = ctx.gate.in_flight(event.priority),
                        error = %err,
                        "retrying change",
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                tracing::error!(
                    event_id = %event.id,
                    attempts = event.attempts,
                    error = %err,
                    "change failed",
                );
                break Outcome::Failed(err);
            }
        }
    };

    ctx.applier.clear_pending(&event);
    if !matches!(outcome, Outcome::Failed(_)) {
        event.processing_completed = Some(Utc::now());
    }

    Completion {
        event,
        impact,
        outcome,
        elapsed: started.elapsed(),
    }
}

/// Run one event and report its outcome; returns the final event.
pub(crate) async fn run_and_report(ctx: &ExecContext, event: ChangeEvent) -> ChangeEvent {
    let completion = run_event(ctx, event).await;
    let event = completion.event.clone();
    let _ = ctx.reports.send(Report::Completed(completion));
    event
}

fn spawn_event(ctx: &ExecContext, event: ChangeEvent) -> JoinHandle<ChangeEvent> {
    let ctx = ctx.clone();
    tokio::spawn(async move { run_and_report(&ctx, event).await })
}

/// Run one event on its own task. If that task dies before reporting, the
/// event is retried once on a fresh task.
pub(crate) async fn run_single(ctx: &ExecContext, event: ChangeEvent) -> ChangeEvent {
    match spawn_event(ctx, event.clone()).await {
        Ok(done) => done,
        Err(err) => {
            tracing::error!(
                event_id = %event.id,
                error = %err,
                "change task failed; retrying event",
            );
            retry_isolated(ctx, event).await
        }
    }
}

/// Last attempt for an event whose task already died once. A second task
/// failure is reported as a terminal failure so the event never goes
/// unaccounted and its pending mark is released.
async fn retry_isolated(ctx: &ExecContext, event: ChangeEvent) -> ChangeEvent {
    let started = Instant::now();
    match spawn_event(ctx, event.clone()).await {
        Ok(done) => done,
        Err(err) => {
            let error = ApplyError::other(format!("change task failed: {err}"));
            tracing::error!(event_id = %event.id, error = %error, "abandoning change");
            ctx.applier.clear_pending(&event);

            let mut event = event;
            event.last_error = Some(error.to_string());
            let impact = impact::analyze(&event);
            let _ = ctx.reports.send(Report::Completed(Completion {
                event: event.clone(),
                impact,
                outcome: Outcome::Failed(error),
                elapsed: started.elapsed(),
            }));
            event
        }
    }
}

/// Dispatch a batch: stamp it, wait out the batch delay, run its events
/// concurrently. An event whose task dies without completing is re-run
/// individually.
pub(crate) async fn run_batch(ctx: &ExecContext, batch: ProcessingBatch) {
    let started = Instant::now();
    let stamped_at = Utc::now();
    tracing::info!(
        batch_id = %batch.id,
        size = batch.len(),
        priority = %batch.priority,
        category = %batch.category,
        in_flight = ctx.gate.total_in_flight(),
        "processing batch",
    );

    let delay = batch_delay(batch.len(), ctx.changes_per_second);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut handles = Vec::with_capacity(batch.len());
    for mut event in batch.events {
        event.batch_id = Some(batch.id.clone());
        event.processing_started = Some(stamped_at);
        let handle = spawn_event(ctx, event.clone());
        handles.push((event, handle));
    }

    let mut finished = Vec::with_capacity(handles.len());
    for (event, handle) in handles {
        match handle.await {
            Ok(done) => finished.push(done),
            Err(err) => {
                tracing::error!(
                    batch_id = %batch.id,
                    event_id = %event.id,
                    error = %err,
                    "batch task failed; retrying event individually",
                );
                finished.push(retry_isolated(ctx, event).await);
            }
        }
    }

    let _ = ctx.reports.send(Report::BatchDone {
        batch_id: batch.id,
        events: finished,
        elapsed: started.elapsed(),
    });
}

/// One scheduling pass: batches strictly in the given order.
pub(crate) async fn run_pass(ctx: ExecContext, batches: Vec<ProcessingBatch>) {
    for batch in batches {
        run_batch(&ctx, batch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_delay_scales_with_size() {
        assert_eq!(batch_delay(3, 100), Duration::from_millis(30));
        assert_eq!(batch_delay(10, 10), Duration::from_secs(1));
        assert_eq!(batch_delay(5, 0), Duration::ZERO);
    }

    #[tokio::test]
    async fn gate_caps_each_tier_independently() {
        let thresholds = PriorityThresholds {
            critical: 1,
            high: 2,
            medium: 2,
            low: 2,
        };
        let gate = ConcurrencyGate::new(&thresholds, 10);
        let first = gate.acquire(Priority::Critical).await.expect("permit");
        assert_eq!(gate.in_flight(Priority::Critical), 1);

        let blocked = tokio::time::timeout(
            Duration::from_millis(10),
            gate.acquire(Priority::Critical),
        )
        .await;
        assert!(blocked.is_err(), "second critical permit must wait");

        let _high = gate.acquire(Priority::High).await.expect("permit");
        assert_eq!(gate.total_in_flight(), 2);

        drop(first);
        assert_eq!(gate.in_flight(Priority::Critical), 0);
    }

    #[tokio::test]
    async fn global_ceiling_applies_across_tiers() {
        let gate = ConcurrencyGate::new(&PriorityThresholds::default(), 1);
        let _held = gate.acquire(Priority::Low).await.expect("permit");
        let blocked =
            tokio::time::timeout(Duration::from_millis(10), gate.acquire(Priority::Critical)).await;
        assert!(blocked.is_err());
    }
}
