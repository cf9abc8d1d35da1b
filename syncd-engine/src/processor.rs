//! The change processor.
//!
//! A single actor task owns the queue, the dedup set, the rate limiter, the
//! batch deadline, metrics and history. [`ChangeProcessor`] is a handle that
//! only exchanges messages with it. Dispatched work runs on spawned tasks and
//! reports terminal outcomes back to the actor over an unbounded channel, so
//! every counter is updated from one place.
//!
//! Shutdown order: stop admitting, await in-flight work, clear the batch
//! deadline, then flush whatever is still queued through the single-event
//! path. Counters and history survive a stop/start cycle; the queue and any
//! armed deadline do not.

use std::mem;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use syncd_core::{ChangeEvent, EventId, ProcessorConfig};
use syncd_state::ChangeApplier;

use crate::batch::{form_batches, should_flush_eagerly, BatchScheduler};
use crate::dedup::RecentHashes;
use crate::error::ProcessorError;
use crate::events::ProcessorEvent;
use crate::executor::{
    run_event, run_pass, run_single, ConcurrencyGate, ExecContext, Outcome, Report,
};
use crate::metrics::{History, MetricsRecorder, PriorityCounts, ProcessingMetrics};
use crate::queue::{BoundedQueue, QueueStatus};
use crate::rate_limit::TokenBucket;
use crate::tuning::{COMMAND_BUFFER, DEFAULT_HISTORY_LIMIT, LIFECYCLE_BUFFER};

/// Result of offering an event to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "admission")]
pub enum Admission {
    /// Queued. `evicted` names the oldest event dropped to make room.
    Accepted { evicted: Option<EventId> },
    RateLimited,
    Duplicate,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted { .. })
    }
}

enum Command {
    Submit {
        event: Box<ChangeEvent>,
        respond_to: oneshot::Sender<Result<Admission, ProcessorError>>,
    },
    Metrics {
        respond_to: oneshot::Sender<ProcessingMetrics>,
    },
    QueueStatus {
        respond_to: oneshot::Sender<QueueStatus>,
    },
    History {
        limit: usize,
        respond_to: oneshot::Sender<Vec<ChangeEvent>>,
    },
    Pause {
        respond_to: oneshot::Sender<()>,
    },
    Resume {
        respond_to: oneshot::Sender<()>,
    },
    Stop,
}

/// Processor state that outlives a single run of the actor.
struct Ledger {
    recorder: MetricsRecorder,
    history: History,
    dedup: RecentHashes,
}

impl Ledger {
    fn new(config: &ProcessorConfig) -> Self {
        Self {
            recorder: MetricsRecorder::default(),
            history: History::new(config.history_capacity),
            dedup: RecentHashes::new(&config.dedup),
        }
    }
}

enum Lifecycle {
    Idle(Ledger),
    Running {
        commands: mpsc::Sender<Command>,
        task: JoinHandle<Ledger>,
    },
}

/// Handle to the change-processing pipeline.
pub struct ChangeProcessor {
    config: ProcessorConfig,
    applier: Arc<dyn ChangeApplier>,
    events: broadcast::Sender<ProcessorEvent>,
    lifecycle: Mutex<Lifecycle>,
}

impl ChangeProcessor {
    /// Build a stopped processor. Fails on an invalid configuration.
    pub fn new(
        config: ProcessorConfig,
        applier: Arc<dyn ChangeApplier>,
    ) -> Result<Self, ProcessorError> {
        config.validate()?;
        let (events, _) = broadcast::channel(LIFECYCLE_BUFFER);
        let ledger = Ledger::new(&config);
        Ok(Self {
            config,
            applier,
            events,
            lifecycle: Mutex::new(Lifecycle::Idle(ledger)),
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        matches!(&*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }

    pub async fn start(&self) -> Result<(), ProcessorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        let ledger = match &mut *lifecycle {
            Lifecycle::Running { .. } => return Err(ProcessorError::AlreadyRunning),
            Lifecycle::Idle(ledger) => mem::replace(ledger, Ledger::new(&self.config)),
        };

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let config = &self.config;
        let ctx = ExecContext {
            applier: self.applier.clone(),
            gate: Arc::new(ConcurrencyGate::new(
                &config.priority_thresholds,
                config.max_concurrent_changes,
            )),
            retry: config.retry,
            throttle: config.throttle,
            changes_per_second: config.rate_limits.changes_per_second,
            lifecycle: self.events.clone(),
            reports: reports_tx,
        };
        let actor = Actor {
            config: config.clone(),
            queue: BoundedQueue::new(config.max_queue_size),
            limiter: TokenBucket::new(&config.rate_limits, Instant::now()),
            scheduler: BatchScheduler::new(config.batch_timeout()),
            ctx,
            ledger,
            tasks: JoinSet::new(),
            paused: false,
        };
        let task = tokio::spawn(actor.run(commands_rx, reports_rx));
        *lifecycle = Lifecycle::Running {
            commands: commands_tx,
            task,
        };

        tracing::info!(
            batch_size = config.batch_size,
            max_queue_size = config.max_queue_size,
            batching = config.enable_batching,
            "change processor started",
        );
        let _ = self.events.send(ProcessorEvent::Started);
        Ok(())
    }

    /// Stop admitting, finish in-flight work and flush the queue.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(&*lifecycle, Lifecycle::Idle(_)) {
            return Err(ProcessorError::NotRunning);
        }
        let previous = mem::replace(&mut *lifecycle, Lifecycle::Idle(Ledger::new(&self.config)));
        let Lifecycle::Running { commands, task } = previous else {
            return Err(ProcessorError::NotRunning);
        };

        // A closed channel means the actor is already gone; the join below
        // reports why.
        let _ = commands.send(Command::Stop).await;
        drop(commands);

        let ledger = task.await.map_err(|err| ProcessorError::TaskFailed {
            task: "change processor",
            message: err.to_string(),
        })?;
        *lifecycle = Lifecycle::Idle(ledger);
        Ok(())
    }

    /// Offer one change event to the pipeline.
    pub async fn submit(&self, event: ChangeEvent) -> Result<Admission, ProcessorError> {
        self.request(|respond_to| Command::Submit {
            event: Box::new(event),
            respond_to,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<(), ProcessorError> {
        self.request(|respond_to| Command::Pause { respond_to }).await
    }

    pub async fn resume(&self) -> Result<(), ProcessorError> {
        self.request(|respond_to| Command::Resume { respond_to })
            .await
    }

    pub async fn metrics(&self) -> Result<ProcessingMetrics, ProcessorError> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Lifecycle::Idle(ledger) = &mut *lifecycle {
                return Ok(ledger.recorder.snapshot(0, Instant::now()));
            }
        }
        self.request(|respond_to| Command::Metrics { respond_to })
            .await
    }

    pub async fn queue_status(&self) -> Result<QueueStatus, ProcessorError> {
        {
            let lifecycle = self.lifecycle.lock().await;
            if let Lifecycle::Idle(_) = &*lifecycle {
                return Ok(QueueStatus {
                    size: 0,
                    priority_breakdown: PriorityCounts::default(),
                    oldest_event: None,
                });
            }
        }
        self.request(|respond_to| Command::QueueStatus { respond_to })
            .await
    }

    /// The newest `limit` completed events (default 100), oldest first.
    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<ChangeEvent>, ProcessorError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        {
            let lifecycle = self.lifecycle.lock().await;
            if let Lifecycle::Idle(ledger) = &*lifecycle {
                return Ok(ledger.history.recent(limit));
            }
        }
        self.request(|respond_to| Command::History { limit, respond_to })
            .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ProcessorError> {
        let commands = match &*self.lifecycle.lock().await {
            Lifecycle::Running { commands, .. } => commands.clone(),
            Lifecycle::Idle(_) => return Err(ProcessorError::NotRunning),
        };
        let (tx, rx) = oneshot::channel();
        commands
            .send(make(tx))
            .await
            .map_err(|_| ProcessorError::NotRunning)?;
        rx.await.map_err(|_| ProcessorError::NotRunning)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct Actor {
    config: ProcessorConfig,
    ctx: ExecContext,
    queue: BoundedQueue,
    limiter: TokenBucket,
    scheduler: BatchScheduler,
    ledger: Ledger,
    tasks: JoinSet<()>,
    paused: bool,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut reports: mpsc::UnboundedReceiver<Report>,
    ) -> Ledger {
        let period = self.config.metrics_interval();
        let mut metrics_tick = tokio::time::interval_at(Instant::now() + period, period);
        metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.scheduler.deadline();
            tokio::select! {
                maybe_cmd = commands.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    if self.handle(cmd).is_break() {
                        break;
                    }
                }
                Some(report) = reports.recv() => self.record(report),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    log_join(joined);
                }
                _ = sleep_until_opt(deadline) => {
                    if self.scheduler.is_due(Instant::now()) {
                        self.scheduler.disarm();
                        self.dispatch_pass();
                    }
                }
                _ = metrics_tick.tick() => {
                    let snapshot = self.metrics_snapshot();
                    let _ = self.ctx.lifecycle.send(ProcessorEvent::Metrics(snapshot));
                }
            }
        }

        self.shutdown(&mut reports).await;
        self.ledger
    }

    fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Submit { event, respond_to } => {
                let reply = self.admit(*event);
                let _ = respond_to.send(reply);
            }
            Command::Metrics { respond_to } => {
                let _ = respond_to.send(self.metrics_snapshot());
            }
            Command::QueueStatus { respond_to } => {
                let _ = respond_to.send(self.queue.status());
            }
            Command::History { limit, respond_to } => {
                let _ = respond_to.send(self.ledger.history.recent(limit));
            }
            Command::Pause { respond_to } => {
                self.paused = true;
                self.scheduler.disarm();
                tracing::info!(queued = self.queue.len(), "processing paused");
                let _ = respond_to.send(());
            }
            Command::Resume { respond_to } => {
                self.paused = false;
                tracing::info!(queued = self.queue.len(), "processing resumed");
                self.dispatch_pass();
                let _ = respond_to.send(());
            }
            Command::Stop => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn admit(&mut self, event: ChangeEvent) -> Result<Admission, ProcessorError> {
        if self.paused {
            return Err(ProcessorError::NotRunning);
        }
        let now = Instant::now();

        if !self.limiter.try_acquire(now) {
            self.ledger.recorder.record_rate_limited();
            tracing::warn!(event_id = %event.id, "rate limit exceeded, dropping event");
            return Ok(Admission::RateLimited);
        }

        if self.config.enable_deduplication && self.ledger.dedup.check_and_insert(&event, now) {
            self.ledger.recorder.record_duplicate();
            tracing::debug!(event_id = %event.id, "filtered duplicate event");
            return Ok(Admission::Duplicate);
        }

        self.ctx.applier.mark_pending(&event);
        self.ledger.recorder.record_admission(event.priority);
        tracing::debug!(
            event_id = %event.id,
            priority = %event.priority,
            change_type = %event.change_type(),
            target = %event.target,
            "admitted change",
        );

        let evicted = self.queue.push(event).map(|old| {
            self.ledger.recorder.record_eviction();
            self.ctx.applier.clear_pending(&old);
            tracing::warn!(event_id = %old.id, "queue full, evicted oldest event");
            old.id
        });

        if self.config.enable_batching {
            self.scheduler.arm(now);
            if should_flush_eagerly(&self.queue, self.config.batch_size) {
                self.scheduler.disarm();
                self.dispatch_pass();
            }
        } else {
            for event in self.queue.drain_all() {
                let ctx = self.ctx.clone();
                self.tasks.spawn(async move {
                    run_single(&ctx, event).await;
                });
            }
        }

        Ok(Admission::Accepted { evicted })
    }

    /// Drain the queue into batches and run them as one ordered pass.
    fn dispatch_pass(&mut self) {
        if self.paused || self.queue.is_empty() {
            return;
        }
        let batches = form_batches(self.queue.drain_all(), self.config.batch_size);
        tracing::info!(batches = batches.len(), "dispatching scheduling pass");
        self.tasks.spawn(run_pass(self.ctx.clone(), batches));
    }

    fn record(&mut self, report: Report) {
        let now = Instant::now();
        match report {
            Report::Completed(done) => {
                let lifecycle = &self.ctx.lifecycle;
                let recorder = &mut self.ledger.recorder;
                match done.outcome {
                    Outcome::Processed => {
                        recorder.record_outcome(done.elapsed, true, now);
                        self.ledger.history.push(done.event.clone());
                        let _ = lifecycle.send(ProcessorEvent::Processed {
                            event: done.event,
                            impact: done.impact,
                        });
                    }
                    Outcome::Conflict { reason, state } => {
                        recorder.record_outcome(done.elapsed, true, now);
                        recorder.record_conflict();
                        self.ledger.history.push(done.event.clone());
                        let _ = lifecycle.send(ProcessorEvent::Conflict {
                            event: done.event,
                            reason,
                            state,
                        });
                    }
                    Outcome::Failed(error) => {
                        recorder.record_outcome(done.elapsed, false, now);
                        let _ = lifecycle.send(ProcessorEvent::ProcessingError {
                            event: done.event,
                            error,
                        });
                    }
                }
            }
            Report::BatchDone {
                batch_id,
                events,
                elapsed,
            } => {
                self.ledger.recorder.record_batch();
                tracing::info!(
                    batch_id = %batch_id,
                    size = events.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "batch processed",
                );
                let _ = self
                    .ctx
                    .lifecycle
                    .send(ProcessorEvent::BatchProcessed { batch_id, events });
            }
        }
    }

    fn metrics_snapshot(&mut self) -> ProcessingMetrics {
        self.ledger
            .recorder
            .snapshot(self.queue.len(), Instant::now())
    }

    async fn shutdown(&mut self, reports: &mut mpsc::UnboundedReceiver<Report>) {
        tracing::info!(
            in_flight = self.tasks.len(),
            queued = self.queue.len(),
            "stopping change processor",
        );

        while !self.tasks.is_empty() {
            tokio::select! {
                Some(report) = reports.recv() => self.record(report),
                Some(joined) = self.tasks.join_next() => log_join(joined),
            }
        }
        while let Ok(report) = reports.try_recv() {
            self.record(report);
        }

        self.scheduler.disarm();

        if !self.queue.is_empty() {
            tracing::info!(remaining = self.queue.len(), "flushing queued events");
        }
        while let Some(event) = self.queue.pop_front() {
            let completion = run_event(&self.ctx, event).await;
            self.record(Report::Completed(completion));
        }

        tracing::info!("change processor stopped");
        let _ = self.ctx.lifecycle.send(ProcessorEvent::Stopped);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "dispatch task join failure");
    }
}
