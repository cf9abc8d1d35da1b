#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use syncd_core::{
    ChangeEvent, ChangePayload, FileMetadata, Priority, ProcessorConfig, ThrottleDelays,
};
use syncd_engine::{ChangeProcessor, ProcessorEvent};
use syncd_state::{ApplyError, ApplyOutcome, ChangeApplier};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;

/// Applier double: records every attempt, optionally sleeps, fails or
/// panics on selected targets.
#[derive(Default)]
pub struct ScriptedApplier {
    pub delay: Duration,
    applied: Mutex<Vec<ChangeEvent>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    failing: Mutex<HashMap<String, ApplyError>>,
    panic_once: Mutex<HashSet<String>>,
    panic_always: Mutex<HashSet<String>>,
    pending: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedApplier {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fail_target(&self, target: &str, error: ApplyError) {
        self.failing
            .lock()
            .unwrap()
            .insert(target.to_string(), error);
    }

    pub fn panic_once_on(&self, target: &str) {
        self.panic_once.lock().unwrap().insert(target.to_string());
    }

    pub fn panic_always_on(&self, target: &str) {
        self.panic_always.lock().unwrap().insert(target.to_string());
    }

    /// Outstanding `mark_pending` calls for `target`.
    pub fn pending(&self, target: &str) -> usize {
        self.pending.lock().unwrap().get(target).copied().unwrap_or(0)
    }

    pub fn applied(&self) -> Vec<ChangeEvent> {
        self.applied.lock().unwrap().clone()
    }

    pub fn attempt_times(&self, target: &str) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeApplier for ScriptedApplier {
    async fn apply(&self, event: &ChangeEvent) -> Result<ApplyOutcome, ApplyError> {
        self.attempts
            .lock()
            .unwrap()
            .push((event.target.clone(), Instant::now()));

        if self.panic_once.lock().unwrap().remove(&event.target) {
            panic!("applier blew up on {}", event.target);
        }
        if self.panic_always.lock().unwrap().contains(&event.target) {
            panic!("applier keeps blowing up on {}", event.target);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failing.lock().unwrap().get(&event.target) {
            return Err(err.clone());
        }
        let mut applied = self.applied.lock().unwrap();
        applied.push(event.clone());
        Ok(ApplyOutcome::Applied {
            version: applied.len() as u64,
        })
    }

    fn mark_pending(&self, event: &ChangeEvent) {
        *self
            .pending
            .lock()
            .unwrap()
            .entry(event.target.clone())
            .or_default() += 1;
    }

    fn clear_pending(&self, event: &ChangeEvent) {
        if let Some(count) = self.pending.lock().unwrap().get_mut(&event.target) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Defaults with zeroed throttle delays and a metrics interval long enough
/// to stay out of the way.
pub fn quiet_config() -> ProcessorConfig {
    ProcessorConfig {
        throttle: ThrottleDelays {
            critical_ms: 0,
            high_ms: 0,
            medium_ms: 0,
            low_ms: 0,
        },
        metrics_interval_ms: 3_600_000,
        ..ProcessorConfig::default()
    }
}

pub fn processor(config: ProcessorConfig, applier: Arc<ScriptedApplier>) -> ChangeProcessor {
    ChangeProcessor::new(config, applier).expect("valid config")
}

/// A low-priority file event with a stable id.
pub fn note(i: usize) -> ChangeEvent {
    ChangeEvent::new(
        ChangePayload::File(FileMetadata::default()),
        "modified",
        format!("notes/{i}.txt"),
        "file-watcher",
    )
    .with_id(format!("note-{i}"))
}

pub fn prioritized(i: usize, priority: Priority) -> ChangeEvent {
    note(i).with_priority(priority)
}

/// Receive until `pred` matches, skipping everything else.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<ProcessorEvent>,
    mut pred: impl FnMut(&ProcessorEvent) -> bool,
) -> ProcessorEvent {
    loop {
        match tokio::time::timeout(Duration::from_secs(600), rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) => panic!("processor event channel closed"),
            Err(_) => panic!("timed out waiting for a processor event"),
        }
    }
}

/// Collect `Processed` events until `count` have arrived.
pub async fn wait_processed(
    rx: &mut broadcast::Receiver<ProcessorEvent>,
    count: usize,
) -> Vec<ChangeEvent> {
    let mut done = Vec::with_capacity(count);
    while done.len() < count {
        if let ProcessorEvent::Processed { event, .. } =
            wait_for(rx, |e| matches!(e, ProcessorEvent::Processed { .. })).await
        {
            done.push(event);
        }
    }
    done
}

/// Everything emitted up to and including `Stopped`, minus metrics ticks.
pub async fn drain_until_stopped(rx: &mut broadcast::Receiver<ProcessorEvent>) -> Vec<ProcessorEvent> {
    let mut seen = Vec::new();
    loop {
        match rx.recv().await {
            Ok(ProcessorEvent::Metrics(_)) => continue,
            Ok(ProcessorEvent::Stopped) => {
                seen.push(ProcessorEvent::Stopped);
                return seen;
            }
            Ok(other) => seen.push(other),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => panic!("processor event channel closed"),
        }
    }
}
