//! Rolling processing counters and the bounded audit history.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use syncd_core::{ChangeEvent, Priority};
use tokio::time::Instant;

use crate::tuning::THROUGHPUT_WINDOW;

/// One counter per priority tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorityCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl PriorityCounts {
    pub fn get(&self, priority: Priority) -> u64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn increment(&mut self, priority: Priority) {
        let slot = match priority {
            Priority::Critical => &mut self.critical,
            Priority::High => &mut self.high,
            Priority::Medium => &mut self.medium,
            Priority::Low => &mut self.low,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.critical + self.high + self.medium + self.low
    }
}

/// Point-in-time copy of the processor counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingMetrics {
    /// Events that reached a terminal outcome (processed, conflict, failed).
    pub total_processed: u64,
    pub current_queue_size: usize,
    pub average_processing_time_ms: f64,
    pub error_rate: f64,
    /// Completions within the trailing 60 seconds.
    pub throughput: usize,
    pub batches_processed: u64,
    pub duplicates_filtered: u64,
    pub rate_limited: u64,
    pub queue_evictions: u64,
    pub conflicts: u64,
    /// Admitted events per priority.
    pub priority_distribution: PriorityCounts,
}

/// Owned by the processor actor; every update goes through here.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    metrics: ProcessingMetrics,
    completions: VecDeque<Instant>,
}

impl MetricsRecorder {
    pub fn record_admission(&mut self, priority: Priority) {
        self.metrics.priority_distribution.increment(priority);
    }

    pub fn record_duplicate(&mut self) {
        self.metrics.duplicates_filtered += 1;
    }

    pub fn record_rate_limited(&mut self) {
        self.metrics.rate_limited += 1;
    }

    pub fn record_eviction(&mut self) {
        self.metrics.queue_evictions += 1;
    }

    pub fn record_conflict(&mut self) {
        self.metrics.conflicts += 1;
    }

    pub fn record_batch(&mut self) {
        self.metrics.batches_processed += 1;
    }

    /// Fold one terminal outcome into the incremental mean and error rate.
    pub fn record_outcome(&mut self, elapsed: Duration, success: bool, now: Instant) {
        let m = &mut self.metrics;
        m.total_processed += 1;
        let n = m.total_processed as f64;
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        m.average_processing_time_ms += (elapsed_ms - m.average_processing_time_ms) / n;
        let failure = if success { 0.0 } else { 1.0 };
        m.error_rate += (failure - m.error_rate) / n;

        self.completions.push_back(now);
        self.prune(now);
    }

    pub fn snapshot(&mut self, queue_len: usize, now: Instant) -> ProcessingMetrics {
        self.prune(now);
        ProcessingMetrics {
            current_queue_size: queue_len,
            throughput: self.completions.len(),
            ..self.metrics.clone()
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.completions.front() {
            if now.saturating_duration_since(oldest) > THROUGHPUT_WINDOW {
                self.completions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Completed events, oldest evicted first.
#[derive(Debug)]
pub struct History {
    capacity: usize,
    entries: VecDeque<ChangeEvent>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, event: ChangeEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ChangeEvent> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
