//! Batch formation and the batch-timeout deadline.

use chrono::{DateTime, Utc};
use std::time::Duration;

use syncd_core::{BatchId, ChangeEvent, ChangeType, Priority};
use tokio::time::Instant;

use crate::queue::BoundedQueue;

/// A priority- and type-homogeneous group of events dispatched together.
#[derive(Debug, Clone)]
pub struct ProcessingBatch {
    pub id: BatchId,
    pub events: Vec<ChangeEvent>,
    pub priority: Priority,
    pub category: ChangeType,
    pub created: DateTime<Utc>,
}

impl ProcessingBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Partition `events` by priority, then by type (first-seen order), then
/// chunk each partition into at most `batch_size` events.
///
/// The result is ordered `critical > high > medium > low`; batches of equal
/// priority keep formation order.
pub fn form_batches(events: Vec<ChangeEvent>, batch_size: usize) -> Vec<ProcessingBatch> {
    let batch_size = batch_size.max(1);
    let created = Utc::now();
    let mut batches = Vec::new();

    for priority in Priority::ALL {
        let mut by_type: Vec<(ChangeType, Vec<ChangeEvent>)> = Vec::new();
        for event in events.iter().filter(|e| e.priority == priority) {
            let change_type = event.change_type();
            match by_type.iter_mut().find(|(t, _)| *t == change_type) {
                Some((_, group)) => group.push(event.clone()),
                None => by_type.push((change_type, vec![event.clone()])),
            }
        }

        for (category, group) in by_type {
            for chunk in group.chunks(batch_size) {
                batches.push(ProcessingBatch {
                    id: BatchId::generate(),
                    events: chunk.to_vec(),
                    priority,
                    category,
                    created,
                });
            }
        }
    }
    batches
}

/// Whether the queue should be dispatched now instead of waiting for the
/// batch timeout: any critical event, a full batch, or at least half a batch
/// of critical/high events.
pub fn should_flush_eagerly(queue: &BoundedQueue, batch_size: usize) -> bool {
    if queue.count_where(|p| p == Priority::Critical) > 0 {
        return true;
    }
    if queue.len() >= batch_size {
        return true;
    }
    queue.count_where(Priority::is_urgent) * 2 >= batch_size
}

/// The batch-formation timer as a plain deadline.
///
/// Armed on the first admission after an idle period; re-arming an armed
/// scheduler keeps the original deadline.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.timeout);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncd_core::{ChangePayload, FileMetadata, GitMetadata};

    fn file(i: usize, priority: Priority) -> ChangeEvent {
        ChangeEvent::new(
            ChangePayload::File(FileMetadata::default()),
            "modified",
            format!("f{i}"),
            "file-watcher",
        )
        .with_priority(priority)
        .with_id(format!("file-{i}"))
    }

    fn git(i: usize, priority: Priority) -> ChangeEvent {
        ChangeEvent::new(
            ChangePayload::Git(GitMetadata::default()),
            "status",
            "main",
            "git-monitor",
        )
        .with_priority(priority)
        .with_id(format!("git-{i}"))
    }

    #[test]
    fn batches_are_homogeneous_and_priority_ordered() {
        let events = vec![
            file(0, Priority::Low),
            git(1, Priority::High),
            file(2, Priority::Critical),
            file(3, Priority::High),
            git(4, Priority::Low),
            file(5, Priority::Medium),
        ];
        let batches = form_batches(events, 10);
        let shape: Vec<_> = batches.iter().map(|b| (b.priority, b.category)).collect();
        assert_eq!(
            shape,
            vec![
                (Priority::Critical, ChangeType::File),
                (Priority::High, ChangeType::Git),
                (Priority::High, ChangeType::File),
                (Priority::Medium, ChangeType::File),
                (Priority::Low, ChangeType::File),
                (Priority::Low, ChangeType::Git),
            ]
        );
        for batch in &batches {
            assert!(batch
                .events
                .iter()
                .all(|e| e.priority == batch.priority && e.change_type() == batch.category));
        }
    }

    #[test]
    fn partitions_are_chunked_by_batch_size() {
        let events: Vec<_> = (0..25).map(|i| file(i, Priority::Medium)).collect();
        let sizes: Vec<_> = form_batches(events, 10).iter().map(ProcessingBatch::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn eager_trigger_conditions() {
        let mut queue = BoundedQueue::new(100);
        for i in 0..3 {
            queue.push(file(i, Priority::Low));
        }
        assert!(!should_flush_eagerly(&queue, 10));

        let mut urgent = BoundedQueue::new(100);
        for i in 0..5 {
            urgent.push(file(i, Priority::High));
        }
        assert!(should_flush_eagerly(&urgent, 10));
        assert!(!should_flush_eagerly(&urgent, 11));

        queue.push(file(9, Priority::Critical));
        assert!(should_flush_eagerly(&queue, 10));

        let mut full = BoundedQueue::new(100);
        for i in 0..10 {
            full.push(file(i, Priority::Low));
        }
        assert!(should_flush_eagerly(&full, 10));
    }

    #[test]
    fn scheduler_keeps_first_deadline() {
        let now = Instant::now();
        let mut scheduler = BatchScheduler::new(Duration::from_secs(1));
        scheduler.arm(now);
        scheduler.arm(now + Duration::from_millis(600));
        assert_eq!(scheduler.deadline(), Some(now + Duration::from_secs(1)));
        assert!(!scheduler.is_due(now + Duration::from_millis(999)));
        assert!(scheduler.is_due(now + Duration::from_secs(1)));
        scheduler.disarm();
        assert_eq!(scheduler.deadline(), None);
    }
}
