//! Bounded FIFO of admitted events awaiting dispatch.

use std::collections::VecDeque;

use serde::Serialize;
use syncd_core::{ChangeEvent, Priority};

use crate::metrics::PriorityCounts;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub priority_breakdown: PriorityCounts,
    pub oldest_event: Option<ChangeEvent>,
}

#[derive(Debug)]
pub struct BoundedQueue {
    capacity: usize,
    entries: VecDeque<ChangeEvent>,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append `event`. When full, the oldest entry is evicted and returned.
    pub fn push(&mut self, event: ChangeEvent) -> Option<ChangeEvent> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(event);
        evicted
    }

    pub fn pop_front(&mut self) -> Option<ChangeEvent> {
        self.entries.pop_front()
    }

    /// Take every queued event in arrival order.
    pub fn drain_all(&mut self) -> Vec<ChangeEvent> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_where(&self, pred: impl Fn(Priority) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e.priority)).count()
    }

    pub fn status(&self) -> QueueStatus {
        let mut breakdown = PriorityCounts::default();
        for event in &self.entries {
            breakdown.increment(event.priority);
        }
        QueueStatus {
            size: self.entries.len(),
            priority_breakdown: breakdown,
            oldest_event: self.entries.front().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncd_core::{ChangePayload, FileMetadata};

    fn event(i: usize, priority: Priority) -> ChangeEvent {
        ChangeEvent::new(
            ChangePayload::File(FileMetadata::default()),
            "modified",
            format!("f{i}.txt"),
            "file-watcher",
        )
        .with_id(format!("evt-{i}"))
        .with_priority(priority)
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut queue = BoundedQueue::new(1000);
        let mut evicted = Vec::new();
        for i in 0..1001 {
            if let Some(old) = queue.push(event(i, Priority::Low)) {
                evicted.push(old.id.0);
            }
            assert!(queue.len() <= 1000);
        }
        assert_eq!(evicted, vec!["evt-0"]);
        let status = queue.status();
        assert_eq!(status.size, 1000);
        assert_eq!(status.oldest_event.map(|e| e.id.0), Some("evt-1".to_string()));
        assert_eq!(queue.drain_all().last().map(|e| e.id.0.clone()), Some("evt-1000".to_string()));
    }

    #[test]
    fn status_breaks_down_by_priority() {
        let mut queue = BoundedQueue::new(10);
        queue.push(event(0, Priority::Critical));
        queue.push(event(1, Priority::Low));
        queue.push(event(2, Priority::Low));
        let status = queue.status();
        assert_eq!(status.priority_breakdown.critical, 1);
        assert_eq!(status.priority_breakdown.low, 2);
        assert_eq!(queue.count_where(Priority::is_urgent), 1);
    }
}
