//! Recent-hash duplicate filter.
//!
//! Keys are SHA-256 hex digests of the event's identity tuple:
//!
//! - [`DedupStrategy::Exact`]: `type:operation:target:timestamp`. Two
//!   observations of the same change at different instants are *not*
//!   duplicates.
//! - [`DedupStrategy::ContentWindow`]: `type:operation:target`, and a repeat
//!   only counts as a duplicate while it falls within `window_ms` of the
//!   last sighting.
//!
//! The set is bounded by `capacity`; once exceeded, only the newest half of
//! the keys (by first insertion) is kept.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use syncd_core::{ChangeEvent, DedupConfig, DedupStrategy};
use tokio::time::Instant;

#[derive(Debug)]
pub struct RecentHashes {
    strategy: DedupStrategy,
    window: Duration,
    capacity: usize,
    seen: HashMap<String, Instant>,
    order: VecDeque<String>,
}

impl RecentHashes {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            strategy: config.strategy,
            window: Duration::from_millis(config.window_ms),
            capacity: config.capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `event` and report whether it had already been seen.
    pub fn check_and_insert(&mut self, event: &ChangeEvent, now: Instant) -> bool {
        let key = event_key(event, self.strategy);
        if let Some(seen_at) = self.seen.get_mut(&key) {
            match self.strategy {
                DedupStrategy::Exact => return true,
                DedupStrategy::ContentWindow => {
                    let fresh = now.saturating_duration_since(*seen_at) < self.window;
                    *seen_at = now;
                    return fresh;
                }
            }
        }

        self.seen.insert(key.clone(), now);
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            let keep = self.capacity / 2;
            while self.order.len() > keep {
                if let Some(old) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn event_key(event: &ChangeEvent, strategy: DedupStrategy) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.change_type().as_str());
    hasher.update(b":");
    hasher.update(event.operation.as_bytes());
    hasher.update(b":");
    hasher.update(event.target.as_bytes());
    if strategy == DedupStrategy::Exact {
        hasher.update(b":");
        hasher.update(
            event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .as_bytes(),
        );
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use syncd_core::{ChangePayload, FileMetadata};

    fn event(target: &str) -> ChangeEvent {
        ChangeEvent::new(
            ChangePayload::File(FileMetadata::default()),
            "modified",
            target,
            "file-watcher",
        )
    }

    fn config(strategy: DedupStrategy, capacity: usize) -> DedupConfig {
        DedupConfig {
            strategy,
            window_ms: 500,
            capacity,
        }
    }

    #[test]
    fn exact_same_tuple_is_duplicate() {
        let now = Instant::now();
        let mut hashes = RecentHashes::new(&config(DedupStrategy::Exact, 100));
        let first = event("src/a.rs");
        let replay = first.clone().with_id("evt_other");
        assert!(!hashes.check_and_insert(&first, now));
        assert!(hashes.check_and_insert(&replay, now));
    }

    #[test]
    fn exact_distinguishes_timestamps() {
        let now = Instant::now();
        let mut hashes = RecentHashes::new(&config(DedupStrategy::Exact, 100));
        let first = event("src/a.rs");
        let later = first
            .clone()
            .with_timestamp(first.timestamp + chrono::Duration::milliseconds(1));
        assert!(!hashes.check_and_insert(&first, now));
        assert!(!hashes.check_and_insert(&later, now));
    }

    #[test]
    fn content_window_collapses_repeats_inside_window() {
        let now = Instant::now();
        let mut hashes = RecentHashes::new(&config(DedupStrategy::ContentWindow, 100));
        let first = event("src/a.rs");
        let again = event("src/a.rs").with_timestamp(Utc::now());
        assert!(!hashes.check_and_insert(&first, now));
        assert!(hashes.check_and_insert(&again, now + Duration::from_millis(200)));
        assert!(!hashes.check_and_insert(&again, now + Duration::from_millis(900)));
    }

    #[test]
    fn overflow_keeps_newest_half() {
        let now = Instant::now();
        let mut hashes = RecentHashes::new(&config(DedupStrategy::Exact, 10));
        let events: Vec<_> = (0..11).map(|i| event(&format!("f{i}"))).collect();
        for e in &events {
            hashes.check_and_insert(e, now);
        }
        assert_eq!(hashes.len(), 5);
        assert!(hashes.check_and_insert(&events[10], now));
        assert!(!hashes.check_and_insert(&events[0], now));
    }
}
