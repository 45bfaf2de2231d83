//! The bounded, cursor-ordered envelope timeline and its eviction policy.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::envelope::Envelope;

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// In-memory, strictly cursor-ordered record of emitted envelopes,
/// bounded by count (`max_size`) and age (`max_age`). Either bound is
/// disabled by passing `0`/`None`.
pub struct Timeline {
    entries: VecDeque<Envelope>,
    max_size: usize,
    max_age: Option<Duration>,
}

impl Timeline {
    pub fn new(max_size: usize, max_age: Option<Duration>) -> Self {
        Timeline {
            entries: VecDeque::new(),
            max_size,
            max_age,
        }
    }

    pub fn push(&mut self, envelope: Envelope) {
        self.entries.push_back(envelope);
        self.evict();
    }

    /// Removes envelopes past the size bound, then past the age bound.
    /// Oldest-first, matching cursor order.
    pub fn evict(&mut self) -> usize {
        let mut removed = 0;
        if self.max_size > 0 {
            while self.entries.len() > self.max_size {
                self.entries.pop_front();
                removed += 1;
            }
        }
        if let Some(max_age) = self.max_age {
            let cutoff = now_secs().saturating_sub(max_age.as_secs());
            while let Some(front) = self.entries.front() {
                if front.bookmark.timestamp_secs < cutoff {
                    self.entries.pop_front();
                    removed += 1;
                } else {
                    break;
                }
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn range(&self, offset: usize, limit: usize) -> Vec<Envelope> {
        self.entries.iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn since(&self, cursor: u64) -> Vec<Envelope> {
        self.entries
            .iter()
            .filter(|e| e.cursor > cursor)
            .cloned()
            .collect()
    }

    pub fn filtered(&self, predicate: impl Fn(&Envelope) -> bool) -> Vec<Envelope> {
        self.entries.iter().filter(|e| predicate(e)).cloned().collect()
    }
}
