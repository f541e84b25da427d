//! Bounded FIFO of publishes awaiting delivery
//!
//! Delivery contract:
//! - older entries are retried before newer ones
//! - a full queue refuses new entries instead of evicting old ones
//! - an entry is discarded on its third failed retry
//! - one drain pass makes at most [`DRAIN_BUDGET`] attempts
//!
//! Contents live in memory only and are lost on power loss or disable.

use crate::error::{UplinkError, UplinkResult};
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const QUEUE_CAPACITY: usize = 10;
pub const MAX_RETRIES: u8 = 3;
pub const DRAIN_BUDGET: usize = 3;

/// A publish that has not been delivered yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPublish {
    /// Caller-supplied identifier reported back through the publish observer
    pub id: u32,
    pub topic: String,
    pub payload: Vec<u8>,
    pub retry_count: u8,
}

impl PendingPublish {
    pub fn new(id: u32, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id,
            topic: topic.into(),
            payload,
            retry_count: 0,
        }
    }
}

/// Result of one retry inside a drain pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrainOutcome {
    Delivered { id: u32 },
    Requeued { id: u32, retry_count: u8 },
    Dropped { id: u32 },
}

#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: VecDeque<PendingPublish>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(QUEUE_CAPACITY),
        }
    }

    /// Append an entry, refusing when full
    pub fn push(&mut self, entry: PendingPublish) -> UplinkResult<()> {
        if self.entries.len() >= QUEUE_CAPACITY {
            warn!(
                "Retry queue full, dropping publish {} on {}",
                entry.id, entry.topic
            );
            return Err(UplinkError::queue_exhausted(QUEUE_CAPACITY));
        }
        debug!("Queued publish {} ({} pending)", entry.id, self.entries.len() + 1);
        self.entries.push_back(entry);
        Ok(())
    }

    /// Retry up to `min(DRAIN_BUDGET, len)` entries from the front
    ///
    /// `send` returns whether the transport accepted the entry. A failed
    /// entry goes to the back, so no entry is retried twice in one pass.
    pub fn drain<F>(&mut self, mut send: F) -> Vec<DrainOutcome>
    where
        F: FnMut(&PendingPublish) -> bool,
    {
        let budget = DRAIN_BUDGET.min(self.entries.len());
        let mut outcomes = Vec::with_capacity(budget);

        for _ in 0..budget {
            let Some(mut entry) = self.entries.pop_front() else {
                break;
            };

            if send(&entry) {
                debug!("Retried publish {} delivered", entry.id);
                outcomes.push(DrainOutcome::Delivered { id: entry.id });
                continue;
            }

            entry.retry_count += 1;
            if entry.retry_count >= MAX_RETRIES {
                warn!(
                    "Publish {} dropped after {} failed retries",
                    entry.id, entry.retry_count
                );
                outcomes.push(DrainOutcome::Dropped { id: entry.id });
            } else {
                outcomes.push(DrainOutcome::Requeued {
                    id: entry.id,
                    retry_count: entry.retry_count,
                });
                self.entries.push_back(entry);
            }
        }

        outcomes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= QUEUE_CAPACITY
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingPublish> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(id: u32) -> PendingPublish {
        PendingPublish::new(id, format!("records/dev/items/{id}"), vec![b'{', b'}'])
    }

    #[test]
    fn test_eleventh_push_is_refused() {
        let mut queue = RetryQueue::new();
        for id in 0..10 {
            queue.push(entry(id)).unwrap();
        }
        let result = queue.push(entry(10));
        assert!(matches!(
            result,
            Err(UplinkError::QueueExhausted { capacity: 10 })
        ));

        let ids: Vec<u32> = queue.iter().map(|e| e.id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_respects_budget_and_order() {
        let mut queue = RetryQueue::new();
        for id in 0..5 {
            queue.push(entry(id)).unwrap();
        }

        let mut sent = Vec::new();
        let outcomes = queue.drain(|e| {
            sent.push(e.id);
            true
        });

        assert_eq!(sent, vec![0, 1, 2]);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().next().map(|e| e.id), Some(3));
    }

    #[test]
    fn test_single_entry_retried_once_per_pass() {
        let mut queue = RetryQueue::new();
        queue.push(entry(1)).unwrap();

        let mut attempts = 0;
        let outcomes = queue.drain(|_| {
            attempts += 1;
            false
        });
        assert_eq!(attempts, 1);
        assert_eq!(
            outcomes,
            vec![DrainOutcome::Requeued {
                id: 1,
                retry_count: 1
            }]
        );
    }

    #[test]
    fn test_entry_dropped_on_third_failure() {
        let mut queue = RetryQueue::new();
        queue.push(entry(7)).unwrap();

        let mut attempts = 0;
        for _ in 0..5 {
            queue.drain(|_| {
                attempts += 1;
                false
            });
        }
        assert_eq!(attempts, 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_entries_move_behind_newer_ones() {
        let mut queue = RetryQueue::new();
        for id in 0..4 {
            queue.push(entry(id)).unwrap();
        }
        queue.drain(|e| e.id != 0);
        let ids: Vec<u32> = queue.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 0]);
    }

    proptest! {
        #[test]
        fn prop_queue_never_exceeds_capacity(
            ops in proptest::collection::vec(any::<(bool, bool)>(), 0..200)
        ) {
            let mut queue = RetryQueue::new();
            let mut next_id = 0u32;
            for (push, deliver) in ops {
                if push {
                    let was_full = queue.is_full();
                    let result = queue.push(entry(next_id));
                    prop_assert_eq!(result.is_err(), was_full);
                    next_id += 1;
                } else {
                    let outcomes = queue.drain(|_| deliver);
                    prop_assert!(outcomes.len() <= DRAIN_BUDGET);
                }
                prop_assert!(queue.len() <= QUEUE_CAPACITY);
            }
        }
    }
}
