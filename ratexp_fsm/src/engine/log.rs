//! Transition history ring.
//!
//! Fixed capacity `K`, preallocated. Keeps the latest `K` records in order
//! and a cumulative count `N` since the last clear. Record `i` (cumulative,
//! 0-based) is retained iff `N - K <= i < N`.

use ratexp_common::consts::MSG_MAX_TRANSITIONS;
use ratexp_common::fsm::transition::{StateTransition, TransitionBatch};

#[derive(Debug, Clone)]
pub struct TransitionLog {
    buf: Vec<StateTransition>,
    capacity: usize,
    /// Cumulative number of records pushed.
    count: u64,
}

impl TransitionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: vec![StateTransition::default(); capacity],
            capacity,
            count: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cumulative count since the last clear.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of records currently retained.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.min(self.capacity as u64) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Cumulative index of the oldest retained record.
    #[inline]
    pub fn oldest_index(&self) -> u64 {
        self.count - self.len() as u64
    }

    /// Append, overwriting the oldest record when full. O(1).
    #[inline]
    pub fn push(&mut self, record: StateTransition) {
        let slot = (self.count % self.capacity as u64) as usize;
        self.buf[slot] = record;
        self.count += 1;
    }

    /// Record at cumulative index `index`, if still retained.
    #[inline]
    pub fn get(&self, index: u64) -> Option<&StateTransition> {
        if index < self.oldest_index() || index >= self.count {
            return None;
        }
        Some(&self.buf[(index % self.capacity as u64) as usize])
    }

    #[inline]
    pub fn latest(&self) -> Option<&StateTransition> {
        self.count.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Up to `max` records (never more than one message worth) starting at
    /// cumulative index `from`, clamped to the oldest retained record.
    pub fn batch(&self, from: u64, max: usize) -> TransitionBatch {
        let from = from.max(self.oldest_index());
        let mut batch = TransitionBatch {
            from,
            transitions: heapless::Vec::new(),
        };
        let max = max.min(MSG_MAX_TRANSITIONS) as u64;
        let end = self.count.min(from.saturating_add(max));
        let mut index = from;
        while index < end {
            if let Some(record) = self.get(index) {
                // Bounded by MSG_MAX_TRANSITIONS above.
                let _ = batch.transitions.push(*record);
            }
            index += 1;
        }
        batch
    }

    /// Forget every record and zero the count. Storage is kept.
    pub fn clear(&mut self) {
        self.count = 0;
    }
}
