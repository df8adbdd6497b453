//! C10 — FetchingStrategy: decides which block numbers to prefetch next
//! given recent access history (spec.md §4.10).
//!
//! No direct teacher equivalent (the teacher always fetches strictly
//! sequentially), so this is grounded on spec.md's description of the
//! "FetchNextSmart" adaptive strategy: detect a short run of
//! strictly-increasing accesses and extrapolate forward, falling back to
//! "just the next block" otherwise. Kept as a trait (`FetchingStrategy`)
//! so `BlockFetcher` (C12) can substitute a pure-sequential strategy in
//! tests without needing the adaptive heuristic's history window.

use std::collections::VecDeque;

/// Given the most recent accessed block numbers (oldest first) and the
/// cache's capacity, returns the block numbers to prefetch next, in
/// priority order (nearest first).
pub trait FetchingStrategy: Send {
    fn on_access(&mut self, block_number: u64);
    fn next_prefetch(&self, cache_capacity: usize) -> Vec<u64>;
}

/// Tracks the last `HISTORY_LEN` accesses; if they form a strictly
/// increasing run, predicts the next `HISTORY_LEN` - 1 blocks following
/// the most recent access (never re-predicting the block just accessed).
/// Prediction count is always strictly less than `cache_capacity` so a
/// single prefetch burst can never itself evict everything it's about to
/// need.
pub struct FetchNextSmart {
    history: VecDeque<u64>,
}

const HISTORY_LEN: usize = 5;

impl FetchNextSmart {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    fn is_strictly_increasing_run(&self) -> bool {
        self.history.len() >= 2
            && self
                .history
                .iter()
                .zip(self.history.iter().skip(1))
                .all(|(a, b)| b == &(a + 1))
    }
}

impl Default for FetchNextSmart {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchingStrategy for FetchNextSmart {
    fn on_access(&mut self, block_number: u64) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(block_number);
    }

    fn next_prefetch(&self, cache_capacity: usize) -> Vec<u64> {
        let Some(&last) = self.history.back() else {
            return Vec::new();
        };
        let run_len = if self.is_strictly_increasing_run() {
            self.history.len()
        } else {
            1
        };
        let max_predictions = cache_capacity.saturating_sub(1).max(1);
        let count = run_len.min(max_predictions);
        (1..=count as u64).map(|i| last + i).collect()
    }
}
