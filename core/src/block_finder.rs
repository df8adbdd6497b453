//! C6 — BlockFinder: owns a background scan of the compressed stream for
//! block-boundary magics and exposes the growing, ordered list of bit
//! offsets found so far (spec.md §4.6).
//!
//! Grounded on `parallel_bzip2::lib::scan_blocks`, which spawns a
//! scanner thread and reorders its chunked output into a flat sequence
//! the caller iterates; this type generalizes that into a standing
//! background worker other components (`BlockFetcher`, C12) can query by
//! index without having to consume the whole stream up front, backed by
//! [`StreamedResults`] (C5) instead of a one-shot channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::parallel_bit_string_finder::ParallelBitStringFinder;
use crate::streamed_results::StreamedResults;

/// Default prefetch window recommended to callers driving `BlockFinder`
/// ahead of decode demand (spec.md: `3 * hardware_concurrency`).
pub fn default_prefetch_count() -> usize {
    3 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

enum Source {
    /// Offsets are produced lazily by a background scanner thread.
    Scanning(Mutex<Option<JoinHandle<()>>>),
    /// Offsets were supplied up front (e.g. imported from a persisted
    /// index) — nothing to scan, the list is immediately finalized.
    Fixed,
}

pub struct BlockFinder {
    offsets: Arc<StreamedResults<u64>>,
    source: Source,
    highest_requested: AtomicU64,
}

impl BlockFinder {
    /// Starts a background thread that drains `finder` into `offsets`
    /// until exhausted, then finalizes.
    pub fn new(mut finder: ParallelBitStringFinder) -> Self {
        let offsets = Arc::new(StreamedResults::new());
        let offsets_for_thread = offsets.clone();
        let handle = std::thread::Builder::new()
            .name("block-finder".into())
            .spawn(move || {
                while let Some(offset) = finder.find() {
                    offsets_for_thread.push(offset);
                }
                offsets_for_thread.finalize(None);
            })
            .expect("failed to spawn block-finder thread");
        Self {
            offsets,
            source: Source::Scanning(Mutex::new(Some(handle))),
            highest_requested: AtomicU64::new(0),
        }
    }

    /// Builds a finder whose offsets are already fully known (imported
    /// index), skipping the scan entirely.
    pub fn from_known_offsets(offsets: Vec<u64>) -> Self {
        let results = Arc::new(StreamedResults::new());
        for o in &offsets {
            results.push(*o);
        }
        results.finalize(Some(offsets.len()));
        Self {
            offsets: results,
            source: Source::Fixed,
            highest_requested: AtomicU64::new(0),
        }
    }

    /// Blocks (up to `timeout`) for the `i`th discovered block-boundary
    /// offset. Updates the high-water mark so callers using this to drive
    /// prefetch scheduling can read back how far ahead they've reached.
    pub fn get(&self, i: usize, timeout: Option<Duration>) -> Option<u64> {
        self.highest_requested.fetch_max(i as u64, Ordering::Relaxed);
        self.offsets.get(i, timeout)
    }

    pub fn highest_requested_block_number(&self) -> u64 {
        self.highest_requested.load(Ordering::Relaxed)
    }

    /// Number of offsets discovered so far (not necessarily final unless
    /// `finalized()`).
    pub fn size(&self) -> usize {
        self.offsets.size()
    }

    pub fn finalized(&self) -> bool {
        self.offsets.finalized()
    }

    /// Finds the block number whose offset is the greatest value `<=
    /// offset_in_bits`, via bisection over the (monotonically
    /// increasing) discovered offsets. Blocks while bisecting into
    /// not-yet-discovered territory; `None` if `offset_in_bits` precedes
    /// the first block or the finder is empty.
    pub fn find(&self, offset_in_bits: u64) -> Result<Option<u64>> {
        let first = match self.get(0, None) {
            Some(v) => v,
            None => return Ok(None),
        };
        if offset_in_bits < first {
            return Ok(None);
        }

        let _ = first;
        let mut lo: usize = 0;
        let mut hi: usize = 1;
        // Exponential probe to find an upper bound that's either past
        // offset_in_bits or past the end of the (possibly still-growing)
        // sequence.
        loop {
            match self.get(hi, None) {
                Some(v) if v <= offset_in_bits => {
                    lo = hi;
                    hi *= 2;
                }
                _ => break,
            }
            if hi > 1 << 40 {
                return Err(CoreError::logic("block finder bisection did not converge"));
            }
        }

        let mut known_hi = hi;
        while known_hi > lo + 1 {
            let mid = lo + (known_hi - lo) / 2;
            match self.get(mid, None) {
                Some(v) if v <= offset_in_bits => lo = mid,
                _ => known_hi = mid,
            }
        }
        Ok(Some(lo as u64))
    }
}

impl Drop for BlockFinder {
    fn drop(&mut self) {
        if let Source::Scanning(handle) = &self.source {
            if let Some(h) = handle.lock().unwrap().take() {
                let _ = h.join();
            }
        }
    }
}
