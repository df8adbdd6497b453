//! C7 — BlockMap: the sorted, thread-safe table mapping each block's
//! encoded (compressed-stream bit) span to its decoded (decompressed
//! byte-stream) span (spec.md §3, §4.7).
//!
//! This is the piece the teacher's `GZIDX`-less design never needed,
//! since `parallel_bzip2` always decodes front-to-back rather than
//! supporting random access by decoded position — grounded instead on
//! the record shape spec.md §3 spells out directly, and on
//! [`crate::block_finder::BlockFinder`] (C6) for the locking/finalization
//! shape shared across the two maps.

use std::sync::Mutex;

use crate::error::{CoreError, Result};

/// One block's full boundary record (spec.md §3): where it starts and
/// how big it is in the compressed stream (bits), and where its decoded
/// output starts and how big it is in the uncompressed stream (bytes).
/// An end-of-stream record has `decoded_size_bytes == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub encoded_offset_bits: u64,
    pub encoded_size_bits: u64,
    pub decoded_offset_bytes: u64,
    pub decoded_size_bytes: u64,
}

impl BlockRecord {
    pub fn is_eos(&self) -> bool {
        self.decoded_size_bytes == 0
    }

    /// Whether decoded byte `d` falls within this block's decoded span.
    pub fn contains(&self, d: u64) -> bool {
        d >= self.decoded_offset_bytes && d < self.decoded_offset_bytes + self.decoded_size_bytes
    }

    pub fn encoded_end_bits(&self) -> u64 {
        self.encoded_offset_bits + self.encoded_size_bits
    }

    pub fn decoded_end_bytes(&self) -> u64 {
        self.decoded_offset_bytes + self.decoded_size_bytes
    }
}

struct Inner {
    entries: Vec<BlockRecord>,
    eos_count: usize,
    finalized: bool,
}

pub struct BlockMap {
    inner: Mutex<Inner>,
}

impl BlockMap {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                eos_count: 0,
                finalized: false,
            }),
        }
    }

    /// Appends a block record built from `(encoded_offset, encoded_size,
    /// decoded_size)`, computing `decoded_offset_bytes` as the running
    /// total (spec.md §3's invariant
    /// `decodedOffset[i+1] = decodedOffset[i] + decodedSize[i]`).
    ///
    /// The encoded offset must be strictly greater than the previous
    /// entry's; a duplicate encoded offset is silently ignored if the
    /// implied decoded size matches (the same block reported twice by
    /// racing prefetches) and is a `Usage` error otherwise (disagreement
    /// about a block's size is a real bug, not a benign race).
    pub fn push(
        &self,
        encoded_offset_bits: u64,
        encoded_size_bits: u64,
        decoded_size_bytes: u64,
    ) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.finalized {
            return Err(CoreError::usage("push into a finalized BlockMap"));
        }

        if let Some(last) = guard.entries.last().copied() {
            if encoded_offset_bits == last.encoded_offset_bits {
                if encoded_size_bits == last.encoded_size_bits
                    && decoded_size_bytes == last.decoded_size_bytes
                {
                    return Ok(());
                }
                return Err(CoreError::usage(format!(
                    "conflicting record for encoded offset {encoded_offset_bits}"
                )));
            }
            if encoded_offset_bits < last.encoded_offset_bits {
                return Err(CoreError::usage(
                    "BlockMap entries must have strictly increasing encoded offsets",
                ));
            }
        }

        let decoded_offset_bytes = guard
            .entries
            .last()
            .map(|b| b.decoded_end_bytes())
            .unwrap_or(0);
        let record = BlockRecord {
            encoded_offset_bits,
            encoded_size_bits,
            decoded_offset_bytes,
            decoded_size_bytes,
        };
        if record.is_eos() {
            guard.eos_count += 1;
        }
        guard.entries.push(record);
        Ok(())
    }

    /// Finds the record containing decoded byte `decoded_offset_bytes`,
    /// via bisection over the (monotonically increasing) decoded
    /// offsets. If `decoded_offset_bytes` is past the last record's end,
    /// returns the last record anyway (per spec.md §3); the caller
    /// distinguishes "found" from "past the end" with
    /// [`BlockRecord::contains`]. `None` only when the map is empty.
    pub fn find_data_offset(&self, decoded_offset_bytes: u64) -> Option<BlockRecord> {
        let guard = self.inner.lock().unwrap();
        if guard.entries.is_empty() {
            return None;
        }
        let idx = guard
            .entries
            .partition_point(|b| b.decoded_offset_bytes <= decoded_offset_bytes);
        let idx = idx.saturating_sub(1).min(guard.entries.len() - 1);
        Some(guard.entries[idx])
    }

    /// Total records minus end-of-stream records (spec.md §4.7).
    pub fn data_block_count(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.entries.len() - guard.eos_count
    }

    pub fn back(&self) -> Option<BlockRecord> {
        self.inner.lock().unwrap().entries.last().copied()
    }

    pub fn block_offsets(&self) -> Vec<BlockRecord> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Replaces the whole map at once (e.g. importing a persisted
    /// index) and finalizes it. Entries must already be sorted by
    /// strictly increasing encoded offset and have internally consistent
    /// decoded offsets.
    pub fn set_block_offsets(&self, entries: Vec<BlockRecord>) -> Result<()> {
        for pair in entries.windows(2) {
            if pair[1].encoded_offset_bits <= pair[0].encoded_offset_bits {
                return Err(CoreError::usage(
                    "imported block offsets are not strictly increasing",
                ));
            }
            if pair[1].decoded_offset_bytes != pair[0].decoded_end_bytes() {
                return Err(CoreError::usage(
                    "imported block offsets have inconsistent decoded sizes",
                ));
            }
        }
        let eos_count = entries.iter().filter(|b| b.is_eos()).count();
        let mut guard = self.inner.lock().unwrap();
        guard.entries = entries;
        guard.eos_count = eos_count;
        guard.finalized = true;
        Ok(())
    }

    pub fn finalized(&self) -> bool {
        self.inner.lock().unwrap().finalized
    }

    pub fn finalize(&self) {
        self.inner.lock().unwrap().finalized = true;
    }
}

impl Default for BlockMap {
    fn default() -> Self {
        Self::new()
    }
}
