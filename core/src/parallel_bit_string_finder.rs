//! C4 — ParallelBitStringFinder: parallelizes [`BitStringFinder`] (C3)
//! over overlapping byte chunks, preserving a globally monotonically
//! increasing result order (spec.md §4.4).
//!
//! Grounded on `parallel_bzip2::scanner::Scanner::scan_stream`
//! (`parallel_bzip2/src/scanner.rs`), which partitions the input into
//! fixed-size chunks with an 8-byte overlap and scans each chunk on a
//! dedicated pool, sending `(chunk_index, matches)` back over a
//! channel for the caller to reorder. That scanner used Rayon's
//! `pool.scope` with all chunks dispatched up front; this version keeps
//! the same chunk/overlap/thread-pool shape but gives each chunk its
//! own bounded FIFO and a dedicated worker thread so `find()` can drain
//! results incrementally while later chunks are still being scanned —
//! spec.md requires a finder whose caller can interleave `find()` calls
//! with the scan itself rather than wait for the whole input to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::bit_string_finder::BitStringFinder;
use crate::byte_source::SliceSource;
use crate::error::{CoreError, Result};

enum WorkerMsg {
    Offset(u64),
    Done,
}

/// A counting semaphore backed by a bounded channel of tokens: acquiring
/// is a blocking `recv`, releasing (on drop) is a `send`. Used to cap how
/// many chunk-scanning threads run concurrently without pulling in a
/// separate thread-pool crate just for this.
struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        let (tx, rx) = bounded(permits.max(1));
        for _ in 0..permits.max(1) {
            tx.send(()).expect("capacity matches permit count");
        }
        Self { tx, rx }
    }

    fn acquire(&self) -> SemaphorePermit<'_> {
        self.rx.recv().expect("semaphore sender never dropped");
        SemaphorePermit { tx: &self.tx }
    }
}

struct SemaphorePermit<'a> {
    tx: &'a Sender<()>,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        let _ = self.tx.send(());
    }
}

pub struct ParallelBitStringFinder {
    receivers: Vec<Receiver<WorkerMsg>>,
    current: usize,
    cancel: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ParallelBitStringFinder {
    /// `num_workers` sub-chunks, each scanned on its own thread.
    /// `chunk_size_bytes` controls granularity (1 MiB in the teacher's
    /// scanner); smaller inputs get fewer, smaller chunks automatically.
    pub fn new<T>(
        data: Arc<T>,
        pattern: u64,
        width: u32,
        num_workers: usize,
        chunk_size_bytes: usize,
    ) -> Result<Self>
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        if width == 0 || width > 56 {
            return Err(CoreError::usage(format!(
                "pattern width {width} must be in 1..=56"
            )));
        }
        let num_workers = num_workers.max(1);
        let overlap = ((width as usize - 1) + 7) / 8;
        let len = data.as_ref().as_ref().len();
        let chunk_size = chunk_size_bytes.max(overlap + 1);
        let num_chunks = len.div_ceil(chunk_size).max(1);

        let cancel = Arc::new(AtomicBool::new(false));
        let mut receivers = Vec::with_capacity(num_chunks);
        let mut handles = Vec::with_capacity(num_chunks);

        // A dedicated thread pool sized to `num_workers` bounds how many
        // chunks are scanned concurrently, mirroring the teacher's
        // rationale for a pool separate from any caller-held pool: the
        // caller may itself be driving a Rayon pool for block decoding,
        // and sharing one pool between scan and decode risks deadlock
        // if every worker ends up waiting on scan results.
        let semaphore = Arc::new(Semaphore::new(num_workers));

        for chunk_idx in 0..num_chunks {
            let start = chunk_idx * chunk_size;
            let end = (start + chunk_size).min(len);
            let scan_end = (end + overlap).min(len);

            let (tx, rx) = bounded(256);
            receivers.push(rx);

            let data = data.clone();
            let cancel = cancel.clone();
            let owned_end_bit = (end as u64) * 8;
            let sem = semaphore.clone();

            let handle = std::thread::Builder::new()
                .name(format!("bitstring-finder-{chunk_idx}"))
                .spawn(move || {
                    let _permit = sem.acquire();
                    let slice = &data.as_ref().as_ref()[start..scan_end];
                    let base_bit = (start as u64) * 8;
                    let slice: Arc<[u8]> = Arc::from(slice);
                    let mut finder = BitStringFinder::new(
                        Box::new(SliceSource::new(slice)),
                        pattern,
                        width,
                    )
                    .expect("validated width");

                    while !cancel.load(Ordering::Relaxed) {
                        match finder.find() {
                            Some(local_offset) => {
                                let absolute = base_bit + local_offset;
                                // Matches starting in the trailing overlap
                                // belong to the *next* chunk's primary
                                // range; skip so each match is reported
                                // exactly once.
                                if absolute < owned_end_bit {
                                    if tx.send(WorkerMsg::Offset(absolute)).is_err() {
                                        return;
                                    }
                                }
                            }
                            None => break,
                        }
                    }
                    let _ = tx.send(WorkerMsg::Done);
                })
                .expect("failed to spawn scanner worker thread");
            handles.push(handle);
        }

        Ok(Self {
            receivers,
            current: 0,
            cancel,
            handles,
        })
    }

    /// Same external contract as [`BitStringFinder::find`]: results are
    /// monotonically increasing across the whole input despite parallel
    /// discovery, because each worker's FIFO is drained to completion
    /// before the next one is consulted (spec.md §4.4's ordering
    /// guarantee).
    pub fn find(&mut self) -> Option<u64> {
        while self.current < self.receivers.len() {
            match self.receivers[self.current].recv() {
                Ok(WorkerMsg::Offset(v)) => return Some(v),
                Ok(WorkerMsg::Done) | Err(_) => {
                    self.current += 1;
                }
            }
        }
        None
    }

    pub fn eof(&self) -> bool {
        self.current >= self.receivers.len()
    }
}

impl Drop for ParallelBitStringFinder {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: u64 = 0x314159265359;

    #[test]
    fn finds_single_match_within_one_chunk() {
        let data: Vec<u8> = vec![0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
        let mut f = ParallelBitStringFinder::new(Arc::new(data), MAGIC, 48, 2, 1024).unwrap();
        assert_eq!(f.find(), Some(0));
        assert_eq!(f.find(), None);
        assert!(f.eof());
    }

    #[test]
    fn results_are_globally_monotonic_across_chunk_boundaries() {
        // Three chunks worth of data (chunk_size=16), each containing one
        // occurrence; a naive per-worker-without-ordering implementation
        // could interleave these out of order if later chunks finish
        // scanning first.
        let mut data = vec![0u8; 48];
        let magic_bytes = MAGIC.to_be_bytes();
        data[0..6].copy_from_slice(&magic_bytes[2..]);
        data[16..22].copy_from_slice(&magic_bytes[2..]);
        data[32..38].copy_from_slice(&magic_bytes[2..]);

        let mut f = ParallelBitStringFinder::new(Arc::new(data), MAGIC, 48, 4, 16).unwrap();
        let mut results = Vec::new();
        while let Some(off) = f.find() {
            results.push(off);
        }
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(results, sorted, "results must already be in order");
        assert_eq!(results, vec![0, 128, 256]);
    }

    #[test]
    fn match_straddling_chunk_boundary_is_reported_once() {
        let mut data = vec![0u8; 20];
        let magic_bytes = MAGIC.to_be_bytes();
        // Place the magic so it straddles the boundary between a chunk
        // ending at byte 8 and the next chunk.
        data[6..12].copy_from_slice(&magic_bytes[2..]);
        let mut f = ParallelBitStringFinder::new(Arc::new(data), MAGIC, 48, 4, 8).unwrap();
        assert_eq!(f.find(), Some(48));
        assert_eq!(f.find(), None);
    }

    #[test]
    fn empty_input_has_no_matches() {
        let data: Vec<u8> = Vec::new();
        let mut f = ParallelBitStringFinder::new(Arc::new(data), MAGIC, 48, 2, 1024).unwrap();
        assert_eq!(f.find(), None);
        assert!(f.eof());
    }

    #[test]
    fn width_out_of_range_is_invalid_argument() {
        let data: Vec<u8> = Vec::new();
        assert!(ParallelBitStringFinder::new(Arc::new(data), MAGIC, 0, 2, 1024).is_err());
    }
}
