//! C5 — StreamedResults<T>: an append-only, eventually-finalized sequence
//! that blocks readers past the current end until either more results
//! arrive or the sequence is finalized (spec.md §4.5).
//!
//! Not directly modeled in the teacher, which moves finished blocks over
//! a single `crossbeam_channel` and reorders them in a `HashMap` at the
//! consumer (`parallel_bzip2::decoder::Bz2Decoder::read` and
//! `parallel_bzip2::lib::scan_blocks`). `BlockFinder` (C6) needs the same
//! "ordered, lazily-growing, eventually-closed" shape but as an
//! explicitly indexable collection rather than a one-shot stream, so this
//! factors that pattern into a reusable type built from a `Mutex` +
//! `Condvar`, matching the synchronization primitives the teacher already
//! reaches for elsewhere (`Arc<Mutex<_>>` in `Bz2Decoder`).

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    items: Vec<T>,
    finalized: bool,
    /// Total count once finalized with an explicit count (may exceed
    /// `items.len()` transiently while producers are still catching up).
    final_count: Option<usize>,
}

/// Thread-safe, append-only, indexable sequence that can be finalized.
pub struct StreamedResults<T> {
    inner: Mutex<Inner<T>>,
    condvar: Condvar,
}

impl<T: Clone> StreamedResults<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                finalized: false,
                final_count: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Appends a result and wakes any readers blocked on it becoming
    /// available. Panics (logic error) if already finalized: pushing
    /// after finalize means a producer disagrees with itself about when
    /// the sequence ends.
    pub fn push(&self, value: T) {
        let mut guard = self.inner.lock().unwrap();
        assert!(
            !guard.finalized,
            "push after finalize: producer logic error"
        );
        guard.items.push(value);
        self.condvar.notify_all();
    }

    /// Marks the sequence closed. `count`, if given, must match the
    /// number of items already pushed or pushed-and-still-pending; when
    /// omitted the current length is final.
    pub fn finalize(&self, count: Option<usize>) {
        let mut guard = self.inner.lock().unwrap();
        guard.finalized = true;
        guard.final_count = count.or(Some(guard.items.len()));
        self.condvar.notify_all();
    }

    /// Current number of pushed items (not necessarily the final count
    /// until `finalized()` is true).
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn finalized(&self) -> bool {
        self.inner.lock().unwrap().finalized
    }

    /// Blocks until index `i` is available, the sequence is finalized
    /// with fewer than `i + 1` items (returns `None`), or `timeout`
    /// elapses (returns `None`).
    pub fn get(&self, i: usize, timeout: Option<Duration>) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(v) = guard.items.get(i) {
                return Some(v.clone());
            }
            if guard.finalized {
                return None;
            }
            guard = match timeout {
                Some(d) => {
                    let (g, res) = self.condvar.wait_timeout(guard, d).unwrap();
                    if res.timed_out() {
                        return None;
                    }
                    g
                }
                None => self.condvar.wait(guard).unwrap(),
            };
        }
    }

    /// Snapshot of all results pushed so far.
    pub fn results(&self) -> Vec<T> {
        self.inner.lock().unwrap().items.clone()
    }
}

impl<T: Clone> Default for StreamedResults<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience alias: `BlockFinder` (C6) and friends share one
/// `StreamedResults` between a producer thread and many reader threads.
pub type SharedStreamedResults<T> = Arc<StreamedResults<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn get_returns_immediately_once_pushed() {
        let s: StreamedResults<u64> = StreamedResults::new();
        s.push(10);
        s.push(20);
        assert_eq!(s.get(0, None), Some(10));
        assert_eq!(s.get(1, None), Some(20));
    }

    #[test]
    fn get_blocks_until_push_then_wakes() {
        let s = Arc::new(StreamedResults::<u64>::new());
        let s2 = s.clone();
        let handle = thread::spawn(move || s2.get(0, Some(Duration::from_secs(5))));
        thread::sleep(Duration::from_millis(50));
        s.push(42);
        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn get_returns_none_past_finalized_end() {
        let s: StreamedResults<u64> = StreamedResults::new();
        s.push(1);
        s.finalize(None);
        assert_eq!(s.get(0, None), Some(1));
        assert_eq!(s.get(1, None), None);
    }

    #[test]
    fn get_times_out_when_nothing_arrives() {
        let s: StreamedResults<u64> = StreamedResults::new();
        assert_eq!(s.get(0, Some(Duration::from_millis(20))), None);
    }

    #[test]
    #[should_panic(expected = "push after finalize")]
    fn push_after_finalize_panics() {
        let s: StreamedResults<u64> = StreamedResults::new();
        s.finalize(None);
        s.push(1);
    }
}
