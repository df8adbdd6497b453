//! C11 — ThreadPool: a small fixed-size worker pool with a future-like
//! submission handle and two priority lanes (spec.md §4.11).
//!
//! Grounded on the teacher's use of `crossbeam_channel` for work handoff
//! (`parallel_bzip2::lib::scan_blocks`'s bounded channel between scanner
//! and consumer) combined with plain `std::thread` workers, the same
//! combination `bz2zstd/src/main.rs` uses for its writer thread. This is
//! the only pool in the crate — `BlockFetcher` (C12) drives every block
//! decode through it rather than a separate data-parallel pool — and its
//! two priority lanes back spec.md's call for priority-ordered submission
//! with a handle the caller can block on individually: on-demand
//! single-block fetches jump ahead of a background prefetch queue.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    High,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A handle to a submitted job's result, obtained via `ThreadPool::submit`.
pub struct JobHandle<T> {
    rx: Receiver<T>,
}

impl<T> JobHandle<T> {
    pub fn join(self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Non-blocking check used to harvest completed prefetches
    /// (spec.md §4.12 step 4) without waiting on the ones still running.
    pub fn try_join(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

struct Queues {
    high: Option<Sender<Job>>,
    normal: Option<Sender<Job>>,
}

pub struct ThreadPool {
    queues: Mutex<Queues>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
    draining: Arc<std::sync::atomic::AtomicBool>,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (high_tx, high_rx) = bounded::<Job>(1024);
        let (normal_tx, normal_rx) = bounded::<Job>(1024);
        let draining = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let high_rx = high_rx.clone();
            let normal_rx = normal_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bzcat-worker-{i}"))
                .spawn(move || loop {
                    // High-priority lane is always drained first; fall
                    // back to blocking on whichever lane has work.
                    if let Ok(job) = high_rx.try_recv() {
                        job();
                        continue;
                    }
                    crossbeam_channel::select! {
                        recv(high_rx) -> msg => match msg {
                            Ok(job) => job(),
                            Err(_) => break,
                        },
                        recv(normal_rx) -> msg => match msg {
                            Ok(job) => job(),
                            Err(_) => break,
                        },
                    }
                })
                .expect("failed to spawn thread-pool worker");
            workers.push(handle);
        }

        Self {
            queues: Mutex::new(Queues {
                high: Some(high_tx),
                normal: Some(normal_tx),
            }),
            workers: Mutex::new(workers),
            draining,
        }
    }

    /// Submits a job, returning a handle that blocks until the result is
    /// ready. Rejected (returns `None`) once `stop`/`drain` has begun.
    pub fn submit<F, T>(&self, priority: Priority, f: F) -> Option<JobHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.draining.load(std::sync::atomic::Ordering::Acquire) {
            return None;
        }
        let (tx, rx) = bounded(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(f());
        });
        let guard = self.queues.lock().unwrap();
        let sender = match priority {
            Priority::High => guard.high.as_ref(),
            Priority::Normal => guard.normal.as_ref(),
        }?;
        sender.send(job).ok()?;
        Some(JobHandle { rx })
    }

    /// Stops accepting new submissions and blocks until every
    /// already-submitted job (both lanes) has completed, then joins all
    /// worker threads. The pool cannot be reused afterward.
    pub fn drain_and_stop(&self) {
        self.draining.store(true, std::sync::atomic::Ordering::Release);
        // Drop our copies of the sender endpoints so workers observe
        // disconnection once the backlog already queued is drained.
        {
            let mut guard = self.queues.lock().unwrap();
            guard.high.take();
            guard.normal.take();
        }
        let mut workers = self.workers.lock().unwrap();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}
