//! The worker pool used for speculative prefetch of data blocks.
//!
//! A thin wrapper over [`rayon::ThreadPool`] rather than a hand-rolled
//! worker loop: `sleiderr-fzkernel`'s build tooling already pulls in
//! `rayon` (and `crossbeam`/`parking_lot`) for exactly this kind of
//! fan-out, so this crate reuses it instead of reimplementing a
//! work-stealing pool. `libsqsh`'s `posix/threadpool.c` ("spawn
//! `max(1, requested)` workers; FIFO scheduling within a priority class;
//! `destroy` drains then joins") is the functional contract this wrapper
//! satisfies; rayon's pool already guarantees graceful shutdown on drop, and
//! since this reader only ever submits one priority class of work (block
//! prefetch) there is no separate priority queue to maintain.

use std::sync::Arc;

use crate::error::Error;

/// A process-local (never global/static) handle to a worker pool. Callers
/// construct one explicitly and pass it to [`crate::archive::Archive`];
/// the library installs no process-wide singleton.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<rayon::ThreadPool>,
}

impl ThreadPool {
    /// Build a pool with `requested` workers. `0` means "hardware
    /// concurrency", matching the C contract in spec.
    pub fn new(requested: usize) -> Result<Self, Error> {
        let workers = if requested == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            requested
        };
        let inner = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("sqfs-worker-{i}"))
            .build()
            .map_err(|_| Error::InvalidArgument("failed to start worker pool"))?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Schedule `f` onto the pool. Panics inside `f` are caught by rayon at
    /// the pool level and do not propagate to the caller of `schedule`;
    /// callers that need the result should communicate it back explicitly
    /// (e.g. via [`crate::future::Promise`]).
    pub fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.spawn(f);
    }

    pub fn num_threads(&self) -> usize {
        self.inner.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_scheduled_work() {
        let pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = std::sync::mpsc::channel();
        for _ in 0..8 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.schedule(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            });
        }
        for _ in 0..8 {
            rx.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn zero_requested_uses_hardware_concurrency() {
        let pool = ThreadPool::new(0).unwrap();
        assert!(pool.num_threads() >= 1);
    }
}
