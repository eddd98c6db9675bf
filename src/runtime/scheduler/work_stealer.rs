//! Work stealing for load balancing across worker threads.
//!
//! Every worker owns a FIFO deque it pushes follow-up work onto. Work
//! submitted from outside the pool goes to a shared injector. An idle
//! worker drains its own deque first, then the injector, then steals from
//! its peers.

use std::iter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam::deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};

/// Statistics about work stealing operations.
#[derive(Debug, Default)]
pub struct StealStats {
    /// Number of jobs taken from the shared injector.
    pub injector_hits: AtomicUsize,
    /// Number of jobs stolen from another worker.
    pub steal_successes: AtomicUsize,
    /// Number of searches that found nothing.
    pub steal_failures: AtomicUsize,
}

impl StealStats {
    #[inline]
    fn record_injector(&self) {
        self.injector_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_success(&self) {
        self.steal_successes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self) {
        self.steal_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of searches that found work.
    pub fn success_rate(&self) -> f64 {
        let successes = self.injector_hits.load(Ordering::Relaxed)
            + self.steal_successes.load(Ordering::Relaxed);
        let total = successes + self.steal_failures.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        successes as f64 / total as f64
    }
}

/// Shared side of the worker queues.
pub struct WorkStealer<T> {
    injector: Injector<T>,
    stealers: Vec<Stealer<T>>,
    stats: StealStats,
}

impl<T> WorkStealer<T> {
    /// Create the shared queues together with one local deque per worker.
    ///
    /// The local deques are meant to be moved into their worker threads.
    pub fn new(num_workers: usize) -> (Self, Vec<Worker<T>>) {
        let locals: Vec<Worker<T>> = (0..num_workers).map(|_| Worker::new_fifo()).collect();
        let stealers = locals.iter().map(Worker::stealer).collect();
        (
            Self {
                injector: Injector::new(),
                stealers,
                stats: StealStats::default(),
            },
            locals,
        )
    }

    /// Get the number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.stealers.len()
    }

    /// Submit work from outside the pool.
    #[inline]
    pub fn inject(
        &self,
        item: T,
    ) {
        self.injector.push(item);
    }

    /// Find the next item for the worker owning `local`.
    pub fn find(
        &self,
        local: &Worker<T>,
        worker_id: usize,
    ) -> Option<T> {
        if let Some(item) = local.pop() {
            return Some(item);
        }

        loop {
            match self.injector.steal_batch_and_pop(local) {
                Steal::Success(item) => {
                    self.stats.record_injector();
                    return Some(item);
                }
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        // Start with the next peer so that workers do not all gang up on
        // the first one.
        let count = self.stealers.len();
        let found = iter::repeat_with(|| {
            (1..count)
                .map(|offset| &self.stealers[(worker_id + offset) % count])
                .map(Stealer::steal)
                .collect::<Steal<T>>()
        })
        .find(|steal| !steal.is_retry())
        .and_then(Steal::success);

        match found {
            Some(item) => {
                self.stats.record_success();
                Some(item)
            }
            None => {
                self.stats.record_failure();
                None
            }
        }
    }

    /// Check if any queue holds work.
    pub fn has_pending(&self) -> bool {
        !self.injector.is_empty() || self.stealers.iter().any(|stealer| !stealer.is_empty())
    }

    /// Get steal statistics.
    #[inline]
    pub fn stats(&self) -> &StealStats {
        &self.stats
    }
}

/// Parking spot for idle workers.
#[derive(Debug, Default)]
pub struct IdleGate {
    lock: Mutex<()>,
    wake: Condvar,
}

impl IdleGate {
    /// Park for at most `timeout` unless `has_work` already reports work.
    ///
    /// `has_work` is checked under the gate's lock, which [`notify_one`]
    /// also takes, so a push followed by a notification cannot slip in
    /// between the check and the wait.
    ///
    /// [`notify_one`]: IdleGate::notify_one
    pub fn park_unless(
        &self,
        has_work: impl FnOnce() -> bool,
        timeout: Duration,
    ) {
        let mut guard = self.lock.lock();
        if has_work() {
            return;
        }
        self.wake.wait_for(&mut guard, timeout);
    }

    /// Wake one parked worker.
    pub fn notify_one(&self) {
        let _guard = self.lock.lock();
        self.wake.notify_one();
    }

    /// Wake every parked worker.
    pub fn notify_all(&self) {
        let _guard = self.lock.lock();
        self.wake.notify_all();
    }
}
