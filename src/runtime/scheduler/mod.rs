//! Task executor for concurrent framework runs
//!
//! This module provides the [`Executor`], which owns a fixed pool of
//! worker threads and drives runs of [`Framework`]s through dependency
//! resolution.
//!
//! Runs of the same framework execute one after another in submission
//! order; runs of different frameworks execute concurrently and share the
//! worker pool.

pub mod future;
pub(crate) mod topology;
pub mod work_stealer;

pub use future::{RunFuture, RunGroup, RunResult};
pub use work_stealer::{IdleGate, StealStats, WorkStealer};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::deque::Worker;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::runtime::errors::ExecutorError;
use crate::runtime::framework::Framework;
use crate::util::config::ExecutorConfig;
use topology::{Callback, Dispatch, Job, Topology};

/// Executor statistics.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Total runs submitted.
    pub runs_submitted: AtomicUsize,
    /// Total runs completed.
    pub runs_completed: AtomicUsize,
    /// Completed runs that reported a failure.
    pub runs_failed: AtomicUsize,
    /// Task bodies that returned successfully.
    pub tasks_executed: AtomicUsize,
    /// Task bodies that failed or panicked.
    pub tasks_failed: AtomicUsize,
    /// Tasks skipped because a predecessor failed.
    pub tasks_skipped: AtomicUsize,
    /// Non-empty subflows spawned.
    pub subflows_spawned: AtomicUsize,
}

impl ExecutorStats {
    #[inline]
    fn record_submitted(&self) {
        self.runs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_completed(
        &self,
        failed: bool,
    ) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_executed(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_skipped(&self) {
        self.tasks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_subflow(&self) {
        self.subflows_spawned.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared between the executor handle, its workers and the runs
/// it submitted.
pub(crate) struct Shared {
    config: ExecutorConfig,
    queues: WorkStealer<Job>,
    idle: IdleGate,
    running: AtomicBool,
    next_run_id: AtomicU64,
    /// Runs submitted and not yet completed, across all frameworks
    outstanding: Mutex<usize>,
    all_done: Condvar,
    stats: ExecutorStats,
}

impl Shared {
    /// Start a run on the executor that submitted it and, for runs that
    /// complete without executing anything, keep going with the
    /// framework's next queued run.
    ///
    /// Runs of one framework may come from different executors, so every
    /// step goes through the run's own executor.
    fn start_run(topology: Arc<Topology>) {
        let mut topology = topology;
        loop {
            let shared = topology.executor().clone();
            if !topology.start(&*shared) {
                return;
            }
            match shared.complete_run(&topology) {
                Some(next) => topology = next,
                None => return,
            }
        }
    }

    /// Complete a run submitted to this executor and return the next
    /// queued run of its framework.
    fn complete_run(
        &self,
        topology: &Arc<Topology>,
    ) -> Option<Arc<Topology>> {
        debug_assert!(std::ptr::eq(self, &**topology.executor()));
        let result = topology.finish();
        let next = topology.queue().advance();
        self.stats.record_completed(result.is_err());
        topology.fulfil(result);

        let mut outstanding = self.outstanding.lock();
        debug_assert!(*outstanding > 0, "outstanding run counter underflow");
        *outstanding -= 1;
        if *outstanding == 0 {
            self.all_done.notify_all();
        }
        drop(outstanding);
        next
    }

    fn execute(
        &self,
        job: Job,
        dispatch: &dyn Dispatch,
    ) {
        let Job { topology, node } = job;
        if topology.execute(&node, dispatch, &self.stats) {
            if let Some(next) = topology.executor().complete_run(&topology) {
                Self::start_run(next);
            }
        }
    }
}

impl Dispatch for Shared {
    fn dispatch(
        &self,
        job: Job,
    ) {
        self.queues.inject(job);
        self.idle.notify_one();
    }
}

/// Dispatch from a worker thread onto its own deque.
struct LocalDispatch<'a> {
    shared: &'a Shared,
    local: &'a Worker<Job>,
}

impl Dispatch for LocalDispatch<'_> {
    fn dispatch(
        &self,
        job: Job,
    ) {
        self.local.push(job);
        self.shared.idle.notify_one();
    }
}

/// Executor running frameworks on a fixed pool of worker threads.
pub struct Executor {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Executor {
    /// Create an executor with `num_workers` threads and default settings.
    pub fn new(num_workers: usize) -> Result<Self, ExecutorError> {
        Self::with_config(ExecutorConfig::with_workers(num_workers))
    }

    /// Create an executor from a configuration.
    pub fn with_config(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        if config.num_workers == 0 {
            return Err(ExecutorError::NoWorkers);
        }

        let (queues, locals) = WorkStealer::new(config.num_workers);
        let shared = Arc::new(Shared {
            config,
            queues,
            idle: IdleGate::default(),
            running: AtomicBool::new(true),
            next_run_id: AtomicU64::new(0),
            outstanding: Mutex::new(0),
            all_done: Condvar::new(),
            stats: ExecutorStats::default(),
        });

        let mut executor = Self {
            shared,
            workers: Vec::with_capacity(locals.len()),
        };
        for (worker_id, local) in locals.into_iter().enumerate() {
            // A failed spawn drops `executor`, which stops the workers
            // already started.
            let handle = executor.spawn_worker(worker_id, local)?;
            executor.workers.push(handle);
        }

        debug!(workers = executor.workers.len(), "executor started");
        Ok(executor)
    }

    fn spawn_worker(
        &self,
        worker_id: usize,
        local: Worker<Job>,
    ) -> Result<thread::JoinHandle<()>, ExecutorError> {
        let shared = self.shared.clone();
        let mut builder =
            thread::Builder::new().name(format!("{}-{}", shared.config.thread_name, worker_id));
        if let Some(stack_size) = shared.config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder.spawn(move || Self::worker_loop(worker_id, &shared, &local))?;
        Ok(handle)
    }

    /// Worker thread main loop.
    fn worker_loop(
        worker_id: usize,
        shared: &Shared,
        local: &Worker<Job>,
    ) {
        let dispatch = LocalDispatch { shared, local };
        let idle_timeout = shared.config.idle_timeout();

        while shared.running.load(Ordering::Acquire) {
            match shared.queues.find(local, worker_id) {
                Some(job) => shared.execute(job, &dispatch),
                None => shared
                    .idle
                    .park_unless(|| shared.queues.has_pending(), idle_timeout),
            }
        }
    }

    /// Run a framework once.
    pub fn run(
        &self,
        framework: &Framework,
    ) -> RunFuture {
        self.submit(framework, None)
    }

    /// Run a framework once; `callback` is invoked when the run completed,
    /// before the returned future is fulfilled.
    ///
    /// The callback runs on a worker thread while the run still counts as
    /// outstanding. It must not block on this executor: calling
    /// [`wait_for_all`](Self::wait_for_all) or waiting on a future of the
    /// same run from inside it deadlocks.
    pub fn run_with<F>(
        &self,
        framework: &Framework,
        callback: F,
    ) -> RunFuture
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit(framework, Some(Arc::new(callback)))
    }

    /// Run a framework once without keeping a handle to its completion.
    pub fn silent_run(
        &self,
        framework: &Framework,
    ) {
        self.submit(framework, None);
    }

    /// Like [`silent_run`](Self::silent_run), invoking `callback` on completion.
    ///
    /// The callback runs on a worker thread while the run still counts as
    /// outstanding. It must not block on this executor: calling
    /// [`wait_for_all`](Self::wait_for_all) or waiting on a future of the
    /// same run from inside it deadlocks.
    pub fn silent_run_with<F>(
        &self,
        framework: &Framework,
        callback: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit(framework, Some(Arc::new(callback)));
    }

    /// Run a framework `n` times in a row.
    ///
    /// Equivalent to `n` calls to [`run`](Self::run): each execution has
    /// its own future and starts after the previous one completed.
    pub fn run_n(
        &self,
        framework: &Framework,
        n: usize,
    ) -> RunGroup {
        self.submit_n(framework, n, None)
    }

    /// Like [`run_n`](Self::run_n); `callback` fires once per execution.
    ///
    /// The callback runs on a worker thread while the run still counts as
    /// outstanding. It must not block on this executor: calling
    /// [`wait_for_all`](Self::wait_for_all) or waiting on a future of the
    /// same run from inside it deadlocks.
    pub fn run_n_with<F>(
        &self,
        framework: &Framework,
        n: usize,
        callback: F,
    ) -> RunGroup
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit_n(framework, n, Some(Arc::new(callback)))
    }

    /// Run a framework `n` times without keeping handles.
    pub fn silent_run_n(
        &self,
        framework: &Framework,
        n: usize,
    ) {
        self.submit_n(framework, n, None);
    }

    /// Like [`silent_run_n`](Self::silent_run_n); `callback` fires once per execution.
    ///
    /// The callback runs on a worker thread while the run still counts as
    /// outstanding. It must not block on this executor: calling
    /// [`wait_for_all`](Self::wait_for_all) or waiting on a future of the
    /// same run from inside it deadlocks.
    pub fn silent_run_n_with<F>(
        &self,
        framework: &Framework,
        n: usize,
        callback: F,
    ) where
        F: Fn() + Send + Sync + 'static,
    {
        self.submit_n(framework, n, Some(Arc::new(callback)));
    }

    fn submit_n(
        &self,
        framework: &Framework,
        n: usize,
        callback: Option<Callback>,
    ) -> RunGroup {
        (0..n)
            .map(|_| self.submit(framework, callback.clone()))
            .collect()
    }

    fn submit(
        &self,
        framework: &Framework,
        callback: Option<Callback>,
    ) -> RunFuture {
        let (promise, future) = future::channel();
        let id = self.shared.next_run_id.fetch_add(1, Ordering::Relaxed);
        let topology = Arc::new(Topology::new(
            id,
            framework,
            self.shared.clone(),
            callback,
            promise,
        ));

        *self.shared.outstanding.lock() += 1;
        self.shared.stats.record_submitted();
        debug!(run = id, framework = %topology.framework(), "run submitted");

        if framework.run_queue().push(topology.clone()) {
            Shared::start_run(topology);
        }
        future
    }

    /// Block until every run submitted to this executor so far has completed.
    ///
    /// Must not be called from inside a task body or a completion callback.
    pub fn wait_for_all(&self) {
        let mut outstanding = self.shared.outstanding.lock();
        while *outstanding > 0 {
            self.shared.all_done.wait(&mut outstanding);
        }
    }

    /// Get the number of worker threads.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.shared.queues.num_workers()
    }

    /// Number of runs submitted and not yet completed.
    pub fn num_outstanding_runs(&self) -> usize {
        *self.shared.outstanding.lock()
    }

    /// Get execution statistics.
    #[inline]
    pub fn stats(&self) -> &ExecutorStats {
        &self.shared.stats
    }

    /// Get work stealing statistics.
    #[inline]
    pub fn steal_stats(&self) -> &StealStats {
        self.shared.queues.stats()
    }

    /// Get the configuration the executor was built with.
    #[inline]
    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Wait for outstanding runs, then stop and join the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.wait_for_all();
        self.shared.running.store(false, Ordering::Release);
        self.shared.idle.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked");
            }
        }
        debug!("executor stopped");
    }
}

impl fmt::Debug for Executor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Executor")
            .field("num_workers", &self.num_workers())
            .field("outstanding_runs", &self.num_outstanding_runs())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
