//! One-shot completion channel for runs
//!
//! The executor holds the single [`Promise`] of a run and fulfils it once;
//! any number of [`RunFuture`] clones may wait on it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::runtime::errors::RunError;

/// Outcome of a single run.
pub type RunResult = Result<(), RunError>;

#[derive(Default)]
struct Channel {
    slot: Mutex<Option<RunResult>>,
    ready: Condvar,
}

/// Create a connected promise/future pair.
pub(crate) fn channel() -> (Promise, RunFuture) {
    let channel = Arc::new(Channel::default());
    (
        Promise {
            channel: channel.clone(),
        },
        RunFuture { channel },
    )
}

/// Write side of the completion channel.
pub(crate) struct Promise {
    channel: Arc<Channel>,
}

impl Promise {
    /// Store the outcome and wake every waiter.
    pub(crate) fn fulfil(
        self,
        result: RunResult,
    ) {
        let mut slot = self.channel.slot.lock();
        debug_assert!(slot.is_none(), "run completion fulfilled twice");
        *slot = Some(result);
        self.channel.ready.notify_all();
    }
}

/// Handle to the completion of one run.
///
/// Must not be waited on from inside a task body or a completion
/// callback: that would block a worker thread the run may need.
#[derive(Clone)]
pub struct RunFuture {
    channel: Arc<Channel>,
}

impl RunFuture {
    /// Block until the run completed and return its outcome.
    pub fn wait(&self) -> RunResult {
        let mut slot = self.channel.slot.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            self.channel.ready.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`; `None` if the run is still pending.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<RunResult> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.channel.slot.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return Some(result.clone());
            }
            if self
                .channel
                .ready
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return slot.as_ref().cloned();
            }
        }
    }

    /// Outcome of the run if it already completed.
    pub fn try_result(&self) -> Option<RunResult> {
        self.channel.slot.lock().as_ref().cloned()
    }

    /// Check if the run completed.
    pub fn is_ready(&self) -> bool {
        self.channel.slot.lock().is_some()
    }
}

impl fmt::Debug for RunFuture {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RunFuture")
            .field("result", &*self.channel.slot.lock())
            .finish()
    }
}

/// Futures of a batch of runs submitted together.
#[derive(Debug, Clone, Default)]
pub struct RunGroup {
    futures: Vec<RunFuture>,
}

impl RunGroup {
    /// Wait for every run; returns the first failure in submission order.
    pub fn wait(&self) -> RunResult {
        let mut outcome = Ok(());
        for future in &self.futures {
            if let Err(err) = future.wait() {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }
        outcome
    }

    /// Number of runs in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    /// Check if the batch holds no run.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Iterate over the individual futures.
    pub fn iter(&self) -> impl Iterator<Item = &RunFuture> + '_ {
        self.futures.iter()
    }

    /// Take the individual futures.
    pub fn into_futures(self) -> Vec<RunFuture> {
        self.futures
    }
}

impl FromIterator<RunFuture> for RunGroup {
    fn from_iter<I: IntoIterator<Item = RunFuture>>(iter: I) -> Self {
        Self {
            futures: iter.into_iter().collect(),
        }
    }
}
