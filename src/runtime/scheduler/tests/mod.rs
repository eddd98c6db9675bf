//! Scheduler 单元测试
//!
//! 测试执行器、工作窃取队列与完成通道


use std::sync::Arc;

use parking_lot::Mutex;

/// Shared log of the order in which task bodies ran.
#[derive(Clone, Default)]
pub(super) struct Trace {
    events: Arc<Mutex<Vec<String>>>,
}

impl Trace {
    pub(super) fn push(
        &self,
        event: impl Into<String>,
    ) {
        self.events.lock().push(event.into());
    }

    pub(super) fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub(super) fn position(
        &self,
        event: &str,
    ) -> usize {
        self.events
            .lock()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("`{event}` never ran"))
    }

    pub(super) fn count(
        &self,
        event: &str,
    ) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

#[cfg(test)]
mod stats_tests {
    use std::sync::atomic::Ordering;

    use crate::runtime::scheduler::ExecutorStats;

    #[test]
    fn test_stats_default() {
        let stats = ExecutorStats::default();
        assert_eq!(stats.runs_submitted.load(Ordering::Relaxed), 0);
        assert_eq!(stats.tasks_executed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stats_recording() {
        let stats = ExecutorStats::default();
        stats.record_submitted();
        stats.record_completed(true);
        stats.record_completed(false);
        stats.record_executed();
        stats.record_failed();
        stats.record_skipped();
        stats.record_subflow();

        assert_eq!(stats.runs_submitted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.runs_completed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.runs_failed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.tasks_executed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.tasks_failed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.tasks_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(stats.subflows_spawned.load(Ordering::Relaxed), 1);
    }
}
