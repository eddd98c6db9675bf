//! Failure reporting through futures and callbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use flowgraph::{Executor, Framework, GraphBuilder, RunError};

#[test]
fn test_error_context_is_kept() {
    let mut flow = Framework::new();
    let load = flow.emplace_fallible(|| {
        std::fs::read_to_string("/definitely/not/here.toml")
            .context("loading settings")
            .map(|_| ())
    });
    flow.set_name(load, "load").unwrap();

    let executor = Executor::new(1).unwrap();
    match executor.run(&flow).wait() {
        Err(RunError::TaskFailed { task, message }) => {
            assert_eq!(task, "load");
            assert!(message.starts_with("loading settings: "));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_independent_branches_still_run() {
    let ran = Arc::new(AtomicUsize::new(0));
    let mut flow = Framework::new();

    let bad = flow.emplace_fallible(|| Err(anyhow!("bad branch")));
    let skipped = {
        let ran = ran.clone();
        flow.emplace(move || {
            ran.fetch_add(1000, Ordering::SeqCst);
        })
    };
    flow.precede(bad, [skipped]).unwrap();

    for _ in 0..4 {
        let ran = ran.clone();
        flow.emplace(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    let executor = Executor::new(3).unwrap();
    let err = executor.run(&flow).wait().unwrap_err();
    assert!(err.to_string().contains("bad branch"));
    assert_eq!(ran.load(Ordering::SeqCst), 4);
}

#[test]
fn test_first_failure_wins() {
    let mut flow = Framework::new();
    let first = flow.emplace_fallible(|| Err(anyhow!("first")));
    let second = flow.emplace_fallible(|| Err(anyhow!("second")));
    flow.set_name(first, "first").unwrap();
    flow.set_name(second, "second").unwrap();
    flow.precede(first, [second]).unwrap();

    let executor = Executor::new(2).unwrap();
    let err = executor.run(&flow).wait().unwrap_err();
    // `second` is skipped behind `first` and never reports.
    assert_eq!(err.task(), "first");
}

#[test]
fn test_callback_fires_on_failure() {
    let callbacks = Arc::new(AtomicUsize::new(0));
    let mut flow = Framework::new();
    flow.emplace(|| panic!("always"));

    let executor = Executor::new(2).unwrap();
    let c = callbacks.clone();
    let group = executor.run_n_with(&flow, 3, move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    assert!(group.wait().is_err());
    assert_eq!(callbacks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failure_in_detached_subflow_fails_run() {
    let mut flow = Framework::new();
    flow.emplace_subflow(|subflow| {
        let node = subflow.emplace_fallible(|| Err(anyhow!("lost in the background")));
        subflow.set_name(node, "background").unwrap();
        subflow.detach();
    });

    let executor = Executor::new(2).unwrap();
    let err = executor.run(&flow).wait().unwrap_err();
    assert_eq!(err.task(), "subflow/background");
}
