//! Property tests over randomly shaped graphs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flowgraph::{Executor, Framework, GraphBuilder, NodeId};
use proptest::prelude::*;

/// Node count plus forward edges (`from < to`), so every graph is acyclic.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..24).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 3).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(from, to)| from < to)
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

struct Probe {
    runs: Vec<AtomicUsize>,
    tickets: Vec<AtomicUsize>,
    clock: AtomicUsize,
}

fn build(
    n: usize,
    edges: &[(usize, usize)],
) -> (Framework, Arc<Probe>) {
    let probe = Arc::new(Probe {
        runs: (0..n).map(|_| AtomicUsize::new(0)).collect(),
        tickets: (0..n).map(|_| AtomicUsize::new(0)).collect(),
        clock: AtomicUsize::new(0),
    });

    let mut flow = Framework::new();
    let ids: Vec<NodeId> = (0..n)
        .map(|index| {
            let probe = probe.clone();
            flow.emplace(move || {
                let ticket = probe.clock.fetch_add(1, Ordering::SeqCst);
                probe.tickets[index].store(ticket, Ordering::SeqCst);
                probe.runs[index].fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for &(from, to) in edges {
        flow.precede(ids[from], [ids[to]]).unwrap();
    }
    (flow, probe)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_node_runs_once_per_run((n, edges) in dag_strategy(), repeats in 1usize..4) {
        let (flow, probe) = build(n, &edges);
        prop_assert!(flow.validate().is_ok());

        let executor = Executor::new(3).unwrap();
        prop_assert!(executor.run_n(&flow, repeats).wait().is_ok());

        for runs in &probe.runs {
            prop_assert_eq!(runs.load(Ordering::SeqCst), repeats);
        }
        prop_assert_eq!(probe.clock.load(Ordering::SeqCst), n * repeats);
    }

    #[test]
    fn prop_edges_are_respected((n, edges) in dag_strategy()) {
        let (flow, probe) = build(n, &edges);

        let executor = Executor::new(4).unwrap();
        prop_assert!(executor.run(&flow).wait().is_ok());

        for &(from, to) in &edges {
            let before = probe.tickets[from].load(Ordering::SeqCst);
            let after = probe.tickets[to].load(Ordering::SeqCst);
            prop_assert!(before < after, "edge {} -> {} ran out of order", from, to);
        }
    }
}
