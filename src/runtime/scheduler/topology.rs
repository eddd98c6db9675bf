//! Run instances
//!
//! A [`Topology`] is one execution pass over a framework's graph. It owns
//! everything that changes while the run executes: one dependency counter
//! per node, the run's join counter, the subflows spawned during the run
//! and the first failure. Nothing here is shared with any other run.
//!
//! # Dependency resolution
//!
//! Every node starts with a counter equal to its number of incoming edges.
//! When a node completes, each successor's counter is decremented; the
//! caller that takes a counter from one to zero schedules that successor.
//! Completing a node also decrements the counter of the level it lives on:
//! the run's join counter for framework nodes, the subflow's pending
//! counter for subflow nodes. A joined subflow reaching zero completes its
//! parent node, which then releases the parent's successors.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::future::{Promise, RunResult};
use super::{ExecutorStats, Shared};
use crate::runtime::dag::{Graph, GraphBuilder, Node, NodeId, TaskResult, Work};
use crate::runtime::errors::{panic_message, RunError};
use crate::runtime::framework::{Framework, Subflow};

/// Completion callback shared by every run of a batch.
pub(crate) type Callback = Arc<dyn Fn() + Send + Sync>;

/// A node that is ready to run within a given run.
pub(crate) struct Job {
    pub(crate) topology: Arc<Topology>,
    pub(crate) node: NodeRef,
}

/// Destination of ready jobs.
pub(crate) trait Dispatch {
    fn dispatch(
        &self,
        job: Job,
    );
}

/// Per-run state of one node.
#[derive(Debug)]
pub(crate) struct NodeState {
    /// Predecessors that have not completed yet
    join: AtomicUsize,
    /// Set when a predecessor failed or was skipped
    poisoned: AtomicBool,
}

fn node_states(graph: &Graph) -> Box<[NodeState]> {
    graph
        .iter()
        .map(|(_, node)| NodeState {
            join: AtomicUsize::new(node.num_predecessors()),
            poisoned: AtomicBool::new(false),
        })
        .collect()
}

/// What a subflow completes into.
#[derive(Debug)]
pub(crate) enum SubflowParent {
    /// The parent node completes once the subflow did.
    Joined(NodeRef),
    /// The subflow only holds up the run.
    Detached,
}

/// A subflow frozen into a run's arena.
pub(crate) struct SubflowGraph {
    graph: Graph,
    states: Box<[NodeState]>,
    pending: AtomicUsize,
    failed: AtomicBool,
    parent: SubflowParent,
}

impl SubflowGraph {
    fn new(
        graph: Graph,
        parent: SubflowParent,
    ) -> Self {
        Self {
            states: node_states(&graph),
            pending: AtomicUsize::new(graph.num_nodes()),
            failed: AtomicBool::new(false),
            graph,
            parent,
        }
    }

    /// Number of nodes in the subflow.
    #[inline]
    pub(crate) fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }
}

impl fmt::Debug for SubflowGraph {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubflowGraph")
            .field("num_nodes", &self.graph.num_nodes())
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .field("parent", &self.parent)
            .finish()
    }
}

/// Reference to a node of a run: either a framework node or a node of one
/// of the run's subflows.
#[derive(Clone)]
pub(crate) enum NodeRef {
    Static(NodeId),
    Subflow(Arc<SubflowGraph>, NodeId),
}

impl NodeRef {
    fn node<'a>(
        &'a self,
        topology: &'a Topology,
    ) -> &'a Node {
        match self {
            NodeRef::Static(id) => &topology.graph.nodes_slice()[id.index()],
            NodeRef::Subflow(subflow, id) => &subflow.graph.nodes_slice()[id.index()],
        }
    }

    fn state<'a>(
        &'a self,
        topology: &'a Topology,
    ) -> &'a NodeState {
        match self {
            NodeRef::Static(id) => &topology.states[id.index()],
            NodeRef::Subflow(subflow, id) => &subflow.states[id.index()],
        }
    }

    /// Another node living in the same graph as this one.
    fn sibling(
        &self,
        id: NodeId,
    ) -> NodeRef {
        match self {
            NodeRef::Static(_) => NodeRef::Static(id),
            NodeRef::Subflow(subflow, _) => NodeRef::Subflow(subflow.clone(), id),
        }
    }

    fn label(
        &self,
        topology: &Topology,
    ) -> String {
        match self {
            NodeRef::Static(id) => self.node(topology).label(*id),
            NodeRef::Subflow(_, id) => format!("subflow/{}", self.node(topology).label(*id)),
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            NodeRef::Static(id) => write!(f, "Static({})", id.index()),
            NodeRef::Subflow(_, id) => write!(f, "Subflow({})", id.index()),
        }
    }
}

/// Runs of one framework waiting for their turn; the front run executes.
#[derive(Debug, Default)]
pub(crate) struct RunQueue {
    pending: Mutex<VecDeque<Arc<Topology>>>,
}

impl RunQueue {
    /// Queue a run; returns `true` if it should start right away.
    pub(crate) fn push(
        &self,
        topology: Arc<Topology>,
    ) -> bool {
        let mut pending = self.pending.lock();
        pending.push_back(topology);
        pending.len() == 1
    }

    /// Retire the front run and return the next one to start.
    pub(crate) fn advance(&self) -> Option<Arc<Topology>> {
        let mut pending = self.pending.lock();
        pending.pop_front();
        pending.front().cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// One execution pass over a framework.
pub(crate) struct Topology {
    id: u64,
    framework: String,
    graph: Arc<Graph>,
    states: Box<[NodeState]>,
    /// Framework nodes plus detached subflows still outstanding
    join: AtomicUsize,
    /// Subflows spawned during this run, released when the run completes
    arena: Mutex<Vec<Arc<SubflowGraph>>>,
    failure: OnceCell<RunError>,
    callback: Option<Callback>,
    promise: Mutex<Option<Promise>>,
    queue: Arc<RunQueue>,
    /// Executor the run was submitted to; it runs the jobs and does the
    /// completion bookkeeping
    executor: Arc<Shared>,
}

impl Topology {
    pub(crate) fn new(
        id: u64,
        framework: &Framework,
        executor: Arc<Shared>,
        callback: Option<Callback>,
        promise: Promise,
    ) -> Self {
        let graph = framework.snapshot();
        Self {
            id,
            framework: framework.name().to_string(),
            states: node_states(&graph),
            join: AtomicUsize::new(graph.num_nodes()),
            graph,
            arena: Mutex::new(Vec::new()),
            failure: OnceCell::new(),
            callback,
            promise: Mutex::new(Some(promise)),
            queue: framework.run_queue().clone(),
            executor,
        }
    }

    #[inline]
    pub(crate) fn framework(&self) -> &str {
        &self.framework
    }

    #[inline]
    pub(crate) fn queue(&self) -> &Arc<RunQueue> {
        &self.queue
    }

    #[inline]
    pub(crate) fn executor(&self) -> &Arc<Shared> {
        &self.executor
    }

    /// Push the initial ready set in insertion order.
    ///
    /// Returns `true` if the run is already complete: the graph is empty,
    /// or a placeholder never received work and nothing was started.
    pub(crate) fn start(
        self: &Arc<Self>,
        dispatch: &dyn Dispatch,
    ) -> bool {
        if self.graph.is_empty() {
            return true;
        }
        if let Some(id) = self.graph.find_missing_work() {
            let node = NodeRef::Static(id);
            self.record_failure(RunError::MissingWork {
                task: node.label(self),
            });
            return true;
        }

        trace!(run = self.id, framework = %self.framework, "deriving ready set");
        for id in self.graph.sources() {
            dispatch.dispatch(Job {
                topology: self.clone(),
                node: NodeRef::Static(id),
            });
        }
        false
    }

    /// Run one ready node. Returns `true` if this completed the run.
    pub(crate) fn execute(
        self: &Arc<Self>,
        node: &NodeRef,
        dispatch: &dyn Dispatch,
        stats: &ExecutorStats,
    ) -> bool {
        if node.state(self).poisoned.load(Ordering::Acquire) {
            trace!(run = self.id, node = ?node, "skipping node behind a failure");
            stats.record_skipped();
            return self.complete(node, false, dispatch);
        }

        trace!(run = self.id, node = ?node, "executing node");
        let outcome = match node.node(self).work() {
            None => Err(RunError::MissingWork {
                task: node.label(self),
            }),
            Some(Work::Static(body)) => self.invoke(node, || body()),
            Some(Work::Dynamic(body)) => {
                let mut subflow = Subflow::new();
                match self.invoke(node, || body(&mut subflow)) {
                    Ok(()) if !subflow.is_empty() => {
                        stats.record_executed();
                        return self.spawn_subflow(node, subflow, dispatch, stats);
                    }
                    outcome => outcome,
                }
            }
        };

        match outcome {
            Ok(()) => {
                stats.record_executed();
                self.complete(node, true, dispatch)
            }
            Err(err) => {
                stats.record_failed();
                self.record_failure(err);
                self.complete(node, false, dispatch)
            }
        }
    }

    fn invoke<F>(
        &self,
        node: &NodeRef,
        body: F,
    ) -> Result<(), RunError>
    where
        F: FnOnce() -> TaskResult,
    {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(RunError::failed(node.label(self), &err)),
            Err(payload) => Err(RunError::panicked(node.label(self), &*payload)),
        }
    }

    /// Freeze a non-empty subflow into the arena and schedule its sources.
    fn spawn_subflow(
        self: &Arc<Self>,
        parent: &NodeRef,
        subflow: Subflow,
        dispatch: &dyn Dispatch,
        stats: &ExecutorStats,
    ) -> bool {
        let (graph, detached) = subflow.into_parts();
        if let Some(id) = graph.find_missing_work() {
            let task = format!(
                "{}/{}",
                parent.label(self),
                graph.nodes_slice()[id.index()].label(id)
            );
            stats.record_failed();
            self.record_failure(RunError::MissingWork { task });
            return self.complete(parent, false, dispatch);
        }

        let link = if detached {
            // The run must outlive the subflow even though the parent
            // completes right away.
            self.join.fetch_add(1, Ordering::AcqRel);
            SubflowParent::Detached
        } else {
            SubflowParent::Joined(parent.clone())
        };
        let subflow = Arc::new(SubflowGraph::new(graph, link));
        self.arena.lock().push(subflow.clone());
        stats.record_subflow();
        debug!(
            run = self.id,
            parent = ?parent,
            nodes = subflow.num_nodes(),
            detached,
            "spawned subflow"
        );

        let sources: Vec<NodeId> = subflow.graph.sources().collect();
        for id in sources {
            dispatch.dispatch(Job {
                topology: self.clone(),
                node: NodeRef::Subflow(subflow.clone(), id),
            });
        }

        if detached {
            self.complete(parent, true, dispatch)
        } else {
            false
        }
    }

    /// Release the successors of a finished node and propagate completion
    /// up through joined subflows. Returns `true` if the run completed.
    fn complete(
        self: &Arc<Self>,
        node: &NodeRef,
        succeeded: bool,
        dispatch: &dyn Dispatch,
    ) -> bool {
        let mut node = node.clone();
        let mut succeeded = succeeded;

        loop {
            for &id in node.node(self).successors() {
                let successor = node.sibling(id);
                let state = successor.state(self);
                if !succeeded {
                    state.poisoned.store(true, Ordering::Release);
                }
                let previous = state.join.fetch_sub(1, Ordering::AcqRel);
                debug_assert!(previous > 0, "dependency counter underflow");
                if previous == 1 {
                    dispatch.dispatch(Job {
                        topology: self.clone(),
                        node: successor,
                    });
                }
            }

            let next = match &node {
                NodeRef::Static(_) => return self.release_join(),
                NodeRef::Subflow(subflow, _) => {
                    if !succeeded {
                        subflow.failed.store(true, Ordering::Release);
                    }
                    let previous = subflow.pending.fetch_sub(1, Ordering::AcqRel);
                    debug_assert!(previous > 0, "subflow counter underflow");
                    if previous != 1 {
                        return false;
                    }
                    match &subflow.parent {
                        SubflowParent::Joined(parent) => {
                            (parent.clone(), !subflow.failed.load(Ordering::Acquire))
                        }
                        SubflowParent::Detached => return self.release_join(),
                    }
                }
            };
            (node, succeeded) = next;
        }
    }

    fn release_join(&self) -> bool {
        let previous = self.join.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "run join counter underflow");
        previous == 1
    }

    fn record_failure(
        &self,
        err: RunError,
    ) {
        warn!(run = self.id, framework = %self.framework, error = %err, "task failed");
        let _ = self.failure.set(err);
    }

    /// Tear the run down: drop its subflows, invoke the callback and
    /// produce the outcome to publish.
    pub(crate) fn finish(&self) -> RunResult {
        let released = std::mem::take(&mut *self.arena.lock());
        let subflow_nodes: usize = released.iter().map(|subflow| subflow.num_nodes()).sum();
        drop(released);

        if let Some(callback) = &self.callback {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                error!(
                    run = self.id,
                    framework = %self.framework,
                    panic = %panic_message(&*payload),
                    "completion callback panicked"
                );
            }
        }

        let result = match self.failure.get() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        };
        debug!(
            run = self.id,
            framework = %self.framework,
            subflow_nodes,
            ok = result.is_ok(),
            "run finished"
        );
        result
    }

    /// Publish the outcome to the run's future.
    pub(crate) fn fulfil(
        &self,
        result: RunResult,
    ) {
        if let Some(promise) = self.promise.lock().take() {
            promise.fulfil(result);
        }
    }
}

impl fmt::Debug for Topology {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Topology")
            .field("id", &self.id)
            .field("framework", &self.framework)
            .field("num_nodes", &self.graph.num_nodes())
            .field("join", &self.join.load(Ordering::Relaxed))
            .finish()
    }
}
