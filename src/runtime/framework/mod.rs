//! Persistent task graphs
//!
//! A [`Framework`] is a reusable task graph that can be handed to an
//! [`Executor`](crate::Executor) any number of times. Each run derives its
//! own dependency counters from the graph, so the graph itself never
//! carries state from one run into the next.
//!
//! Application state is meant to live next to the framework rather than
//! inside it:
//!
//! ```
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use flowgraph::{Executor, Framework, GraphBuilder};
//!
//! struct Pipeline {
//!     flow: Framework,
//!     processed: Arc<AtomicUsize>,
//! }
//!
//! let processed = Arc::new(AtomicUsize::new(0));
//! let mut flow = Framework::with_name("pipeline");
//! let counter = processed.clone();
//! flow.emplace(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//! let pipeline = Pipeline { flow, processed };
//!
//! let executor = Executor::new(2).unwrap();
//! executor.run_n(&pipeline.flow, 3).wait().unwrap();
//! assert_eq!(pipeline.processed.load(Ordering::SeqCst), 3);
//! ```

mod subflow;

pub use subflow::Subflow;

use std::fmt;
use std::sync::Arc;

use crate::runtime::dag::{Graph, GraphBuilder, GraphError};
use crate::runtime::scheduler::topology::RunQueue;

/// A persistent, reusable task graph.
///
/// Runs capture a snapshot of the graph when they are submitted. Building
/// calls made while runs are still queued or executing copy the graph
/// first, so those runs keep executing the graph they were submitted with
/// and only later submissions observe the change.
pub struct Framework {
    name: String,
    graph: Arc<Graph>,
    runs: Arc<RunQueue>,
}

impl Framework {
    /// Create an empty, unnamed framework.
    #[inline]
    pub fn new() -> Self {
        Self::with_name("")
    }

    /// Create an empty framework with a name used in logs and dumps.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: Arc::new(Graph::new()),
            runs: Arc::new(RunQueue::default()),
        }
    }

    /// Get the framework's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check that every placeholder got its work and that the graph is
    /// acyclic. Runs never perform the cycle check themselves.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate()
    }

    /// Render the graph in GraphViz DOT format.
    pub fn dump(&self) -> String {
        self.graph.to_dot(&self.name)
    }

    /// Number of runs submitted for this framework that have not completed.
    #[inline]
    pub fn num_pending_runs(&self) -> usize {
        self.runs.len()
    }

    /// Graph snapshot captured by a new run.
    #[inline]
    pub(crate) fn snapshot(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    /// Queue serialising the runs of this framework.
    #[inline]
    pub(crate) fn run_queue(&self) -> &Arc<RunQueue> {
        &self.runs
    }
}

impl GraphBuilder for Framework {
    #[inline]
    fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    fn graph_mut(&mut self) -> &mut Graph {
        Arc::make_mut(&mut self.graph)
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Framework {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Framework")
            .field("name", &self.name)
            .field("num_nodes", &self.graph.num_nodes())
            .field("num_edges", &self.graph.num_edges())
            .field("pending_runs", &self.runs.len())
            .finish()
    }
}
