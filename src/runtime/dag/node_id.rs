//! Node ID for task graphs
//!
//! Identifies a task node within the graph that created it.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Identity of one graph, shared by all of its copy-on-write snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct GraphId(usize);

static NEXT_GRAPH_ID: AtomicUsize = AtomicUsize::new(0);

impl GraphId {
    /// Allocate a process-unique graph identity.
    #[inline]
    pub(crate) fn generate() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of a task node inside one graph.
///
/// `NodeId` is a dense index handed out in insertion order by the graph
/// that owns the node, tagged with that graph's identity. Handing an id to
/// any other graph (another framework, or a subflow) is rejected with
/// [`GraphError::NodeNotFound`](super::GraphError::NodeNotFound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    graph: GraphId,
    index: usize,
}

impl NodeId {
    #[inline]
    pub(crate) fn new(
        graph: GraphId,
        index: usize,
    ) -> Self {
        Self { graph, index }
    }

    /// Returns the position of the node in its graph's insertion order.
    ///
    /// # Examples
    ///
    /// ```
    /// use flowgraph::{Framework, GraphBuilder};
    ///
    /// let mut flow = Framework::new();
    /// let a = flow.emplace(|| {});
    /// let b = flow.emplace(|| {});
    /// assert_eq!(a.index(), 0);
    /// assert_eq!(b.index(), 1);
    /// ```
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub(crate) fn graph(&self) -> GraphId {
        self.graph
    }
}

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "NodeId({})", self.index)
    }
}
