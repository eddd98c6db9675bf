//! Dynamic subflows
//!
//! A subflow is the graph a dynamic node builds while its body runs. It
//! belongs to that single run and is discarded when the run completes.

use crate::runtime::dag::{Graph, GraphBuilder};

/// Builder handed to a dynamic node's body.
///
/// By default the subflow is *joined*: the node that spawned it only
/// counts as complete (and only releases its successors) once every node
/// of the subflow completed. A *detached* subflow lets the parent complete
/// right away; the run still waits for it before reporting completion.
#[derive(Debug, Default)]
pub struct Subflow {
    graph: Graph,
    detached: bool,
}

impl Subflow {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Let the parent node complete without waiting for this subflow.
    #[inline]
    pub fn detach(&mut self) {
        self.detached = true;
    }

    /// Make the parent node wait for this subflow (the default).
    #[inline]
    pub fn join(&mut self) {
        self.detached = false;
    }

    /// Check if the subflow is detached from its parent.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    #[inline]
    pub(crate) fn into_parts(self) -> (Graph, bool) {
        (self.graph, self.detached)
    }
}

impl GraphBuilder for Subflow {
    #[inline]
    fn graph(&self) -> &Graph {
        &self.graph
    }

    #[inline]
    fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }
}
