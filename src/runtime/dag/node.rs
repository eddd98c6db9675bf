//! Task node for the dependency graph
//!
//! A node couples an optional unit of work with its outgoing precedence
//! edges and the number of incoming edges it has to wait for.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::node_id::NodeId;
use crate::runtime::framework::Subflow;

/// Result type returned by fallible task bodies.
pub type TaskResult = anyhow::Result<()>;

type StaticBody = dyn Fn() -> TaskResult + Send + Sync;
type DynamicBody = dyn Fn(&mut Subflow) -> TaskResult + Send + Sync;

/// The callable attached to a task node.
///
/// Bodies are invoked once per run, possibly on a different worker thread
/// each time, hence the `Fn + Send + Sync` bounds.
#[derive(Clone)]
pub enum Work {
    /// A plain body taking no arguments.
    Static(Arc<StaticBody>),

    /// A body that may build a nested subflow while it runs.
    Dynamic(Arc<DynamicBody>),
}

impl Work {
    /// Wrap an infallible static body.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Work::Static(Arc::new(move || {
            body();
            Ok(())
        }))
    }

    /// Wrap a static body whose error fails the run.
    pub fn fallible<F>(body: F) -> Self
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        Work::Static(Arc::new(body))
    }

    /// Wrap an infallible dynamic body.
    pub fn subflow<F>(body: F) -> Self
    where
        F: Fn(&mut Subflow) + Send + Sync + 'static,
    {
        Work::Dynamic(Arc::new(move |subflow: &mut Subflow| {
            body(subflow);
            Ok(())
        }))
    }

    /// Wrap a dynamic body whose error fails the run.
    ///
    /// Nodes added to the subflow before the error are discarded.
    pub fn subflow_fallible<F>(body: F) -> Self
    where
        F: Fn(&mut Subflow) -> TaskResult + Send + Sync + 'static,
    {
        Work::Dynamic(Arc::new(body))
    }

    /// Check if this body receives a subflow builder.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Work::Dynamic(_))
    }
}

impl fmt::Debug for Work {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Work::Static(_) => f.write_str("Work::Static"),
            Work::Dynamic(_) => f.write_str("Work::Dynamic"),
        }
    }
}

/// A node in a task graph.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Optional human readable name, used in logs, errors and dumps
    name: Option<String>,

    /// Work to run; `None` for a placeholder
    work: Option<Work>,

    /// Nodes that may only start after this one completed
    successors: SmallVec<[NodeId; 4]>,

    /// Number of incoming edges (one per declared predecessor edge)
    num_predecessors: usize,
}

impl Node {
    /// Create a node with the given work (or a placeholder for `None`).
    #[inline]
    pub fn new(work: Option<Work>) -> Self {
        Self {
            work,
            ..Self::default()
        }
    }

    /// Get the node's name, if one was set.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub(crate) fn set_name(
        &mut self,
        name: String,
    ) {
        self.name = Some(name);
    }

    /// Label used when reporting on this node.
    pub fn label(
        &self,
        id: NodeId,
    ) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("node#{}", id.index()),
        }
    }

    /// Get the node's work.
    #[inline]
    pub fn work(&self) -> Option<&Work> {
        self.work.as_ref()
    }

    #[inline]
    pub(crate) fn set_work(
        &mut self,
        work: Work,
    ) {
        self.work = Some(work);
    }

    /// Check if this node still waits for its work.
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.work.is_none()
    }

    /// Get the nodes that depend on this node.
    #[inline]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// Get the number of incoming edges.
    #[inline]
    pub fn num_predecessors(&self) -> usize {
        self.num_predecessors
    }

    /// Check if this node has no incoming edges.
    #[inline]
    pub fn is_source(&self) -> bool {
        self.num_predecessors == 0
    }

    #[inline]
    pub(crate) fn add_successor(
        &mut self,
        successor: NodeId,
    ) {
        self.successors.push(successor);
    }

    #[inline]
    pub(crate) fn add_predecessor(&mut self) {
        self.num_predecessors += 1;
    }
}
