//! Graph storage and the graph-building API
//!
//! [`Graph`] is the plain node/edge store shared by frameworks and
//! subflows. [`GraphBuilder`] is the building surface both of them expose.

use std::collections::VecDeque;
use std::fmt::Write as _;

use smallvec::SmallVec;
use thiserror::Error;

use super::node::{Node, TaskResult, Work};
use super::node_id::{GraphId, NodeId};
use crate::runtime::framework::Subflow;

/// Errors raised while building or validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("{0} does not belong to this graph")]
    NodeNotFound(NodeId),

    #[error("task `{task}` ({node}) is a placeholder without work")]
    MissingWork { node: NodeId, task: String },

    #[error("task `{task}` ({node}) is part of a dependency cycle")]
    Cycle { node: NodeId, task: String },
}

/// Insertion-ordered collection of task nodes and their precedence edges.
///
/// Clones keep the identity of the graph they were copied from, so ids
/// issued before a copy-on-write stay valid on the copy.
#[derive(Debug, Clone)]
pub struct Graph {
    id: GraphId,
    nodes: Vec<Node>,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            id: GraphId::generate(),
            nodes: Vec::new(),
        }
    }
}

impl Graph {
    /// Create an empty graph.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn add_node(
        &mut self,
        work: Option<Work>,
    ) -> NodeId {
        let id = NodeId::new(self.id, self.nodes.len());
        self.nodes.push(Node::new(work));
        id
    }

    /// Get a node by id.
    pub fn node(
        &self,
        id: NodeId,
    ) -> Result<&Node, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        Ok(&self.nodes[id.index()])
    }

    /// Get a mutable node by id.
    pub fn node_mut(
        &mut self,
        id: NodeId,
    ) -> Result<&mut Node, GraphError> {
        if !self.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        Ok(&mut self.nodes[id.index()])
    }

    #[inline]
    pub(crate) fn nodes_slice(&self) -> &[Node] {
        &self.nodes
    }

    /// Check if the given id was issued by this graph.
    #[inline]
    pub fn contains(
        &self,
        id: NodeId,
    ) -> bool {
        id.graph() == self.id && id.index() < self.nodes.len()
    }

    /// Add an edge: `to` may only start once `from` completed.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
    ) -> Result<(), GraphError> {
        if !self.contains(to) {
            return Err(GraphError::NodeNotFound(to));
        }
        self.node_mut(from)?.add_successor(to);
        self.nodes[to.index()].add_predecessor();
        Ok(())
    }

    /// Get the number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Get the number of edges.
    pub fn num_edges(&self) -> usize {
        self.nodes.iter().map(|node| node.successors().len()).sum()
    }

    /// Check if the graph has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId::new(self.id, index), node))
    }

    /// Nodes without incoming edges, in insertion order.
    pub fn sources(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter()
            .filter(|(_, node)| node.is_source())
            .map(|(id, _)| id)
    }

    /// First placeholder that never got its work, if any.
    pub fn find_missing_work(&self) -> Option<NodeId> {
        self.iter()
            .find(|(_, node)| node.is_placeholder())
            .map(|(id, _)| id)
    }

    /// First node (in insertion order) that Kahn's algorithm cannot
    /// release, i.e. a node on or behind a cycle.
    pub fn find_cycle(&self) -> Option<NodeId> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(Node::num_predecessors).collect();
        let mut ready: VecDeque<NodeId> = self.sources().collect();
        let mut released = 0;

        while let Some(id) = ready.pop_front() {
            released += 1;
            for &successor in self.nodes[id.index()].successors() {
                remaining[successor.index()] -= 1;
                if remaining[successor.index()] == 0 {
                    ready.push_back(successor);
                }
            }
        }

        if released == self.nodes.len() {
            return None;
        }
        remaining
            .iter()
            .position(|&count| count > 0)
            .map(|index| NodeId::new(self.id, index))
    }

    /// Check that every node has work and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(node) = self.find_missing_work() {
            return Err(GraphError::MissingWork {
                node,
                task: self.nodes[node.index()].label(node),
            });
        }
        if let Some(node) = self.find_cycle() {
            return Err(GraphError::Cycle {
                node,
                task: self.nodes[node.index()].label(node),
            });
        }
        Ok(())
    }

    /// Render the graph in GraphViz DOT format.
    pub fn to_dot(
        &self,
        name: &str,
    ) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph \"{}\" {{", escape(name));
        for (id, node) in self.iter() {
            let shape = match node.work() {
                Some(work) if work.is_dynamic() => "box3d",
                Some(_) => "box",
                None => "box, style=dashed",
            };
            let _ = writeln!(
                dot,
                "  n{} [label=\"{}\", shape={}];",
                id.index(),
                escape(&node.label(id)),
                shape
            );
        }
        for (id, node) in self.iter() {
            for successor in node.successors() {
                let _ = writeln!(dot, "  n{} -> n{};", id.index(), successor.index());
            }
        }
        dot.push_str("}\n");
        dot
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Graph-building operations shared by [`Framework`](crate::Framework)
/// and [`Subflow`].
///
/// Implementors only provide access to their [`Graph`]; every building
/// call is expressed on top of it.
pub trait GraphBuilder {
    /// Read access to the underlying graph.
    fn graph(&self) -> &Graph;

    /// Write access to the underlying graph.
    fn graph_mut(&mut self) -> &mut Graph;

    /// Create a node running an infallible body.
    fn emplace<F>(
        &mut self,
        body: F,
    ) -> NodeId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.graph_mut().add_node(Some(Work::new(body)))
    }

    /// Create a node whose body may fail the run.
    fn emplace_fallible<F>(
        &mut self,
        body: F,
    ) -> NodeId
    where
        F: Fn() -> TaskResult + Send + Sync + 'static,
    {
        self.graph_mut().add_node(Some(Work::fallible(body)))
    }

    /// Create a node that spawns a subflow each time it runs.
    fn emplace_subflow<F>(
        &mut self,
        body: F,
    ) -> NodeId
    where
        F: Fn(&mut Subflow) + Send + Sync + 'static,
    {
        self.graph_mut().add_node(Some(Work::subflow(body)))
    }

    /// Create a subflow-spawning node whose body may fail the run.
    fn emplace_subflow_fallible<F>(
        &mut self,
        body: F,
    ) -> NodeId
    where
        F: Fn(&mut Subflow) -> TaskResult + Send + Sync + 'static,
    {
        self.graph_mut().add_node(Some(Work::subflow_fallible(body)))
    }

    /// Create a node without work, to be wired up now and given a body later.
    fn placeholder(&mut self) -> NodeId {
        self.graph_mut().add_node(None)
    }

    /// Assign or replace the work of a node.
    fn set_work(
        &mut self,
        id: NodeId,
        work: Work,
    ) -> Result<(), GraphError> {
        self.graph_mut().node_mut(id)?.set_work(work);
        Ok(())
    }

    /// Name a node.
    fn set_name(
        &mut self,
        id: NodeId,
        name: impl Into<String>,
    ) -> Result<(), GraphError> {
        self.graph_mut().node_mut(id)?.set_name(name.into());
        Ok(())
    }

    /// Declare that `from` completes before each of `targets` begins.
    ///
    /// Either every edge is added or, if any id is unknown, none is.
    fn precede<I>(
        &mut self,
        from: NodeId,
        targets: I,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let graph = self.graph_mut();
        let targets: SmallVec<[NodeId; 8]> = targets.into_iter().collect();
        if let Some(&unknown) = std::iter::once(&from)
            .chain(targets.iter())
            .find(|id| !graph.contains(**id))
        {
            return Err(GraphError::NodeNotFound(unknown));
        }
        for to in targets {
            graph.add_edge(from, to)?;
        }
        Ok(())
    }

    /// Declare that each of `predecessors` completes before `to` begins.
    fn succeed<I>(
        &mut self,
        to: NodeId,
        predecessors: I,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let graph = self.graph_mut();
        let predecessors: SmallVec<[NodeId; 8]> = predecessors.into_iter().collect();
        if let Some(&unknown) = std::iter::once(&to)
            .chain(predecessors.iter())
            .find(|id| !graph.contains(**id))
        {
            return Err(GraphError::NodeNotFound(unknown));
        }
        for from in predecessors {
            graph.add_edge(from, to)?;
        }
        Ok(())
    }

    /// Chain nodes so that each one precedes the next.
    fn linearize<I>(
        &mut self,
        ids: I,
    ) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let ids: SmallVec<[NodeId; 8]> = ids.into_iter().collect();
        let graph = self.graph_mut();
        if let Some(&unknown) = ids.iter().find(|id| !graph.contains(**id)) {
            return Err(GraphError::NodeNotFound(unknown));
        }
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Get the number of nodes.
    fn num_nodes(&self) -> usize {
        self.graph().num_nodes()
    }

    /// Check if no node has been created yet.
    fn is_empty(&self) -> bool {
        self.graph().is_empty()
    }
}
