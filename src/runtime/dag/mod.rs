//! Task dependency graphs
//!
//! This module provides the data structures shared by persistent
//! frameworks and per-run subflows.
//!
//! # Architecture
//!
//! - [`NodeId`](node_id::NodeId) - Index of a node inside its graph
//! - [`Node`](node::Node) - A single task with its successors
//! - [`Work`](node::Work) - Static or subflow-spawning body of a node
//! - [`Graph`](graph::Graph) - Insertion-ordered node and edge store
//! - [`GraphBuilder`](graph::GraphBuilder) - Building API on top of a graph
//! - [`GraphError`](graph::GraphError) - Errors raised while building or validating

pub mod graph;
pub mod node;
pub mod node_id;

pub use graph::{Graph, GraphBuilder, GraphError};
pub use node::{Node, TaskResult, Work};
pub use node_id::NodeId;

#[cfg(test)]
mod tests;
