//! DAG 模块单元测试
//!
//! 测试任务图的节点、边与校验

use crate::runtime::dag::node_id::GraphId;
use crate::runtime::dag::{Graph, GraphBuilder, GraphError, Node, NodeId, Work};
use crate::runtime::framework::Subflow;

/// Minimal builder over a bare graph.
#[derive(Default)]
struct Builder {
    graph: Graph,
}

impl GraphBuilder for Builder {
    fn graph(&self) -> &Graph {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }
}

/// An id issued by some other graph.
fn foreign_id(index: usize) -> NodeId {
    NodeId::new(GraphId::generate(), index)
}

#[cfg(test)]
mod node_id_tests {
    use super::*;

    #[test]
    fn test_node_id_index() {
        let id = foreign_id(3);
        assert_eq!(id.index(), 3);
    }

    #[test]
    fn test_node_id_ordering() {
        let graph = GraphId::generate();
        assert!(NodeId::new(graph, 1) < NodeId::new(graph, 2));
        assert_eq!(NodeId::new(graph, 4), NodeId::new(graph, 4));
    }

    #[test]
    fn test_same_index_in_different_graphs() {
        assert_ne!(foreign_id(0), foreign_id(0));
    }

    #[test]
    fn test_node_id_display() {
        let display = format!("{}", foreign_id(42));
        assert!(display.contains("42"));
    }
}

#[cfg(test)]
mod node_tests {
    use super::*;

    #[test]
    fn test_placeholder_node() {
        let node = Node::new(None);
        assert!(node.is_placeholder());
        assert!(node.is_source());
        assert!(node.successors().is_empty());
        assert_eq!(node.label(foreign_id(7)), "node#7");
    }

    #[test]
    fn test_named_node_label() {
        let mut node = Node::new(Some(Work::new(|| {})));
        node.set_name("load".to_string());
        assert_eq!(node.name(), Some("load"));
        assert_eq!(node.label(foreign_id(0)), "load");
    }

    #[test]
    fn test_work_kinds() {
        assert!(!Work::new(|| {}).is_dynamic());
        assert!(!Work::fallible(|| Ok(())).is_dynamic());
        assert!(Work::subflow(|_: &mut Subflow| {}).is_dynamic());
        assert!(Work::subflow_fallible(|_: &mut Subflow| Ok(())).is_dynamic());
        assert_eq!(format!("{:?}", Work::new(|| {})), "Work::Static");
    }
}

#[cfg(test)]
mod builder_tests {
    use super::*;

    #[test]
    fn test_emplace_keeps_insertion_order() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.placeholder();
        let c = builder.emplace_subflow(|_| {});
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert_eq!(builder.num_nodes(), 3);
        assert!(!builder.is_empty());
    }

    #[test]
    fn test_precede_updates_both_ends() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        let c = builder.emplace(|| {});
        builder.precede(a, [b, c]).unwrap();

        let graph = builder.graph();
        assert_eq!(graph.node(a).unwrap().successors(), &[b, c]);
        assert_eq!(graph.node(b).unwrap().num_predecessors(), 1);
        assert_eq!(graph.node(c).unwrap().num_predecessors(), 1);
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.sources().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_duplicate_edges_are_counted_twice() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        builder.precede(a, [b]).unwrap();
        builder.precede(a, [b]).unwrap();

        let graph = builder.graph();
        assert_eq!(graph.node(a).unwrap().successors().len(), 2);
        assert_eq!(graph.node(b).unwrap().num_predecessors(), 2);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_precede_with_unknown_node_adds_nothing() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        let unknown = foreign_id(9);
        let err = builder.precede(a, [b, unknown]).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound(unknown));
        assert_eq!(builder.graph().num_edges(), 0);
        assert_eq!(builder.graph().node(b).unwrap().num_predecessors(), 0);
    }

    #[test]
    fn test_in_range_id_from_other_graph_rejected() {
        let mut other = Builder::default();
        let stranger = other.emplace(|| {});

        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        assert_eq!(stranger.index(), 0);
        assert!(!builder.graph().contains(stranger));
        assert_eq!(
            builder.precede(a, [stranger]),
            Err(GraphError::NodeNotFound(stranger))
        );
        assert_eq!(
            builder.precede(stranger, [b]),
            Err(GraphError::NodeNotFound(stranger))
        );
        assert!(builder.set_name(stranger, "x").is_err());
        assert_eq!(builder.graph().num_edges(), 0);
    }

    #[test]
    fn test_ids_survive_graph_clone() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let copy = builder.graph().clone();
        assert!(copy.contains(a));
    }

    #[test]
    fn test_succeed_gathers() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        let sink = builder.emplace(|| {});
        builder.succeed(sink, [a, b]).unwrap();
        assert_eq!(builder.graph().node(sink).unwrap().num_predecessors(), 2);
        assert_eq!(builder.graph().node(a).unwrap().successors(), &[sink]);
    }

    #[test]
    fn test_linearize_chains() {
        let mut builder = Builder::default();
        let ids: Vec<NodeId> = (0..4).map(|_| builder.emplace(|| {})).collect();
        builder.linearize(ids.iter().copied()).unwrap();

        let graph = builder.graph();
        assert_eq!(graph.num_edges(), 3);
        for pair in ids.windows(2) {
            assert_eq!(graph.node(pair[0]).unwrap().successors(), &[pair[1]]);
        }
        assert!(builder.linearize([ids[0], foreign_id(10)]).is_err());
    }

    #[test]
    fn test_set_work_and_name() {
        let mut builder = Builder::default();
        let p = builder.placeholder();
        assert!(builder.graph().node(p).unwrap().is_placeholder());

        builder.set_work(p, Work::new(|| {})).unwrap();
        builder.set_name(p, "later").unwrap();
        let node = builder.graph().node(p).unwrap();
        assert!(!node.is_placeholder());
        assert_eq!(node.name(), Some("later"));

        let unknown = foreign_id(5);
        assert_eq!(
            builder.set_work(unknown, Work::new(|| {})),
            Err(GraphError::NodeNotFound(unknown))
        );
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_empty_graph_is_valid() {
        assert!(Graph::new().validate().is_ok());
        assert_eq!(Graph::new().find_cycle(), None);
    }

    #[test]
    fn test_missing_work_detected() {
        let mut builder = Builder::default();
        builder.emplace(|| {});
        let p = builder.placeholder();
        builder.set_name(p, "pending").unwrap();

        assert_eq!(builder.graph().find_missing_work(), Some(p));
        match builder.graph().validate() {
            Err(GraphError::MissingWork { node, task }) => {
                assert_eq!(node, p);
                assert_eq!(task, "pending");
            }
            other => panic!("unexpected validation result: {other:?}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        let c = builder.emplace(|| {});
        builder.linearize([a, b, c]).unwrap();
        builder.precede(c, [b]).unwrap();

        assert_eq!(builder.graph().find_cycle(), Some(b));
        assert!(matches!(
            builder.graph().validate(),
            Err(GraphError::Cycle { node, .. }) if node == b
        ));
    }

    #[test]
    fn test_self_loop_detected() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        builder.precede(a, [a]).unwrap();
        assert_eq!(builder.graph().find_cycle(), Some(a));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace(|| {});
        let c = builder.emplace(|| {});
        let d = builder.emplace(|| {});
        builder.precede(a, [b, c]).unwrap();
        builder.succeed(d, [b, c]).unwrap();
        assert!(builder.graph().validate().is_ok());
    }
}

#[cfg(test)]
mod dot_tests {
    use super::*;

    #[test]
    fn test_to_dot() {
        let mut builder = Builder::default();
        let a = builder.emplace(|| {});
        let b = builder.emplace_subflow(|_| {});
        let c = builder.placeholder();
        builder.set_name(a, "say \"hi\"").unwrap();
        builder.precede(a, [b, c]).unwrap();

        let dot = builder.graph().to_dot("demo");
        assert!(dot.starts_with("digraph \"demo\" {"));
        assert!(dot.contains("n0 [label=\"say \\\"hi\\\"\", shape=box];"));
        assert!(dot.contains("n1 [label=\"node#1\", shape=box3d];"));
        assert!(dot.contains("style=dashed"));
        assert!(dot.contains("n0 -> n1;"));
        assert!(dot.contains("n0 -> n2;"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
