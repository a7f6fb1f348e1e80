//! Compact consumer adjacency for graph traversal.
//!
//! Nodes only store their inputs; evaluators and analyses need the opposite
//! direction. `Consumers` flattens it into offset + flat-list form.

use cf_core::NodeId;

use crate::graph::Graph;

/// For each node slot, the nodes that read one of its outputs through a data
/// or control edge.
#[derive(Debug, Clone)]
pub struct Consumers {
    /// Node slot i's consumers are `consumers[offsets[i]..offsets[i + 1]]`.
    offsets: Vec<usize>,

    /// Flat consumer list, sorted and deduplicated per producer for determinism.
    consumers: Vec<NodeId>,
}

impl Consumers {
    /// Build consumer lists from every data and control input in the graph.
    pub fn from_graph(graph: &Graph) -> Self {
        let slots = graph.slot_count();
        let mut per_node: Vec<Vec<NodeId>> = vec![Vec::new(); slots];
        for node in graph.nodes() {
            for input in node.inputs.iter().chain(&node.control_inputs) {
                if let Some(list) = per_node.get_mut(input.node.slot()) {
                    list.push(node.id);
                }
            }
        }

        let mut offsets = Vec::with_capacity(slots + 1);
        let mut consumers = Vec::new();
        offsets.push(0);
        for mut list in per_node {
            list.sort();
            list.dedup();
            consumers.extend_from_slice(&list);
            offsets.push(consumers.len());
        }

        Self { offsets, consumers }
    }

    /// Nodes consuming any output of `id` (empty for unknown IDs).
    pub fn of(&self, id: NodeId) -> &[NodeId] {
        let idx = id.slot();
        if idx + 1 >= self.offsets.len() {
            return &[];
        }
        &self.consumers[self.offsets[idx]..self.offsets[idx + 1]]
    }

    /// Total number of producer→consumer pairs.
    pub fn edge_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use crate::scope::Scope;

    #[test]
    fn consumers_cover_data_and_control() {
        let mut graph = Graph::new();
        let mut scope = Scope::new_root(&mut graph);
        let a = ops::constant(&mut scope, 1_i64).unwrap();
        let b = ops::constant(&mut scope, 2_i64).unwrap();
        let sum = ops::add(&mut scope, a, b).unwrap();
        let twice = ops::add(&mut scope, a, a).unwrap();
        let mut gated = scope.sub_scope("g").with_control_dependencies(&[sum]);
        let c = ops::constant(&mut gated, 3_i64).unwrap();

        let consumers = Consumers::from_graph(&graph);
        assert_eq!(consumers.of(a.node), &[sum.node, twice.node]);
        assert_eq!(consumers.of(b.node), &[sum.node]);
        assert_eq!(consumers.of(sum.node), &[c.node]);
        assert!(consumers.of(c.node).is_empty());
        assert!(consumers.of(NodeId::from_index(999)).is_empty());
        assert_eq!(consumers.edge_count(), 4);
    }
}
