//! Core graph data structures.

use std::collections::{HashMap, HashSet};
use std::fmt;

use cf_core::{LoopContextId, NodeId};
use tracing::warn;

use crate::error::{GraphError, GraphResult};
use crate::op::Op;
use crate::types::DataType;
use crate::while_context::LoopContext;

/// Reference to one value a node produces: `(node, output slot)`.
///
/// Non-owning and `Copy`; stays valid for as long as the graph exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Output {
    pub node: NodeId,
    pub index: u32,
}

impl Output {
    pub fn new(node: NodeId, index: u32) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.index)
    }
}

/// An operation instance in the graph.
///
/// Identity is fixed at creation. Only the data-input list may grow or be
/// rebound afterwards, which is how loop back-edges are closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op: Op,
    pub inputs: Vec<Output>,
    /// Ordering-only inputs; a dead control input makes the node dead.
    pub control_inputs: Vec<Output>,
    pub output_types: Vec<DataType>,
    /// Set on Exit nodes of loops built with metadata recording.
    pub loop_context: Option<LoopContextId>,
}

impl Node {
    /// Reference to output slot `index` of this node.
    pub fn output(&self, index: u32) -> Output {
        Output::new(self.id, index)
    }

    pub fn num_outputs(&self) -> usize {
        self.output_types.len()
    }
}

/// Everything needed to create a node; the id is assigned by the graph.
#[derive(Debug, Clone)]
pub struct NodeDef {
    pub name: String,
    pub op: Op,
    pub inputs: Vec<Output>,
    pub control_inputs: Vec<Output>,
}

/// A node id handed out before its node exists.
#[derive(Debug, Clone)]
struct Reservation {
    name: String,
    dtype: DataType,
}

#[derive(Debug, Clone)]
enum Slot {
    Reserved(Reservation),
    Filled(Node),
}

/// Arena owning every node, reservation and loop context of one computation.
///
/// Reads are public; mutation goes through [`Scope`](crate::Scope), which
/// checks and maintains the sticky error status.
#[derive(Debug, Default)]
pub struct Graph {
    slots: Vec<Slot>,
    by_name: HashMap<String, NodeId>,
    reserved_names: HashSet<String>,
    /// Uses per name base, for `Merge`, `Merge_1`, ... generation.
    name_counts: HashMap<String, u32>,
    loop_contexts: Vec<LoopContext>,
    frames: HashSet<String>,
    status: Option<GraphError>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok` unless an earlier construction call failed.
    pub fn status(&self) -> GraphResult<()> {
        match &self.status {
            Some(err) => Err(GraphError::Poisoned {
                cause: err.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The first error recorded on this graph, if any.
    pub fn error(&self) -> Option<&GraphError> {
        self.status.as_ref()
    }

    /// Get a created node by ID (None for unknown or still-reserved IDs).
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        match self.slots.get(id.slot()) {
            Some(Slot::Filled(node)) => Some(node),
            _ => None,
        }
    }

    /// Iterate over all created nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Filled(node) => Some(node),
            Slot::Reserved(_) => None,
        })
    }

    /// Number of created nodes.
    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Number of arena slots, created or reserved. Every `NodeId` indexes below this.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Look a node up by its unique name.
    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.by_name.get(name).and_then(|&id| self.node(id))
    }

    /// True when `id` was reserved and has not been filled yet.
    pub fn is_reserved(&self, id: NodeId) -> bool {
        matches!(self.slots.get(id.slot()), Some(Slot::Reserved(_)))
    }

    /// Reservations that were never filled, with their expected names.
    pub fn pending_reservations(&self) -> Vec<(NodeId, &str)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Reserved(r) => Some((NodeId::from_index(i as u32), r.name.as_str())),
                Slot::Filled(_) => None,
            })
            .collect()
    }

    /// Type of a value reference; reservations answer with their declared type.
    pub fn output_type(&self, output: Output) -> GraphResult<DataType> {
        let invalid = || GraphError::InvalidSlot {
            node: output.node,
            slot: output.index,
        };
        match self.slots.get(output.node.slot()) {
            Some(Slot::Filled(node)) => node
                .output_types
                .get(output.index as usize)
                .copied()
                .ok_or_else(invalid),
            Some(Slot::Reserved(r)) if output.index == 0 => Ok(r.dtype),
            Some(Slot::Reserved(_)) => Err(invalid()),
            None => Err(GraphError::UnknownNode { node: output.node }),
        }
    }

    /// Get a loop context by ID.
    pub fn loop_context(&self, id: LoopContextId) -> Option<&LoopContext> {
        self.loop_contexts.get(id.slot())
    }

    /// All recorded loop contexts with their IDs.
    pub fn loop_contexts(&self) -> impl Iterator<Item = (LoopContextId, &LoopContext)> {
        self.loop_contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| (LoopContextId::from_index(i as u32), ctx))
    }

    /// Which loop produced this value (answers for Exit outputs).
    pub fn loop_context_of(&self, output: Output) -> Option<LoopContextId> {
        self.node(output.node).and_then(|node| node.loop_context)
    }

    pub(crate) fn record_error(&mut self, err: &GraphError) {
        if self.status.is_none() && !matches!(err, GraphError::Poisoned { .. }) {
            warn!(error = %err, "graph construction failed");
            self.status = Some(err.clone());
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(name) || self.reserved_names.contains(name)
    }

    fn candidate_name(base: &str, k: u32) -> String {
        if k == 0 {
            base.to_string()
        } else {
            format!("{base}_{k}")
        }
    }

    /// Next unique name for `base`: `base`, `base_1`, `base_2`, ...
    pub(crate) fn unique_name(&mut self, base: &str) -> String {
        let mut k = self.name_counts.get(base).copied().unwrap_or(0);
        let mut name = Self::candidate_name(base, k);
        while self.by_name.contains_key(&name) {
            k += 1;
            name = Self::candidate_name(base, k);
        }
        self.name_counts.insert(base.to_string(), k + 1);
        name
    }

    /// The names `n` successive `unique_name(base)` calls would return, without consuming them.
    pub(crate) fn peek_unique_names(&self, base: &str, n: usize) -> Vec<String> {
        let mut k = self.name_counts.get(base).copied().unwrap_or(0);
        let mut names = Vec::with_capacity(n);
        while names.len() < n {
            let name = Self::candidate_name(base, k);
            if !self.by_name.contains_key(&name) {
                names.push(name);
            }
            k += 1;
        }
        names
    }

    fn input_types(&self, def: &NodeDef) -> GraphResult<Vec<DataType>> {
        for &ctrl in &def.control_inputs {
            self.output_type(ctrl)?;
        }
        def.inputs.iter().map(|&o| self.output_type(o)).collect()
    }

    pub(crate) fn insert_node(&mut self, def: NodeDef) -> GraphResult<NodeId> {
        if self.name_taken(&def.name) {
            return Err(GraphError::DuplicateName { name: def.name });
        }
        let output_types = def.op.infer_output_types(&self.input_types(&def)?)?;

        let id = NodeId::from_index(self.slots.len() as u32);
        self.by_name.insert(def.name.clone(), id);
        self.slots.push(Slot::Filled(Node {
            id,
            name: def.name,
            op: def.op,
            inputs: def.inputs,
            control_inputs: def.control_inputs,
            output_types,
            loop_context: None,
        }));
        Ok(id)
    }

    pub(crate) fn reserve(&mut self, name: &str, dtype: DataType) -> GraphResult<NodeId> {
        if self.name_taken(name) {
            return Err(GraphError::DuplicateName {
                name: name.to_string(),
            });
        }
        let id = NodeId::from_index(self.slots.len() as u32);
        self.reserved_names.insert(name.to_string());
        self.slots.push(Slot::Reserved(Reservation {
            name: name.to_string(),
            dtype,
        }));
        Ok(id)
    }

    pub(crate) fn fill_reserved(&mut self, id: NodeId, def: NodeDef) -> GraphResult<()> {
        let reservation = match self.slots.get(id.slot()) {
            Some(Slot::Reserved(r)) => r.clone(),
            Some(Slot::Filled(_)) => return Err(GraphError::NotReserved { node: id }),
            None => return Err(GraphError::UnknownNode { node: id }),
        };
        if def.name != reservation.name && self.name_taken(&def.name) {
            return Err(GraphError::DuplicateName { name: def.name });
        }
        let output_types = def.op.infer_output_types(&self.input_types(&def)?)?;
        if output_types.first() != Some(&reservation.dtype) {
            return Err(GraphError::TypeMismatch {
                op: def.op.type_name().to_string(),
                expected: reservation.dtype.to_string(),
                actual: output_types.first().copied().unwrap_or(reservation.dtype),
            });
        }

        self.reserved_names.remove(&reservation.name);
        self.by_name.insert(def.name.clone(), id);
        self.slots[id.slot()] = Slot::Filled(Node {
            id,
            name: def.name,
            op: def.op,
            inputs: def.inputs,
            control_inputs: def.control_inputs,
            output_types,
            loop_context: None,
        });
        Ok(())
    }

    /// Bind `src` to input slot `dst_slot` of an existing node, replacing or appending.
    pub(crate) fn add_edge(&mut self, src: Output, dst: NodeId, dst_slot: usize) -> GraphResult<()> {
        if self.is_reserved(src.node) {
            let name = match &self.slots[src.node.slot()] {
                Slot::Reserved(r) => r.name.clone(),
                Slot::Filled(node) => node.name.clone(),
            };
            return Err(GraphError::DanglingReservation {
                node: src.node,
                name,
            });
        }
        let src_type = self.output_type(src)?;
        let node = self.node(dst).ok_or(GraphError::UnknownNode { node: dst })?;
        if dst_slot > node.inputs.len() {
            return Err(GraphError::InvalidInputSlot {
                node: dst,
                slot: dst_slot,
            });
        }

        let mut types = node
            .inputs
            .iter()
            .map(|&o| self.output_type(o))
            .collect::<GraphResult<Vec<_>>>()?;
        if dst_slot == types.len() {
            types.push(src_type);
        } else {
            types[dst_slot] = src_type;
        }
        let output_types = node.op.infer_output_types(&types)?;
        if output_types != node.output_types {
            return Err(GraphError::TypeMismatch {
                op: node.op.type_name().to_string(),
                expected: format!("{:?}", node.output_types),
                actual: src_type,
            });
        }

        if let Some(Slot::Filled(node)) = self.slots.get_mut(dst.slot()) {
            if dst_slot == node.inputs.len() {
                node.inputs.push(src);
            } else {
                node.inputs[dst_slot] = src;
            }
        }
        Ok(())
    }

    pub(crate) fn add_loop_context(&mut self, ctx: LoopContext) -> GraphResult<LoopContextId> {
        if self.frames.contains(ctx.frame_name()) {
            return Err(GraphError::DuplicateFrame {
                frame: ctx.frame_name().to_string(),
            });
        }
        let id = LoopContextId::from_index(self.loop_contexts.len() as u32);
        self.frames.insert(ctx.frame_name().to_string());
        self.loop_contexts.push(ctx);
        Ok(id)
    }

    pub(crate) fn set_loop_context(&mut self, node: NodeId, ctx: LoopContextId) -> GraphResult<()> {
        if self.loop_context(ctx).is_none() {
            return Err(GraphError::UnknownLoopContext { id: ctx });
        }
        match self.slots.get_mut(node.slot()) {
            Some(Slot::Filled(n)) => {
                n.loop_context = Some(ctx);
                Ok(())
            }
            _ => Err(GraphError::UnknownNode { node }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn def(name: &str, op: Op, inputs: Vec<Output>) -> NodeDef {
        NodeDef {
            name: name.into(),
            op,
            inputs,
            control_inputs: Vec::new(),
        }
    }

    #[test]
    fn unique_names_follow_counter() {
        let mut g = Graph::new();
        assert_eq!(g.peek_unique_names("a/Merge", 3), ["a/Merge", "a/Merge_1", "a/Merge_2"]);
        assert_eq!(g.unique_name("a/Merge"), "a/Merge");
        assert_eq!(g.unique_name("a/Merge"), "a/Merge_1");
        assert_eq!(g.peek_unique_names("a/Merge", 1), ["a/Merge_2"]);
    }

    #[test]
    fn reservation_answers_type_before_fill() {
        let mut g = Graph::new();
        let id = g.reserve("next", DataType::Float64).unwrap();
        assert!(g.is_reserved(id));
        assert!(g.node(id).is_none());
        assert_eq!(g.output_type(Output::new(id, 0)).unwrap(), DataType::Float64);
        assert!(g.output_type(Output::new(id, 1)).is_err());
        assert_eq!(g.pending_reservations(), vec![(id, "next")]);

        let c = g
            .insert_node(def("c", Op::Const(Value::Float(1.0)), vec![]))
            .unwrap();
        g.fill_reserved(id, def("next", Op::NextIteration, vec![Output::new(c, 0)]))
            .unwrap();
        assert!(!g.is_reserved(id));
        assert_eq!(g.find_node("next").unwrap().id, id);
        assert!(g.pending_reservations().is_empty());
    }

    #[test]
    fn fill_checks_reserved_type() {
        let mut g = Graph::new();
        let id = g.reserve("next", DataType::Int64).unwrap();
        let c = g
            .insert_node(def("c", Op::Const(Value::Bool(true)), vec![]))
            .unwrap();
        let err = g
            .fill_reserved(id, def("next", Op::NextIteration, vec![Output::new(c, 0)]))
            .unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut g = Graph::new();
        g.insert_node(def("x", Op::Const(Value::Int(1)), vec![]))
            .unwrap();
        let err = g
            .insert_node(def("x", Op::Const(Value::Int(2)), vec![]))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateName { name: "x".into() });
    }

    #[test]
    fn add_edge_rebinds_slot() {
        let mut g = Graph::new();
        let a = g.insert_node(def("a", Op::Const(Value::Int(1)), vec![])).unwrap();
        let b = g.insert_node(def("b", Op::Const(Value::Int(2)), vec![])).unwrap();
        let id = g
            .insert_node(def("id", Op::Identity, vec![Output::new(a, 0)]))
            .unwrap();
        g.add_edge(Output::new(b, 0), id, 0).unwrap();
        assert_eq!(g.node(id).unwrap().inputs, vec![Output::new(b, 0)]);
        assert!(g.add_edge(Output::new(b, 0), id, 3).is_err());
    }

    #[test]
    fn poisoned_status_keeps_first_error() {
        let mut g = Graph::new();
        assert!(g.status().is_ok());
        g.record_error(&GraphError::InvalidArgument("first".into()));
        g.record_error(&GraphError::InvalidArgument("second".into()));
        let err = g.status().unwrap_err();
        assert!(err.to_string().contains("first"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn peeked_names_are_the_next_unique_names(
                taken in proptest::collection::vec(0u32..6, 0..6),
                n in 1usize..5,
            ) {
                let mut g = Graph::new();
                // Pre-occupy some suffixed names so generation has to skip them.
                for k in taken {
                    let name = Graph::candidate_name("Merge", k);
                    if g.find_node(&name).is_none() {
                        g.insert_node(def(&name, Op::Const(Value::Int(0)), vec![])).unwrap();
                    }
                }

                let peeked = g.peek_unique_names("Merge", n);
                let generated: Vec<String> = (0..n).map(|_| g.unique_name("Merge")).collect();
                prop_assert_eq!(&peeked, &generated);
                for name in &generated {
                    prop_assert!(g.find_node(name).is_none());
                }
                let mut dedup = generated.clone();
                dedup.sort();
                dedup.dedup();
                prop_assert_eq!(dedup.len(), n);
            }
        }
    }
}
