//! Typed constructors for every op kind.
//!
//! Each constructor creates one node in the given scope and returns references
//! to its outputs.

use cf_core::NodeId;

use crate::error::GraphResult;
use crate::graph::Output;
use crate::op::Op;
use crate::scope::Scope;
use crate::types::{DataType, Value};

/// Outputs of a Merge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutputs {
    pub output: Output,
    /// Which input was forwarded (`Int64`).
    pub value_index: Output,
}

/// Outputs of a Switch node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutputs {
    pub output_false: Output,
    pub output_true: Output,
}

fn single(scope: &mut Scope<'_>, op: Op, inputs: Vec<Output>) -> GraphResult<Output> {
    let id = scope.add_node(op, inputs)?;
    Ok(Output::new(id, 0))
}

pub fn constant(scope: &mut Scope<'_>, value: impl Into<Value>) -> GraphResult<Output> {
    single(scope, Op::Const(value.into()), Vec::new())
}

/// Constant with the same type as `like`, converted from an integer literal.
pub fn scalar_like(scope: &mut Scope<'_>, like: Output, v: i64) -> GraphResult<Output> {
    let dtype: DataType = scope.graph().output_type(like)?;
    constant(scope, Value::scalar(dtype, v))
}

pub fn identity(scope: &mut Scope<'_>, x: Output) -> GraphResult<Output> {
    single(scope, Op::Identity, vec![x])
}

pub fn add(scope: &mut Scope<'_>, x: Output, y: Output) -> GraphResult<Output> {
    single(scope, Op::Add, vec![x, y])
}

pub fn sub(scope: &mut Scope<'_>, x: Output, y: Output) -> GraphResult<Output> {
    single(scope, Op::Sub, vec![x, y])
}

pub fn mul(scope: &mut Scope<'_>, x: Output, y: Output) -> GraphResult<Output> {
    single(scope, Op::Mul, vec![x, y])
}

pub fn neg(scope: &mut Scope<'_>, x: Output) -> GraphResult<Output> {
    single(scope, Op::Neg, vec![x])
}

pub fn less(scope: &mut Scope<'_>, x: Output, y: Output) -> GraphResult<Output> {
    single(scope, Op::Less, vec![x, y])
}

pub fn greater(scope: &mut Scope<'_>, x: Output, y: Output) -> GraphResult<Output> {
    single(scope, Op::Greater, vec![x, y])
}

pub fn zeros_like(scope: &mut Scope<'_>, x: Output) -> GraphResult<Output> {
    single(scope, Op::ZerosLike, vec![x])
}

/// Caller-defined op; returns the node so callers can pick any output slot.
pub fn custom(
    scope: &mut Scope<'_>,
    name: &str,
    inputs: Vec<Output>,
    output_types: Vec<DataType>,
) -> GraphResult<NodeId> {
    scope.add_node(
        Op::Custom {
            name: name.to_string(),
            output_types,
        },
        inputs,
    )
}

pub fn enter(scope: &mut Scope<'_>, x: Output, frame_name: &str) -> GraphResult<Output> {
    single(
        scope,
        Op::Enter {
            frame_name: frame_name.to_string(),
        },
        vec![x],
    )
}

pub fn merge(scope: &mut Scope<'_>, inputs: &[Output]) -> GraphResult<MergeOutputs> {
    let id = scope.add_node(Op::Merge, inputs.to_vec())?;
    Ok(MergeOutputs {
        output: Output::new(id, 0),
        value_index: Output::new(id, 1),
    })
}

pub fn switch(scope: &mut Scope<'_>, data: Output, pred: Output) -> GraphResult<SwitchOutputs> {
    let id = scope.add_node(Op::Switch, vec![data, pred])?;
    Ok(SwitchOutputs {
        output_false: Output::new(id, 0),
        output_true: Output::new(id, 1),
    })
}

pub fn loop_cond(scope: &mut Scope<'_>, pred: Output) -> GraphResult<Output> {
    single(scope, Op::LoopCond, vec![pred])
}

/// Create a NextIteration node in a previously reserved slot; returns its generated name.
pub fn next_iteration_into(
    scope: &mut Scope<'_>,
    reserved: NodeId,
    x: Output,
) -> GraphResult<String> {
    scope.fill_reserved(reserved, Op::NextIteration, vec![x])
}

pub fn exit(scope: &mut Scope<'_>, x: Output) -> GraphResult<Output> {
    single(scope, Op::Exit, vec![x])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    #[test]
    fn scalar_like_matches_type() {
        let mut graph = Graph::new();
        let mut scope = Scope::new_root(&mut graph);
        let x = constant(&mut scope, 2.5).unwrap();
        let one = scalar_like(&mut scope, x, 1).unwrap();
        let sum = add(&mut scope, x, one).unwrap();
        assert_eq!(scope.graph().output_type(sum).unwrap(), DataType::Float64);
        let node = scope.graph().node(one.node).unwrap();
        assert_eq!(node.op, Op::Const(Value::Float(1.0)));
    }

    #[test]
    fn switch_exposes_both_branches() {
        let mut graph = Graph::new();
        let mut scope = Scope::new_root(&mut graph);
        let x = constant(&mut scope, 1_i64).unwrap();
        let p = constant(&mut scope, true).unwrap();
        let sw = switch(&mut scope, x, p).unwrap();
        assert_eq!(sw.output_false.node, sw.output_true.node);
        assert_eq!(sw.output_false.index, 0);
        assert_eq!(sw.output_true.index, 1);
    }
}
