//! Loop graph builder.
//!
//! A loop over n values is encoded with five primitives per value:
//!
//! ```text
//!   input_i ─► Enter_i ─► Merge_i ─► Switch_i ──true──► body ─► NextIteration_i ─┐
//!                           ▲          │    ▲                                     │
//!                           │          │    └── LoopCond ◄── cond(Merge_*)        │
//!                           │        false                                        │
//!                           │          ▼                                          │
//!                           │        Exit_i ─► output_i                           │
//!                           └─────────────────────────────────────────────────────┘
//! ```
//!
//! The NextIteration → Merge edge is the graph's only cycle. Merge needs it as
//! an input before the NextIteration node exists, so the builder reserves the
//! NextIteration slot first, builds Merge against the reservation, and fills
//! the slot once the body result is known.

use cf_core::{LoopContextId, NodeId};
use cf_graph::{DataType, GraphError, GraphResult, LoopContext, Output, Scope, ops};
use tracing::{debug, warn};

use crate::callbacks::{BodyFn, CondFn};

/// Handles to a freshly built loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    /// Exit values, one per loop-carried value.
    pub outputs: Vec<Output>,
    /// The LoopCond value evaluated on every iteration.
    pub cond_output: Output,
    /// Loop metadata, when recording was requested.
    pub context: Option<LoopContextId>,
}

/// Build a loop region running `body` while `cond` holds.
///
/// Nodes are created in `scope`; the condition and body subgraphs go into the
/// sub-scopes `cond` and `body`. All Enter nodes are tagged with `frame_name`.
/// With `create_while_ctx` the loop's metadata is registered and attached to
/// every Exit node so gradients can be built later.
///
/// Fails fast: an error leaves already-created nodes in place and becomes the
/// graph's sticky status.
pub fn build_while_loop(
    scope: &mut Scope<'_>,
    inputs: &[Output],
    cond: &dyn CondFn,
    body: &dyn BodyFn,
    frame_name: &str,
    create_while_ctx: bool,
) -> GraphResult<WhileLoop> {
    scope.status()?;
    if inputs.is_empty() {
        return Err(scope.fail(GraphError::InvalidArgument(
            "while loop needs at least one loop variable".into(),
        )));
    }

    let result = build_region(scope, inputs, cond, body, frame_name, create_while_ctx);
    result.map_err(|err| scope.fail(err))
}

fn build_region(
    scope: &mut Scope<'_>,
    inputs: &[Output],
    cond: &dyn CondFn,
    body: &dyn BodyFn,
    frame_name: &str,
    create_while_ctx: bool,
) -> GraphResult<WhileLoop> {
    let n = inputs.len();
    debug!(region = scope.name(), frame = frame_name, n, "building while loop");

    let enter_outputs = inputs
        .iter()
        .map(|&input| ops::enter(scope, input, frame_name))
        .collect::<GraphResult<Vec<_>>>()?;

    // Merge reads NextIteration before it exists: fix its names and slots now.
    let next_names = scope.peek_unique_names("NextIteration", n);
    let mut next_ids: Vec<NodeId> = Vec::with_capacity(n);
    for (name, &enter) in next_names.iter().zip(&enter_outputs) {
        let dtype: DataType = scope.graph().output_type(enter)?;
        next_ids.push(scope.reserve(name, dtype)?);
    }

    let mut merge_outputs = Vec::with_capacity(n);
    for (&enter, &next) in enter_outputs.iter().zip(&next_ids) {
        merge_outputs.push(ops::merge(scope, &[enter, Output::new(next, 0)])?.output);
    }

    // Constants in the condition graph must not run before the frame is entered.
    let raw_cond = {
        let mut cond_scope = scope
            .sub_scope("cond")
            .with_control_dependencies(&[merge_outputs[0]]);
        cond.build(&mut cond_scope, &merge_outputs)?
    };
    let cond_type = scope.graph().output_type(raw_cond)?;
    if cond_type != DataType::Bool {
        warn!(frame = frame_name, %cond_type, "loop condition is not boolean");
        return Err(GraphError::InvalidArgument(format!(
            "while loop condition must return a bool output, got {cond_type}"
        )));
    }
    let cond_output = ops::loop_cond(scope, raw_cond)?;

    let mut switch_trues = Vec::with_capacity(n);
    let mut switch_falses = Vec::with_capacity(n);
    for &merge in &merge_outputs {
        let sw = ops::switch(scope, merge, cond_output)?;
        switch_trues.push(sw.output_true);
        switch_falses.push(sw.output_false);
    }

    // Same for constants in the body: they wait for the first Switch-true value.
    let body_outputs = {
        let mut body_scope = scope
            .sub_scope("body")
            .with_control_dependencies(&[switch_trues[0]]);
        body.build(&mut body_scope, &switch_trues)?
    };
    if body_outputs.len() != n {
        warn!(frame = frame_name, expected = n, actual = body_outputs.len(), "loop body arity mismatch");
        return Err(GraphError::InvalidArgument(format!(
            "while loop body expected to return {n} outputs, got {}",
            body_outputs.len()
        )));
    }

    for ((&next, &body_out), expected) in next_ids.iter().zip(&body_outputs).zip(&next_names) {
        let name = ops::next_iteration_into(scope, next, body_out)?;
        assert_eq!(
            &name, expected,
            "NextIteration name drifted from its reservation; a callback created nodes in the loop's own scope"
        );
    }

    for (&next, &merge) in next_ids.iter().zip(&merge_outputs) {
        scope.add_edge(Output::new(next, 0), merge.node, 1)?;
    }

    let outputs = switch_falses
        .iter()
        .map(|&sw| ops::exit(scope, sw))
        .collect::<GraphResult<Vec<_>>>()?;

    let context = if create_while_ctx {
        let ctx = LoopContext::new(
            frame_name,
            enter_outputs.iter().map(|o| o.node).collect(),
            outputs.iter().map(|o| o.node).collect(),
            cond_output,
            switch_trues,
            body_outputs,
        );
        let id = scope.add_loop_context(ctx)?;
        for exit in &outputs {
            scope.set_loop_context(exit.node, id)?;
        }
        Some(id)
    } else {
        None
    };

    debug!(region = scope.name(), frame = frame_name, n, "while loop built");
    Ok(WhileLoop {
        outputs,
        cond_output,
        context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{body_fn, cond_fn};
    use cf_graph::{Graph, Op, loop_shape};

    fn count_ops(graph: &Graph, prefix: &str, op: &str) -> usize {
        graph
            .nodes()
            .filter(|n| n.name.starts_with(prefix) && n.op.type_name() == op)
            .count()
    }

    #[test]
    fn single_variable_loop_shape() {
        let mut graph = Graph::new();
        let mut root = Scope::new_root(&mut graph);
        let x0 = ops::constant(&mut root, 0_i64).unwrap();
        let mut region = root.sub_scope("while");
        let lp = build_while_loop(
            &mut region,
            &[x0],
            &cond_fn(|s, xs| {
                let limit = ops::scalar_like(s, xs[0], 10)?;
                ops::less(s, xs[0], limit)
            }),
            &body_fn(|s, xs| {
                let one = ops::scalar_like(s, xs[0], 1)?;
                Ok(vec![ops::add(s, xs[0], one)?])
            }),
            "frame",
            true,
        )
        .unwrap();

        let ctx = lp.context.unwrap();
        let shape = loop_shape(&graph, ctx).unwrap();
        assert_eq!(shape.num_loop_vars(), 1);
        assert_eq!(shape.cond, lp.cond_output);
        assert_eq!(graph.node(shape.next_iterations[0]).unwrap().name, "while/NextIteration");
        assert_eq!(graph.loop_context_of(lp.outputs[0]), Some(ctx));
        assert_eq!(count_ops(&graph, "while/", "LoopCond"), 1);
    }

    #[test]
    fn cond_constants_gate_on_first_merge() {
        let mut graph = Graph::new();
        let mut root = Scope::new_root(&mut graph);
        let x0 = ops::constant(&mut root, 0_i64).unwrap();
        let lp = build_while_loop(
            &mut root,
            &[x0],
            &cond_fn(|s, xs| {
                let limit = ops::scalar_like(s, xs[0], 3)?;
                ops::less(s, xs[0], limit)
            }),
            &body_fn(|s, xs| {
                let one = ops::scalar_like(s, xs[0], 1)?;
                Ok(vec![ops::add(s, xs[0], one)?])
            }),
            "frame",
            true,
        )
        .unwrap();

        let ctx = graph.loop_context(lp.context.unwrap()).unwrap().clone();
        let cond_const = graph.find_node("cond/Const").unwrap();
        let merge = graph.find_node("Merge").unwrap();
        assert_eq!(cond_const.control_inputs, vec![merge.output(0)]);

        let body_const = graph.find_node("body/Const").unwrap();
        assert_eq!(body_const.control_inputs, vec![ctx.body_inputs()[0]]);
        assert!(matches!(body_const.op, Op::Const(_)));
    }

    #[test]
    fn empty_inputs_rejected() {
        let mut graph = Graph::new();
        let mut root = Scope::new_root(&mut graph);
        let err = build_while_loop(
            &mut root,
            &[],
            &cond_fn(|_, xs| Ok(xs[0])),
            &body_fn(|_, xs| Ok(xs.to_vec())),
            "frame",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
        assert_eq!(graph.node_count(), 0);
    }
}
