//! Structural tests for the loop builder.

use cf_graph::{Graph, GraphError, Op, Output, Scope, loop_shape, ops, validate};
use cf_loops::{body_fn, build_while_loop, cond_fn};

fn count_op(graph: &Graph, type_name: &str) -> usize {
    graph
        .nodes()
        .filter(|n| n.op.type_name() == type_name)
        .count()
}

/// `while x0 < limit: xi += 1` over `n` integer values.
fn build_counting_loop(
    scope: &mut Scope<'_>,
    n: usize,
    frame: &str,
) -> Result<cf_loops::WhileLoop, GraphError> {
    counting_loop(scope, n, frame, true)
}

fn counting_loop(
    scope: &mut Scope<'_>,
    n: usize,
    frame: &str,
    create_while_ctx: bool,
) -> Result<cf_loops::WhileLoop, GraphError> {
    let inputs = (0..n)
        .map(|i| ops::constant(scope, i as i64))
        .collect::<Result<Vec<_>, _>>()?;
    build_while_loop(
        scope,
        &inputs,
        &cond_fn(|s, xs| {
            let limit = ops::scalar_like(s, xs[0], 10)?;
            ops::less(s, xs[0], limit)
        }),
        &body_fn(|s, xs| {
            xs.iter()
                .map(|&x| {
                    let one = ops::scalar_like(s, x, 1)?;
                    ops::add(s, x, one)
                })
                .collect()
        }),
        frame,
        create_while_ctx,
    )
}

/// Nodes whose name starts with `prefix/`, in id order, as
/// (name without prefix, op, data inputs, control inputs) with every
/// producer replaced by its position in the region.
fn region_layout(
    graph: &Graph,
    prefix: &str,
) -> Vec<(String, Op, Vec<(Option<usize>, u32)>, Vec<Option<usize>>)> {
    let head = format!("{prefix}/");
    let nodes: Vec<_> = graph.nodes().filter(|n| n.name.starts_with(&head)).collect();
    let position = |id| nodes.iter().position(|n| n.id == id);
    nodes
        .iter()
        .map(|n| {
            (
                n.name[head.len()..].to_string(),
                n.op.clone(),
                n.inputs.iter().map(|o| (position(o.node), o.index)).collect(),
                n.control_inputs.iter().map(|o| position(o.node)).collect(),
            )
        })
        .collect()
}

#[test]
fn back_edges_close_each_merge() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let lp = build_counting_loop(&mut root, 2, "pair").unwrap();
    let ctx_id = lp.context.unwrap();

    let shape = loop_shape(&graph, ctx_id).unwrap();
    let ctx = graph.loop_context(ctx_id).unwrap();
    for i in 0..2 {
        let merge = graph.node(shape.merges[i]).unwrap();
        assert_eq!(merge.inputs[0], Output::new(shape.enters[i], 0));
        assert_eq!(merge.inputs[1], Output::new(shape.next_iterations[i], 0));
        let next = graph.node(shape.next_iterations[i]).unwrap();
        assert_eq!(next.inputs, vec![ctx.body_outputs()[i]]);
    }
    assert_eq!(ctx.frame_name(), "pair");
    assert!(validate(&graph).is_ok());
}

#[test]
fn next_iteration_names_follow_region() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let mut region = root.sub_scope("outer");
    let lp = build_counting_loop(&mut region, 3, "f").unwrap();

    let shape = loop_shape(&graph, lp.context.unwrap()).unwrap();
    let names: Vec<_> = shape
        .next_iterations
        .iter()
        .map(|&id| graph.node(id).unwrap().name.clone())
        .collect();
    assert_eq!(
        names,
        vec![
            "outer/NextIteration",
            "outer/NextIteration_1",
            "outer/NextIteration_2"
        ]
    );
}

#[test]
fn two_loops_in_one_scope() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let first = build_counting_loop(&mut root, 1, "first").unwrap();
    let second = build_counting_loop(&mut root, 1, "second").unwrap();

    let a = loop_shape(&graph, first.context.unwrap()).unwrap();
    let b = loop_shape(&graph, second.context.unwrap()).unwrap();
    assert_eq!(graph.node(a.next_iterations[0]).unwrap().name, "NextIteration");
    assert_eq!(graph.node(b.next_iterations[0]).unwrap().name, "NextIteration_1");
    assert_eq!(count_op(&graph, "LoopCond"), 2);
    assert!(validate(&graph).is_ok());
}

#[test]
fn identical_builds_give_disjoint_identical_regions() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let a = counting_loop(&mut root.sub_scope("a"), 2, "f", false).unwrap();
    let b = counting_loop(&mut root.sub_scope("b"), 2, "f", false).unwrap();

    let left = region_layout(&graph, "a");
    let right = region_layout(&graph, "b");
    assert!(!left.is_empty());
    assert_eq!(left, right);

    let ids = |prefix: &str| -> std::collections::HashSet<_> {
        let head = format!("{prefix}/");
        graph
            .nodes()
            .filter(|n| n.name.starts_with(&head))
            .map(|n| n.id)
            .collect()
    };
    assert!(ids("a").is_disjoint(&ids("b")));
    assert_eq!(ids("a").len() + ids("b").len(), graph.node_count());

    // Every edge stays inside its own region.
    for (_, _, inputs, controls) in left.iter().chain(&right) {
        assert!(inputs.iter().all(|(p, _)| p.is_some()));
        assert!(controls.iter().all(Option::is_some));
    }
    assert_ne!(a.outputs, b.outputs);
    assert_ne!(a.cond_output, b.cond_output);
    assert!(validate(&graph).is_ok());
}

#[test]
fn non_bool_condition_is_rejected() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let x = ops::constant(&mut root, 1.5).unwrap();
    let err = build_while_loop(
        &mut root,
        &[x],
        &cond_fn(|_, xs| Ok(xs[0])),
        &body_fn(|_, xs| Ok(xs.to_vec())),
        "f",
        true,
    )
    .unwrap_err();

    match err {
        GraphError::InvalidArgument(msg) => assert!(msg.contains("float64"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(graph.loop_contexts().count(), 0);
    assert_eq!(count_op(&graph, "LoopCond"), 0);
    assert!(graph.error().is_some());
}

#[test]
fn body_arity_mismatch_is_rejected() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let x = ops::constant(&mut root, 0_i64).unwrap();
    let y = ops::constant(&mut root, 0_i64).unwrap();
    let err = build_while_loop(
        &mut root,
        &[x, y],
        &cond_fn(|s, xs| {
            let ten = ops::scalar_like(s, xs[0], 10)?;
            ops::less(s, xs[0], ten)
        }),
        &body_fn(|_, xs| Ok(vec![xs[0]])),
        "f",
        true,
    )
    .unwrap_err();

    match err {
        GraphError::InvalidArgument(msg) => {
            assert!(msg.contains("expected to return 2"), "{msg}");
            assert!(msg.contains("got 1"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
    // The reservations were never filled.
    assert!(!graph.pending_reservations().is_empty());
    assert!(validate(&graph).is_err());
}

#[test]
fn failure_poisons_later_builds() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let x = ops::constant(&mut root, 1_i64).unwrap();
    let _ = build_while_loop(
        &mut root,
        &[x],
        &cond_fn(|_, xs| Ok(xs[0])),
        &body_fn(|_, xs| Ok(xs.to_vec())),
        "bad",
        true,
    );

    let before = root.graph().node_count();
    let err = build_counting_loop(&mut root, 1, "good").unwrap_err();
    assert!(matches!(err, GraphError::Poisoned { .. }));
    assert_eq!(graph.node_count(), before);
}

#[test]
fn callback_error_propagates() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let x = ops::constant(&mut root, 1_i64).unwrap();
    let err = build_while_loop(
        &mut root,
        &[x],
        &cond_fn(|s, xs| {
            let flag = ops::constant(s, true)?;
            ops::less(s, xs[0], flag)
        }),
        &body_fn(|_, xs| Ok(xs.to_vec())),
        "f",
        false,
    )
    .unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
    assert_eq!(graph.error(), Some(&err));
}

#[test]
fn duplicate_frame_is_rejected() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    build_counting_loop(&mut root, 1, "same").unwrap();
    let err = build_counting_loop(&mut root, 1, "same").unwrap_err();
    assert_eq!(
        err,
        GraphError::DuplicateFrame {
            frame: "same".into()
        }
    );
}

#[test]
fn without_context_nothing_is_recorded() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let x = ops::constant(&mut root, 0_i64).unwrap();
    let lp = build_while_loop(
        &mut root,
        &[x],
        &cond_fn(|s, xs| {
            let ten = ops::scalar_like(s, xs[0], 10)?;
            ops::less(s, xs[0], ten)
        }),
        &body_fn(|_, xs| Ok(xs.to_vec())),
        "plain",
        false,
    )
    .unwrap();

    assert_eq!(lp.context, None);
    assert_eq!(graph.loop_contexts().count(), 0);
    assert_eq!(graph.loop_context_of(lp.outputs[0]), None);
    assert_eq!(graph.node(lp.cond_output.node).unwrap().op, Op::LoopCond);
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn primitive_counts_match_arity(n in 1usize..=3) {
            let mut graph = Graph::new();
            let mut root = Scope::new_root(&mut graph);
            let lp = build_counting_loop(&mut root, n, "f").unwrap();

            prop_assert_eq!(lp.outputs.len(), n);
            for op in ["Enter", "Merge", "Switch", "NextIteration", "Exit"] {
                prop_assert_eq!(count_op(&graph, op), n, "{}", op);
            }
            prop_assert_eq!(count_op(&graph, "LoopCond"), 1);

            let shape = loop_shape(&graph, lp.context.unwrap()).unwrap();
            prop_assert_eq!(shape.num_loop_vars(), n);
            for &exit in &shape.exits {
                prop_assert_eq!(graph.node(exit).unwrap().loop_context, lp.context);
            }
            prop_assert!(validate(&graph).is_ok());
        }
    }
}
