//! Integration tests for cf-graph.

use cf_graph::{DataType, Graph, GraphError, Op, Output, Scope, Value, ops, validate};

#[test]
fn names_are_scoped_and_unique() {
    let mut graph = Graph::new();
    let mut root = Scope::new_root(&mut graph);
    let mut outer = root.sub_scope("outer");
    let a = ops::constant(&mut outer, 1_i64).unwrap();
    let b = ops::constant(&mut outer, 2_i64).unwrap();
    let sum = ops::add(&mut outer, a, b).unwrap();

    assert_eq!(graph.node(a.node).unwrap().name, "outer/Const");
    assert_eq!(graph.node(b.node).unwrap().name, "outer/Const_1");
    assert_eq!(graph.node(sum.node).unwrap().name, "outer/Add");
    assert_eq!(graph.find_node("outer/Add").unwrap().id, sum.node);
}

#[test]
fn reservation_closes_a_cycle() {
    // Enter -> Merge <- NextIteration(Merge + 1)
    let mut graph = Graph::new();
    let mut scope = Scope::new_root(&mut graph);
    let zero = ops::constant(&mut scope, 0_i64).unwrap();
    let enter = ops::enter(&mut scope, zero, "frame").unwrap();

    let expected = scope.peek_unique_names("NextIteration", 1);
    let next = scope.reserve(&expected[0], DataType::Int64).unwrap();
    let merge = ops::merge(&mut scope, &[enter, Output::new(next, 0)]).unwrap();
    let one = ops::scalar_like(&mut scope, merge.output, 1).unwrap();
    let inc = ops::add(&mut scope, merge.output, one).unwrap();
    let name = ops::next_iteration_into(&mut scope, next, inc).unwrap();
    assert_eq!(name, expected[0]);
    scope.add_edge(Output::new(next, 0), merge.output.node, 1).unwrap();

    let merge_node = graph.node(merge.output.node).unwrap();
    assert_eq!(merge_node.inputs, vec![enter, Output::new(next, 0)]);
    assert_eq!(graph.node(next).unwrap().op, Op::NextIteration);
    assert!(validate(&graph).is_ok());
}

#[test]
fn type_errors_stick() {
    let mut graph = Graph::new();
    let mut scope = Scope::new_root(&mut graph);
    let x = ops::constant(&mut scope, 1.0).unwrap();
    let flag = ops::constant(&mut scope, Value::Bool(false)).unwrap();
    assert!(matches!(
        ops::add(&mut scope, x, flag),
        Err(GraphError::TypeMismatch { .. })
    ));
    assert!(matches!(
        ops::constant(&mut scope, 2.0),
        Err(GraphError::Poisoned { .. })
    ));
    assert!(validate(&graph).is_err());
}
