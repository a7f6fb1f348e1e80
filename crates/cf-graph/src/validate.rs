//! Graph validation logic.

use cf_core::{LoopContextId, NodeId};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::adjacency::Consumers;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, Node, Output};
use crate::op::Op;
use crate::while_context::LoopContext;

/// Validate the whole graph: no sticky error, every reference resolves, no
/// reservation left unfilled, and the only cycles are loop back-edges.
pub fn validate(graph: &Graph) -> GraphResult<()> {
    graph.status()?;

    if let Some(&(node, name)) = graph.pending_reservations().first() {
        return Err(GraphError::DanglingReservation {
            node,
            name: name.to_string(),
        });
    }

    for node in graph.nodes() {
        for &input in node.inputs.iter().chain(&node.control_inputs) {
            graph.output_type(input)?;
        }
    }

    check_back_edges_only(graph)
}

/// A NextIteration feeding a Merge is the one edge allowed to close a cycle.
fn is_back_edge(producer: &Node, consumer: &Node) -> bool {
    matches!(producer.op, Op::NextIteration) && matches!(consumer.op, Op::Merge)
}

fn check_back_edges_only(graph: &Graph) -> GraphResult<()> {
    let mut dag: DiGraph<NodeId, ()> = DiGraph::with_capacity(graph.slot_count(), 0);
    let mut index: Vec<Option<NodeIndex>> = vec![None; graph.slot_count()];
    for node in graph.nodes() {
        index[node.id.slot()] = Some(dag.add_node(node.id));
    }

    for node in graph.nodes() {
        let Some(dst) = index[node.id.slot()] else {
            continue;
        };
        for input in node.inputs.iter().chain(&node.control_inputs) {
            let (Some(producer), Some(src)) = (graph.node(input.node), index[input.node.slot()])
            else {
                continue;
            };
            if !is_back_edge(producer, node) {
                dag.add_edge(src, dst, ());
            }
        }
    }

    toposort(&dag, None).map(|_| ()).map_err(|cycle| {
        let id = dag[cycle.node_id()];
        GraphError::UnexpectedCycle {
            name: graph
                .node(id)
                .map_or_else(|| id.to_string(), |n| n.name.clone()),
        }
    })
}

/// The primitive nodes of one recorded loop, one entry per loop-carried value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopShape {
    pub enters: Vec<NodeId>,
    pub merges: Vec<NodeId>,
    pub switches: Vec<NodeId>,
    pub next_iterations: Vec<NodeId>,
    pub exits: Vec<NodeId>,
    /// The LoopCond output shared by every Switch.
    pub cond: Output,
}

impl LoopShape {
    pub fn num_loop_vars(&self) -> usize {
        self.enters.len()
    }
}

/// Recover and check the Enter/Merge/Switch/NextIteration/Exit pattern of a loop.
///
/// Checks, per loop-carried value i: Merge i reads Enter i and NextIteration i,
/// NextIteration i reads body output i, Switch i routes Merge i on the shared
/// condition with its true branch as body input i, and Exit i reads the false branch.
pub fn loop_shape(graph: &Graph, id: LoopContextId) -> GraphResult<LoopShape> {
    let ctx = graph
        .loop_context(id)
        .ok_or(GraphError::UnknownLoopContext { id })?;
    let consumers = Consumers::from_graph(graph);
    let n = ctx.num_loop_vars();

    if ctx.exit_nodes().len() != n || ctx.body_inputs().len() != n || ctx.body_outputs().len() != n
    {
        return Err(malformed(ctx, "loop-carried value counts disagree".into()));
    }
    match graph.node(ctx.cond_output().node) {
        Some(node) if matches!(node.op, Op::LoopCond) => {}
        _ => return Err(malformed(ctx, "condition is not a LoopCond".into())),
    }

    let mut shape = LoopShape {
        enters: Vec::with_capacity(n),
        merges: Vec::with_capacity(n),
        switches: Vec::with_capacity(n),
        next_iterations: Vec::with_capacity(n),
        exits: Vec::with_capacity(n),
        cond: ctx.cond_output(),
    };

    for i in 0..n {
        let enter = node_with(graph, ctx, ctx.enter_nodes()[i], |op| {
            matches!(op, Op::Enter { frame_name } if frame_name == ctx.frame_name())
        })?;

        let merge = consumers
            .of(enter.id)
            .iter()
            .filter_map(|&c| graph.node(c))
            .find(|c| matches!(c.op, Op::Merge) && c.inputs.first() == Some(&enter.output(0)))
            .ok_or_else(|| malformed(ctx, format!("enter {i} feeds no Merge")))?;
        if merge.inputs.len() != 2 {
            return Err(malformed(
                ctx,
                format!("merge {i} has {} inputs, expected 2", merge.inputs.len()),
            ));
        }

        let next = node_with(graph, ctx, merge.inputs[1].node, |op| {
            matches!(op, Op::NextIteration)
        })?;
        if next.inputs.first() != Some(&ctx.body_outputs()[i]) {
            return Err(malformed(
                ctx,
                format!("next iteration {i} does not read body output {i}"),
            ));
        }

        let switch = consumers
            .of(merge.id)
            .iter()
            .filter_map(|&c| graph.node(c))
            .find(|c| {
                matches!(c.op, Op::Switch) && c.inputs == [merge.output(0), ctx.cond_output()]
            })
            .ok_or_else(|| malformed(ctx, format!("merge {i} feeds no Switch on the condition")))?;
        if ctx.body_inputs()[i] != switch.output(1) {
            return Err(malformed(
                ctx,
                format!("body input {i} is not the true branch of switch {i}"),
            ));
        }

        let exit = node_with(graph, ctx, ctx.exit_nodes()[i], |op| matches!(op, Op::Exit))?;
        if exit.inputs.first() != Some(&switch.output(0)) {
            return Err(malformed(
                ctx,
                format!("exit {i} does not read the false branch of switch {i}"),
            ));
        }

        shape.enters.push(enter.id);
        shape.merges.push(merge.id);
        shape.switches.push(switch.id);
        shape.next_iterations.push(next.id);
        shape.exits.push(exit.id);
    }

    Ok(shape)
}

fn node_with<'a>(
    graph: &'a Graph,
    ctx: &LoopContext,
    id: NodeId,
    accept: impl Fn(&Op) -> bool,
) -> GraphResult<&'a Node> {
    match graph.node(id) {
        Some(node) if accept(&node.op) => Ok(node),
        Some(node) => Err(malformed(
            ctx,
            format!("node '{}' has unexpected op {}", node.name, node.op.type_name()),
        )),
        None => Err(GraphError::UnknownNode { node: id }),
    }
}

fn malformed(ctx: &LoopContext, what: String) -> GraphError {
    GraphError::MalformedLoop {
        frame: ctx.frame_name().to_string(),
        what,
    }
}
