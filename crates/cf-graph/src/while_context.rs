//! Loop metadata recorded when a loop is built for later differentiation.

use cf_core::NodeId;

use crate::graph::Output;

/// Describes one loop region: its frame, entry and exit points, the per-iteration
/// condition, and the body's input/output relation.
///
/// Created once by the loop builder, read-only afterwards. Every Exit node of
/// the loop carries the id of its context.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopContext {
    frame_name: String,
    enter_nodes: Vec<NodeId>,
    exit_nodes: Vec<NodeId>,
    cond_output: Output,
    body_inputs: Vec<Output>,
    body_outputs: Vec<Output>,
}

impl LoopContext {
    pub fn new(
        frame_name: impl Into<String>,
        enter_nodes: Vec<NodeId>,
        exit_nodes: Vec<NodeId>,
        cond_output: Output,
        body_inputs: Vec<Output>,
        body_outputs: Vec<Output>,
    ) -> Self {
        Self {
            frame_name: frame_name.into(),
            enter_nodes,
            exit_nodes,
            cond_output,
            body_inputs,
            body_outputs,
        }
    }

    pub fn frame_name(&self) -> &str {
        &self.frame_name
    }

    pub fn enter_nodes(&self) -> &[NodeId] {
        &self.enter_nodes
    }

    pub fn exit_nodes(&self) -> &[NodeId] {
        &self.exit_nodes
    }

    /// The LoopCond output evaluated once per iteration.
    pub fn cond_output(&self) -> Output {
        self.cond_output
    }

    /// Switch-true outputs: the loop-carried values as seen inside the body.
    pub fn body_inputs(&self) -> &[Output] {
        &self.body_inputs
    }

    /// Values the body hands to the NextIteration nodes.
    pub fn body_outputs(&self) -> &[Output] {
        &self.body_outputs
    }

    /// Number of loop-carried values.
    pub fn num_loop_vars(&self) -> usize {
        self.enter_nodes.len()
    }
}
