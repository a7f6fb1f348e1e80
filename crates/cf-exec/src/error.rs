//! Error types for graph execution.

use cf_core::CoreError;
use cf_graph::GraphError;
use thiserror::Error;

/// Errors raised while interpreting a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// The graph is poisoned or structurally invalid.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Numeric error: {0}")]
    Core(#[from] CoreError),

    #[error("{op} on node '{node}' cannot take {actual}")]
    TypeMismatch {
        node: String,
        op: String,
        actual: String,
    },

    /// NextIteration or Exit reached at the root region.
    #[error("Node '{node}' ({op}) ran outside any loop frame")]
    NotInFrame { node: String, op: String },

    #[error("Loop through node '{node}' exceeded {limit} iterations")]
    IterationLimit { node: String, limit: u32 },

    #[error("Op '{op}' on node '{node}' has no evaluation rule")]
    Unsupported { node: String, op: String },
}

pub type ExecResult<T> = Result<T, ExecError>;
