//! Graph-specific error types.

use cf_core::{LoopContextId, NodeId};
use thiserror::Error;

use crate::types::DataType;

pub type GraphResult<T> = Result<T, GraphError>;

/// Graph construction and validation errors.
///
/// The first error produced through a [`Scope`](crate::Scope) is recorded on the
/// graph; every later construction call then fails with [`GraphError::Poisoned`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// The graph already recorded an earlier construction failure.
    #[error("Graph construction already failed: {cause}")]
    Poisoned { cause: String },

    /// A caller broke an operation's contract (wrong count, wrong type, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{op} expects {expected} input(s), got {actual}")]
    Arity {
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("{op}: expected {expected} input, got {actual}")]
    TypeMismatch {
        op: String,
        expected: String,
        actual: DataType,
    },

    #[error("Unknown node {node}")]
    UnknownNode { node: NodeId },

    #[error("Node {node} has no output slot {slot}")]
    InvalidSlot { node: NodeId, slot: u32 },

    #[error("Node {node} has no input slot {slot}")]
    InvalidInputSlot { node: NodeId, slot: usize },

    #[error("Node name '{name}' is already taken")]
    DuplicateName { name: String },

    /// `fill_reserved` targeted a slot that is not a pending reservation.
    #[error("Node {node} is not a pending forward reservation")]
    NotReserved { node: NodeId },

    /// A reserved node was referenced but never created.
    #[error("Forward reference '{name}' ({node}) was never filled")]
    DanglingReservation { node: NodeId, name: String },

    #[error("A loop context for frame '{frame}' already exists")]
    DuplicateFrame { frame: String },

    #[error("Unknown loop context {id}")]
    UnknownLoopContext { id: LoopContextId },

    #[error("No gradient rule registered for op '{op}'")]
    NoGradient { op: String },

    #[error("Cycle through node '{name}' that is not a loop back-edge")]
    UnexpectedCycle { name: String },

    #[error("Malformed loop '{frame}': {what}")]
    MalformedLoop { frame: String, what: String },
}
