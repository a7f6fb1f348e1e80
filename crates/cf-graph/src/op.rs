//! Operation kinds and their output-type rules.

use crate::error::{GraphError, GraphResult};
use crate::types::{DataType, Value};

/// The operation a node performs.
///
/// The first six variants are the loop vocabulary; the rest are ordinary
/// acyclic ops used by condition and body subgraphs.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Moves a value from the enclosing region into the frame `frame_name`.
    Enter { frame_name: String },
    /// Forwards whichever input is available: the Enter value on iteration 0,
    /// the NextIteration value afterwards. Outputs `(value, value_index)`.
    Merge,
    /// Routes `data` to slot 1 when `pred` is true, slot 0 otherwise.
    Switch,
    /// Carries a body result back to the Merge of the next iteration.
    NextIteration,
    /// Moves a value out of its frame into the enclosing region.
    Exit,
    /// Marks the boolean that decides whether a loop keeps iterating.
    LoopCond,
    Const(Value),
    Identity,
    Add,
    Sub,
    Mul,
    Neg,
    Less,
    Greater,
    ZerosLike,
    /// Caller-defined op with explicit output types.
    Custom {
        name: String,
        output_types: Vec<DataType>,
    },
}

impl Op {
    /// Op type name, also used as the base for generated node names.
    pub fn type_name(&self) -> &str {
        match self {
            Op::Enter { .. } => "Enter",
            Op::Merge => "Merge",
            Op::Switch => "Switch",
            Op::NextIteration => "NextIteration",
            Op::Exit => "Exit",
            Op::LoopCond => "LoopCond",
            Op::Const(_) => "Const",
            Op::Identity => "Identity",
            Op::Add => "Add",
            Op::Sub => "Sub",
            Op::Mul => "Mul",
            Op::Neg => "Neg",
            Op::Less => "Less",
            Op::Greater => "Greater",
            Op::ZerosLike => "ZerosLike",
            Op::Custom { name, .. } => name,
        }
    }

    /// True for the loop primitives (Enter, Merge, Switch, NextIteration, Exit, LoopCond).
    pub fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Op::Enter { .. } | Op::Merge | Op::Switch | Op::NextIteration | Op::Exit | Op::LoopCond
        )
    }

    /// Infer output types from input types.
    pub fn infer_output_types(&self, inputs: &[DataType]) -> GraphResult<Vec<DataType>> {
        match self {
            Op::Enter { .. } | Op::NextIteration | Op::Exit | Op::Identity | Op::ZerosLike => {
                self.expect_arity(inputs, 1)?;
                Ok(vec![inputs[0]])
            }
            Op::Merge => {
                if inputs.is_empty() {
                    return Err(self.arity_error(1, 0));
                }
                for &ty in &inputs[1..] {
                    self.expect_type(ty, inputs[0])?;
                }
                Ok(vec![inputs[0], DataType::Int64])
            }
            Op::Switch => {
                self.expect_arity(inputs, 2)?;
                self.expect_type(inputs[1], DataType::Bool)?;
                Ok(vec![inputs[0], inputs[0]])
            }
            Op::LoopCond => {
                self.expect_arity(inputs, 1)?;
                self.expect_type(inputs[0], DataType::Bool)?;
                Ok(vec![DataType::Bool])
            }
            Op::Const(value) => {
                self.expect_arity(inputs, 0)?;
                Ok(vec![value.dtype()])
            }
            Op::Add | Op::Sub | Op::Mul => {
                self.expect_arity(inputs, 2)?;
                self.expect_numeric(inputs[0])?;
                self.expect_type(inputs[1], inputs[0])?;
                Ok(vec![inputs[0]])
            }
            Op::Neg => {
                self.expect_arity(inputs, 1)?;
                self.expect_numeric(inputs[0])?;
                Ok(vec![inputs[0]])
            }
            Op::Less | Op::Greater => {
                self.expect_arity(inputs, 2)?;
                self.expect_numeric(inputs[0])?;
                self.expect_type(inputs[1], inputs[0])?;
                Ok(vec![DataType::Bool])
            }
            Op::Custom { output_types, .. } => Ok(output_types.clone()),
        }
    }

    fn expect_arity(&self, inputs: &[DataType], expected: usize) -> GraphResult<()> {
        if inputs.len() == expected {
            Ok(())
        } else {
            Err(self.arity_error(expected, inputs.len()))
        }
    }

    fn arity_error(&self, expected: usize, actual: usize) -> GraphError {
        GraphError::Arity {
            op: self.type_name().to_string(),
            expected,
            actual,
        }
    }

    fn expect_type(&self, actual: DataType, expected: DataType) -> GraphResult<()> {
        if actual == expected {
            Ok(())
        } else {
            Err(GraphError::TypeMismatch {
                op: self.type_name().to_string(),
                expected: expected.to_string(),
                actual,
            })
        }
    }

    fn expect_numeric(&self, actual: DataType) -> GraphResult<()> {
        if actual.is_numeric() {
            Ok(())
        } else {
            Err(GraphError::TypeMismatch {
                op: self.type_name().to_string(),
                expected: "numeric".to_string(),
                actual,
            })
        }
    }
}
