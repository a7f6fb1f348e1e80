//! Scalar kernels for the ordinary (non-loop) ops.

use cf_core::{CoreError, ensure_finite};
use cf_graph::{Node, Op, Value};

use crate::error::{ExecError, ExecResult};

/// Evaluate a single-output ordinary op on live argument values.
pub(crate) fn eval(node: &Node, args: &[Value]) -> ExecResult<Value> {
    match &node.op {
        Op::Const(v) => Ok(*v),
        Op::Identity | Op::LoopCond => Ok(args[0]),
        Op::ZerosLike => Ok(Value::zero(args[0].dtype())),
        Op::Neg => match args[0] {
            Value::Int(a) => a
                .checked_neg()
                .map(Value::Int)
                .ok_or(CoreError::Overflow { what: "Neg" }.into()),
            Value::Float(a) => Ok(Value::Float(-a)),
            other => Err(mismatch(node, &[other])),
        },
        Op::Add | Op::Sub | Op::Mul => arith(node, args[0], args[1]),
        Op::Less | Op::Greater => compare(node, args[0], args[1]),
        Op::Custom { name, .. } => Err(ExecError::Unsupported {
            node: node.name.clone(),
            op: name.clone(),
        }),
        Op::Enter { .. } | Op::Merge | Op::Switch | Op::NextIteration | Op::Exit => {
            Err(ExecError::Unsupported {
                node: node.name.clone(),
                op: node.op.type_name().to_string(),
            })
        }
    }
}

fn arith(node: &Node, a: Value, b: Value) -> ExecResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            let (r, what) = match node.op {
                Op::Add => (x.checked_add(y), "Add"),
                Op::Sub => (x.checked_sub(y), "Sub"),
                _ => (x.checked_mul(y), "Mul"),
            };
            r.map(Value::Int)
                .ok_or(CoreError::Overflow { what }.into())
        }
        (Value::Float(x), Value::Float(y)) => {
            let (r, what) = match node.op {
                Op::Add => (x + y, "Add"),
                Op::Sub => (x - y, "Sub"),
                _ => (x * y, "Mul"),
            };
            Ok(Value::Float(ensure_finite(r, what)?))
        }
        _ => Err(mismatch(node, &[a, b])),
    }
}

fn compare(node: &Node, a: Value, b: Value) -> ExecResult<Value> {
    let less = matches!(node.op, Op::Less);
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Bool(if less { x < y } else { x > y })),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Bool(if less { x < y } else { x > y })),
        _ => Err(mismatch(node, &[a, b])),
    }
}

fn mismatch(node: &Node, args: &[Value]) -> ExecError {
    let actual = args
        .iter()
        .map(|v| v.dtype().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    ExecError::TypeMismatch {
        node: node.name.clone(),
        op: node.op.type_name().to_string(),
        actual,
    }
}
