//! cf-exec: reference interpreter for cycleflow graphs.
//!
//! Executes a graph with tagged tokens so loops built by `cf-loops` can be
//! checked by running them: iteration counts, per-iteration condition values
//! and gradients.
//!
//! # Example
//!
//! ```
//! use cf_exec::Interpreter;
//! use cf_graph::{ops, Graph, Scope, Value};
//!
//! let mut graph = Graph::new();
//! let mut scope = Scope::new_root(&mut graph);
//! let x = ops::constant(&mut scope, 2_i64).unwrap();
//! let y = ops::constant(&mut scope, 5_i64).unwrap();
//! let sum = ops::add(&mut scope, x, y).unwrap();
//!
//! let exec = Interpreter::new(&graph).unwrap().run().unwrap();
//! assert_eq!(exec.value(sum), Some(Value::Int(7)));
//! ```

pub mod error;
pub mod interpreter;
mod kernels;

pub use error::{ExecError, ExecResult};
pub use interpreter::{ExecOptions, Execution, Interpreter, Tag, Token};
