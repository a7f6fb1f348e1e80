//! cf-graph: graph/model layer for cycleflow.
//!
//! Provides:
//! - Graph arena with forward reservations (how loop back-edges are closed)
//! - Construction scopes with unique naming, control dependencies and sticky errors
//! - Typed op constructors and output-type inference
//! - Loop metadata records and structural validation
//!
//! # Example
//!
//! ```
//! use cf_graph::{ops, validate, Graph, Scope};
//!
//! let mut graph = Graph::new();
//! let mut scope = Scope::new_root(&mut graph);
//! let x = ops::constant(&mut scope, 2_i64).unwrap();
//! let y = ops::constant(&mut scope, 3_i64).unwrap();
//! let sum = ops::add(&mut scope, x, y).unwrap();
//!
//! assert_eq!(graph.node(sum.node).unwrap().name, "Add");
//! assert!(validate(&graph).is_ok());
//! ```

pub mod adjacency;
pub mod error;
pub mod graph;
pub mod op;
pub mod ops;
pub mod scope;
pub mod types;
pub mod validate;
pub mod while_context;

// Re-exports for ergonomics
pub use adjacency::Consumers;
pub use error::{GraphError, GraphResult};
pub use graph::{Graph, Node, NodeDef, Output};
pub use op::Op;
pub use scope::Scope;
pub use types::{DataType, Value};
pub use validate::{LoopShape, loop_shape, validate};
pub use while_context::LoopContext;
