//! cf-loops: loop construction and loop differentiation.
//!
//! Provides:
//! - [`build_while_loop`]: a loop region from condition and body strategies
//! - Forward and backward iteration counters and the gradient loop
//! - [`GradientRegistry`]: per-op symbolic gradient rules
//!
//! # Example
//!
//! ```
//! use cf_graph::{ops, validate, Graph, Scope};
//! use cf_loops::{body_fn, build_while_loop, cond_fn};
//!
//! let mut graph = Graph::new();
//! let mut root = Scope::new_root(&mut graph);
//! let x = ops::constant(&mut root, 0_i64).unwrap();
//! let lp = build_while_loop(
//!     &mut root,
//!     &[x],
//!     &cond_fn(|s, xs| {
//!         let five = ops::scalar_like(s, xs[0], 5)?;
//!         ops::less(s, xs[0], five)
//!     }),
//!     &body_fn(|s, xs| {
//!         let two = ops::scalar_like(s, xs[0], 2)?;
//!         Ok(vec![ops::add(s, xs[0], two)?])
//!     }),
//!     "step",
//!     true,
//! )
//! .unwrap();
//!
//! assert_eq!(lp.outputs.len(), 1);
//! assert!(validate(&graph).is_ok());
//! ```

pub mod callbacks;
pub mod symbolic;
pub mod while_gradients;
pub mod while_loop;

pub use callbacks::{BodyFn, CondFn, body_fn, cond_fn};
pub use symbolic::{GradFn, GradientRegistry, SymbolicGradients};
pub use while_gradients::{
    BackpropPredicate, WhileGradients, add_backprop_loop_counter, add_forward_loop_counter,
    add_while_gradient_loop, add_while_gradients,
};
pub use while_loop::{WhileLoop, build_while_loop};
