//! cf-core: stable foundation for cycleflow.
//!
//! Contains:
//! - ids (compact typed IDs for graph nodes and loop contexts)
//! - numeric (Real + tolerances + float helpers)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
