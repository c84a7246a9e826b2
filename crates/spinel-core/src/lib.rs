//! Core intermediate representation and pass traits for Spinel.
//!
//! This crate provides the foundational abstractions the optimizer crates
//! depend on:
//! - Graph-based IR (`Computation`, `Instruction`, `Module`)
//! - Static shape metadata (`Shape`)
//! - The `Pass` trait for graph transformations

pub mod ir;
pub mod module;
pub mod pass;
pub mod shape;

// Re-export commonly used types
pub use ir::{AllGatherSpec, Computation, InstrId, Instruction, Op};
pub use module::Module;
pub use pass::{Pass, Stage};
pub use shape::Shape;

/// Result type using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for spinel-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid graph structure: {0}")]
    InvalidGraph(String),

    #[error("Shape error: {0}")]
    Shape(String),
}
