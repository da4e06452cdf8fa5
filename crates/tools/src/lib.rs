//! Tool integration
//!
//! Boundary traits for the collaborators that calculate variables, populate
//! deliverable documents and supply preparation-stage values, plus
//! implementations backed by external programs.

#![warn(missing_docs)]

pub mod r#trait;
pub mod builtin;

pub use r#trait::{CalculationFailure, Calculator, DocumentPopulator, PrepProvider};
pub use builtin::{CommandCalculator, CommandPopulator, CommandSpec, StaticPrep};
