//! docflow core data models.
//!
//! This crate defines the descriptors, routes and progress records shared
//! by the resolver, the admission queue and the execution coordinator.

#![warn(missing_docs)]

// Identities
mod id;

// Catalog descriptors
mod variable;
mod tool;

// Planning and execution
mod route;
mod ticket;
mod event;
mod data;

// Re-exports
pub use id::*;

pub use variable::{
    CallStage, CoreError, Direction, ReservedTag, ValueKind, VariableDescriptor, VariableSource,
};
pub use tool::{ManifestEntry, ResourceKind, ToolDescriptor};
pub use route::ExecutionRoute;
pub use ticket::Ticket;
pub use event::{ProgressEvent, StepStatus};
pub use data::{DataEntry, Outputs};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
