//! Execution layer - dependency resolution, admission, and route execution.

#![warn(missing_docs)]

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod dependency;
pub mod error;
pub mod processor;

pub use admission::{AdmissionGuard, AdmissionQueue, Turn};
pub use config::{AdmissionConfig, ConfigError, DocflowConfig, PartialFailurePolicy, ResolverConfig};
pub use coordinator::{ExecutionCoordinator, RunAborted, RunReport, StepOutcome};
pub use dependency::{DependencyResolver, Resolution, ResolvedVariable, DEFAULT_MAX_DEPTH};
pub use error::{AdmissionError, ExecutionError, ResolveError, Result};
pub use processor::{
    DeliverableRequest, RequestOutcome, RequestProcessor, RequestStatus, StoreLocation,
};
