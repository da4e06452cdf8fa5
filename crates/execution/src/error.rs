//! Error taxonomy for resolution and execution.

use docflow_catalog::CatalogError;
use docflow_core::{RequestId, ToolCode, VariableId};
use docflow_storage::StorageError;
use std::time::Duration;

/// Fatal errors raised while computing a route. No tool runs after one.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Expansion went deeper than the configured limit
    #[error("recursion limit exceeded: depth {depth} > {limit}")]
    RecursionLimitExceeded {
        /// Depth that was reached
        depth: usize,
        /// Configured limit
        limit: usize,
    },

    /// A source or deliverable names a tool the catalog does not know
    #[error("unknown tool code {code}")]
    UnknownToolCode {
        /// The unknown code
        code: ToolCode,
        /// Variable whose source it is, if any
        variable: Option<VariableId>,
    },

    /// A manifest declares a variable the catalog does not know
    #[error("unknown variable {variable} in manifest of {tool}")]
    UnknownVariable {
        /// Tool declaring the variable
        tool: ToolCode,
        /// The unknown variable
        variable: VariableId,
    },

    /// A manifest could not be read
    #[error("manifest of {tool} could not be read: {source}")]
    ManifestParse {
        /// Tool whose manifest failed
        tool: ToolCode,
        /// Underlying catalog error
        source: CatalogError,
    },
}

/// Errors raised while waiting for an exclusive tool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The wait outlived its deadline
    #[error("timed out waiting for {tool} after {elapsed:?} at queue position {position}")]
    AdmissionTimeout {
        /// Tool being waited for
        tool: ToolCode,
        /// Waiting requester
        requester: RequestId,
        /// Time spent waiting
        elapsed: Duration,
        /// Last known queue position
        position: usize,
    },
}

/// Fatal errors for one request.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Route could not be computed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// An exclusive tool could not be acquired
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// The request's data store failed
    #[error("data store error: {0}")]
    Storage(#[from] StorageError),

    /// The preparation stage failed
    #[error("preparation failed: {0}")]
    PrepFailed(String),
}

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;
