//! Data store trait abstraction.

use async_trait::async_trait;
use docflow_core::{DataEntry, Outputs, Time, VariableId, VariableSource};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Append-only store of variable values for one request.
///
/// Scoped to a single request, so implementations need no cross-request
/// synchronization.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Append `outputs` as new entries tagged with `origin` and `at`.
    async fn merge(&mut self, outputs: &Outputs, origin: &VariableSource, at: Time) -> Result<()>;

    /// Newest entry for a variable.
    async fn latest(&self, id: &VariableId) -> Result<Option<DataEntry>>;

    /// Every entry for a variable, oldest first.
    async fn history(&self, id: &VariableId) -> Result<Vec<DataEntry>>;

    /// Newest value of every variable.
    async fn snapshot(&self) -> Result<Outputs>;
}
