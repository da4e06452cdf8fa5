//! Tool abstraction.

use async_trait::async_trait;
use docflow_core::{Outputs, RequestId, ToolCode, ToolDescriptor, VariableId};
use docflow_storage::DataStore;

/// Why a calculation or population step failed.
///
/// Failures are values: the coordinator records them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalculationFailure {
    /// No implementation is configured for the tool
    #[error("no command configured for {0}")]
    NotConfigured(ToolCode),

    /// The tool could not be started
    #[error("failed to launch: {0}")]
    Launch(String),

    /// The tool exited unsuccessfully
    #[error("exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Exit code (-1 when killed by a signal)
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// The tool's output could not be interpreted
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// A required input had no value in the data store
    #[error("missing input {0}")]
    MissingInput(VariableId),

    /// The data store could not be read
    #[error("data store: {0}")]
    Store(String),

    /// The tool refused the inputs
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Computes a tool's outputs from the request's data store.
#[async_trait]
pub trait Calculator: Send + Sync {
    /// Run `tool` against `store`.
    async fn calculate(
        &self,
        tool: &ToolDescriptor,
        store: &dyn DataStore,
    ) -> Result<Outputs, CalculationFailure>;
}

/// Fills a deliverable template from computed variables.
#[async_trait]
pub trait DocumentPopulator: Send + Sync {
    /// Populate `template` from `store`.
    async fn populate(
        &self,
        template: &ToolDescriptor,
        store: &dyn DataStore,
    ) -> Result<(), CalculationFailure>;
}

/// Supplies values for variables sourced from the preparation stage.
#[async_trait]
pub trait PrepProvider: Send + Sync {
    /// Produce values for `variables`.
    async fn prepare(
        &self,
        request: RequestId,
        variables: &[VariableId],
    ) -> Result<Outputs, anyhow::Error>;
}
