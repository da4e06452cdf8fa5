//! Catalog trait abstraction.

use docflow_core::{ManifestEntry, ToolCode, ToolDescriptor, VariableDescriptor, VariableId};
use std::sync::Arc;

/// Error type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while loading or reading catalogs.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Two tools share a code
    #[error("duplicate tool code: {0}")]
    DuplicateTool(ToolCode),

    /// Two variables share an id
    #[error("duplicate variable id: {0}")]
    DuplicateVariable(VariableId),

    /// A manifest could not be read
    #[error("manifest for {tool}: {reason}")]
    Manifest {
        /// Tool whose manifest failed
        tool: ToolCode,
        /// What went wrong
        reason: String,
    },
}

/// Lookup of tool descriptors by code.
pub trait ToolCatalog: Send + Sync {
    /// Find a tool or template by code.
    fn lookup(&self, code: &ToolCode) -> Option<Arc<ToolDescriptor>>;

    /// All entries, in catalog order.
    fn tools(&self) -> Vec<Arc<ToolDescriptor>>;
}

/// Lookup of variable descriptors by id.
pub trait VariableCatalog: Send + Sync {
    /// Resolve a variable id.
    fn resolve(&self, id: &VariableId) -> Option<Arc<VariableDescriptor>>;
}

/// Supplies a tool's ordered manifest.
pub trait ManifestProvider: Send + Sync {
    /// Read the manifest of `tool`.
    fn manifest(&self, tool: &ToolDescriptor) -> Result<Vec<ManifestEntry>>;
}
