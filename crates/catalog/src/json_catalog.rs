//! In-memory catalog loaded from a JSON document.
//!
//! The document holds two arrays:
//!
//! ```json
//! {
//!   "variables": [{ "id": "V1", "source": "ToolB", "type": "number" }],
//!   "tools": [{ "code": "ToolB", "kind": "tool", "thread_safe": false,
//!               "manifest": [{ "variable": "V1", "direction": "out" }] }]
//! }
//! ```

use super::{CatalogError, ManifestProvider, Result, ToolCatalog, VariableCatalog};
use docflow_core::{ManifestEntry, ToolCode, ToolDescriptor, VariableDescriptor, VariableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Serialized form of a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Variable descriptors
    #[serde(default)]
    pub variables: Vec<VariableDescriptor>,

    /// Tool and template descriptors
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// Read-only tool and variable catalog.
///
/// Also serves as the [`ManifestProvider`] for manifests declared inline on
/// each tool.
#[derive(Debug, Default)]
pub struct Catalog {
    tools: Vec<Arc<ToolDescriptor>>,
    tool_index: HashMap<ToolCode, usize>,
    variables: HashMap<VariableId, Arc<VariableDescriptor>>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate codes and ids.
    pub fn new(
        tools: impl IntoIterator<Item = ToolDescriptor>,
        variables: impl IntoIterator<Item = VariableDescriptor>,
    ) -> Result<Self> {
        let mut catalog = Self::default();

        for tool in tools {
            if catalog.tool_index.contains_key(&tool.code) {
                return Err(CatalogError::DuplicateTool(tool.code));
            }
            catalog.tool_index.insert(tool.code.clone(), catalog.tools.len());
            catalog.tools.push(Arc::new(tool));
        }

        for var in variables {
            if catalog.variables.contains_key(&var.id) {
                return Err(CatalogError::DuplicateVariable(var.id));
            }
            catalog.variables.insert(var.id.clone(), Arc::new(var));
        }

        debug!(
            tools = catalog.tools.len(),
            variables = catalog.variables.len(),
            "Catalog built"
        );
        Ok(catalog)
    }

    /// Build from a parsed document.
    pub fn from_document(doc: CatalogDocument) -> Result<Self> {
        Self::new(doc.tools, doc.variables)
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    /// Load a JSON document from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json_str(&content)?;
        info!(path = %path.display(), tools = catalog.tools.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Number of tools and templates.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Number of variables.
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}

impl ToolCatalog for Catalog {
    fn lookup(&self, code: &ToolCode) -> Option<Arc<ToolDescriptor>> {
        self.tool_index.get(code).map(|&i| Arc::clone(&self.tools[i]))
    }

    fn tools(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.clone()
    }
}

impl VariableCatalog for Catalog {
    fn resolve(&self, id: &VariableId) -> Option<Arc<VariableDescriptor>> {
        self.variables.get(id).cloned()
    }
}

impl ManifestProvider for Catalog {
    fn manifest(&self, tool: &ToolDescriptor) -> Result<Vec<ManifestEntry>> {
        Ok(tool.manifest.clone())
    }
}
