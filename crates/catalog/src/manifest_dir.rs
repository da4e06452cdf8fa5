//! Manifests stored as one JSON file per tool.

use super::{CatalogError, ManifestProvider, Result};
use docflow_core::{ManifestEntry, ToolDescriptor};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads `<root>/<code>.json`, a JSON array of manifest entries.
///
/// Falls back to the manifest declared inline on the descriptor when no file
/// exists for a tool. A file that exists but cannot be parsed is an error.
#[derive(Debug, Clone)]
pub struct ManifestDir {
    root: PathBuf,
}

impl ManifestDir {
    /// Create a provider rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn manifest_path(&self, tool: &ToolDescriptor) -> PathBuf {
        self.root.join(format!("{}.json", tool.code))
    }
}

impl ManifestProvider for ManifestDir {
    fn manifest(&self, tool: &ToolDescriptor) -> Result<Vec<ManifestEntry>> {
        let path = self.manifest_path(tool);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(tool = %tool.code, "No manifest file, using inline manifest");
                return Ok(tool.manifest.clone());
            }
            Err(e) => {
                return Err(CatalogError::Manifest {
                    tool: tool.code.clone(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| CatalogError::Manifest {
            tool: tool.code.clone(),
            reason: format!("{}: {}", path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::Direction;

    #[test]
    fn test_reads_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ToolA.json"),
            r#"[{ "variable": "X", "direction": "in", "call_stage": 2 }]"#,
        )
        .unwrap();

        let provider = ManifestDir::new(dir.path());
        let manifest = provider.manifest(&ToolDescriptor::tool("ToolA")).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].direction, Direction::In);
        assert_eq!(manifest[0].call_stage, 2);
    }

    #[test]
    fn test_missing_file_uses_inline_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ManifestDir::new(dir.path());
        let tool = ToolDescriptor::tool("ToolB").with_input("Y", 0);
        assert_eq!(provider.manifest(&tool).unwrap(), tool.manifest);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ToolC.json"), "not json").unwrap();

        let provider = ManifestDir::new(dir.path());
        let err = provider.manifest(&ToolDescriptor::tool("ToolC")).unwrap_err();
        assert!(matches!(err, CatalogError::Manifest { tool, .. } if tool.as_str() == "ToolC"));
    }
}
