//! JSON-lines file data store.
//!
//! Every merged entry is appended as one JSON object per line. The file is
//! never rewritten, which keeps the full provenance trail on disk. An
//! in-memory mirror serves reads.

use super::{DataStore, MemoryDataStore, Result, StorageError};
use async_trait::async_trait;
use docflow_core::{DataEntry, Outputs, Time, VariableId, VariableSource};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// File-backed append-only data store.
pub struct JsonDataStore {
    path: PathBuf,
    mirror: MemoryDataStore,
}

impl JsonDataStore {
    /// Open (or create) the store at `path`, replaying existing entries.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut mirror = MemoryDataStore::new();
        match fs::read_to_string(&path).await {
            Ok(content) => {
                for (lineno, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: DataEntry = serde_json::from_str(line).map_err(|e| {
                        StorageError::Other(format!(
                            "{}:{}: {}",
                            path.display(),
                            lineno + 1,
                            e
                        ))
                    })?;
                    mirror.push(entry);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!(path = %path.display(), entries = mirror.entries().len(), "Opened data store");
        Ok(Self { path, mirror })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DataStore for JsonDataStore {
    async fn merge(&mut self, outputs: &Outputs, origin: &VariableSource, at: Time) -> Result<()> {
        let entries = MemoryDataStore::build_entries(outputs, origin, at);
        if entries.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for entry in &entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        for entry in entries {
            self.mirror.push(entry);
        }
        Ok(())
    }

    async fn latest(&self, id: &VariableId) -> Result<Option<DataEntry>> {
        self.mirror.latest(id).await
    }

    async fn history(&self, id: &VariableId) -> Result<Vec<DataEntry>> {
        self.mirror.history(id).await
    }

    async fn snapshot(&self) -> Result<Outputs> {
        self.mirror.snapshot().await
    }
}
