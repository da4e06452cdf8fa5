//! In-memory data store.

use super::{DataStore, Result};
use async_trait::async_trait;
use docflow_core::{DataEntry, Outputs, Time, VariableId, VariableSource};

/// Data store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataStore {
    entries: Vec<DataEntry>,
}

impl MemoryDataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in merge order.
    pub fn entries(&self) -> &[DataEntry] {
        &self.entries
    }

    pub(crate) fn push(&mut self, entry: DataEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn build_entries(outputs: &Outputs, origin: &VariableSource, at: Time) -> Vec<DataEntry> {
        outputs
            .iter()
            .map(|(variable, value)| DataEntry {
                variable: variable.clone(),
                value: value.clone(),
                origin: origin.clone(),
                timestamp: at,
            })
            .collect()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn merge(&mut self, outputs: &Outputs, origin: &VariableSource, at: Time) -> Result<()> {
        self.entries.extend(Self::build_entries(outputs, origin, at));
        Ok(())
    }

    async fn latest(&self, id: &VariableId) -> Result<Option<DataEntry>> {
        Ok(self.entries.iter().rev().find(|e| &e.variable == id).cloned())
    }

    async fn history(&self, id: &VariableId) -> Result<Vec<DataEntry>> {
        Ok(self.entries.iter().filter(|e| &e.variable == id).cloned().collect())
    }

    async fn snapshot(&self) -> Result<Outputs> {
        let mut values = Outputs::new();
        for entry in &self.entries {
            values.insert(entry.variable.clone(), entry.value.clone());
        }
        Ok(values)
    }
}
