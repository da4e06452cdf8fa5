//! Data store entries.

use crate::id::VariableId;
use crate::variable::VariableSource;
use crate::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values produced by one calculation, keyed by variable.
pub type Outputs = BTreeMap<VariableId, serde_json::Value>;

/// One append-only value record in a request's data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    /// Variable the value belongs to
    pub variable: VariableId,

    /// The value
    pub value: serde_json::Value,

    /// Tool (or reserved stage) that produced it
    pub origin: VariableSource,

    /// When it was merged
    pub timestamp: Time,
}
