//! Tool descriptors and manifests.

use crate::id::{ToolCode, VariableId};
use crate::variable::{CallStage, Direction};
use serde::{Deserialize, Serialize};

/// What kind of resource a catalog entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A calculation tool
    #[default]
    Tool,
    /// A deliverable document template
    Template,
}

/// One declared variable in a tool's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Variable name
    pub variable: VariableId,

    /// Whether the tool consumes or produces it
    pub direction: Direction,

    /// Call-stage level
    #[serde(default)]
    pub call_stage: CallStage,
}

impl ManifestEntry {
    /// Input entry.
    pub fn input(variable: impl Into<VariableId>, call_stage: CallStage) -> Self {
        Self {
            variable: variable.into(),
            direction: Direction::In,
            call_stage,
        }
    }

    /// Output entry.
    pub fn output(variable: impl Into<VariableId>, call_stage: CallStage) -> Self {
        Self {
            variable: variable.into(),
            direction: Direction::Out,
            call_stage,
        }
    }
}

/// A tool or template as described by the tool catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique code
    pub code: ToolCode,

    /// Tool or template
    #[serde(default)]
    pub kind: ResourceKind,

    /// Whether concurrent invocations across requests are safe
    #[serde(default = "default_thread_safe")]
    pub thread_safe: bool,

    /// Ordered manifest
    #[serde(default)]
    pub manifest: Vec<ManifestEntry>,
}

fn default_thread_safe() -> bool {
    true
}

impl ToolDescriptor {
    /// Create a thread-safe descriptor with an empty manifest.
    pub fn new(code: impl Into<ToolCode>, kind: ResourceKind) -> Self {
        Self {
            code: code.into(),
            kind,
            thread_safe: true,
            manifest: Vec::new(),
        }
    }

    /// Shorthand for a calculation tool.
    pub fn tool(code: impl Into<ToolCode>) -> Self {
        Self::new(code, ResourceKind::Tool)
    }

    /// Shorthand for a deliverable template.
    pub fn template(code: impl Into<ToolCode>) -> Self {
        Self::new(code, ResourceKind::Template)
    }

    /// Mark as not thread-safe.
    pub fn exclusive(mut self) -> Self {
        self.thread_safe = false;
        self
    }

    /// Append an input entry.
    pub fn with_input(mut self, variable: impl Into<VariableId>, call_stage: CallStage) -> Self {
        self.manifest.push(ManifestEntry::input(variable, call_stage));
        self
    }

    /// Append an output entry.
    pub fn with_output(mut self, variable: impl Into<VariableId>, call_stage: CallStage) -> Self {
        self.manifest.push(ManifestEntry::output(variable, call_stage));
        self
    }

    /// Whether access must go through the admission queue.
    pub fn is_exclusive(&self) -> bool {
        !self.thread_safe
    }

    /// Declared outputs, in manifest order.
    pub fn outputs(&self) -> impl Iterator<Item = &VariableId> {
        self.manifest
            .iter()
            .filter(|e| e.direction == Direction::Out)
            .map(|e| &e.variable)
    }
}
