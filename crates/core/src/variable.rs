//! Variable descriptors and their sources.

use crate::id::{ToolCode, VariableId};
use serde::{Deserialize, Serialize};

/// Errors raised while building core values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A variable source was empty
    #[error("variable source must not be empty")]
    EmptySource,
}

/// Call-stage level at which a manifest entry is exchanged with its tool.
pub type CallStage = u32;

/// Source tags that mean "already available" and are never resolved to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservedTag {
    /// Supplied with the request itself
    Init,
    /// Filled in automatically by the runtime
    Auto,
    /// Produced by the out-of-band preparation stage
    Prep,
    /// Provided by shared utilities
    Utils,
}

impl ReservedTag {
    /// All reserved tags.
    pub const ALL: [ReservedTag; 4] = [Self::Init, Self::Auto, Self::Prep, Self::Utils];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservedTag::Init => "INIT",
            ReservedTag::Auto => "AUTO",
            ReservedTag::Prep => "PREP",
            ReservedTag::Utils => "UTILS",
        }
    }

    /// Parse a reserved tag. Matching is exact.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == s)
    }
}

/// Where a variable's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VariableSource {
    /// One of the reserved tags
    Reserved(ReservedTag),
    /// Produced by the tool with this code
    Tool(ToolCode),
}

impl VariableSource {
    /// Parse a source string: reserved tags first, anything else is a tool code.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::EmptySource);
        }
        Ok(match ReservedTag::parse(s) {
            Some(tag) => Self::Reserved(tag),
            None => Self::Tool(ToolCode::new(s)),
        })
    }

    /// Source as it appears in catalogs.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Reserved(tag) => tag.as_str(),
            Self::Tool(code) => code.as_str(),
        }
    }

    /// Whether the source terminates dependency expansion by itself.
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved(_))
    }

    /// The producing tool, if any.
    pub fn tool_code(&self) -> Option<&ToolCode> {
        match self {
            Self::Tool(code) => Some(code),
            Self::Reserved(_) => None,
        }
    }
}

impl std::fmt::Display for VariableSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for VariableSource {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VariableSource> for String {
    fn from(source: VariableSource) -> Self {
        source.as_str().to_string()
    }
}

impl From<ToolCode> for VariableSource {
    fn from(code: ToolCode) -> Self {
        Self::Tool(code)
    }
}

impl From<ReservedTag> for VariableSource {
    fn from(tag: ReservedTag) -> Self {
        Self::Reserved(tag)
    }
}

/// Direction of a variable relative to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Consumed by the tool
    In,
    /// Produced by the tool
    Out,
}

/// Value type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Free text
    #[default]
    Text,
    /// Numeric value
    Number,
    /// Boolean flag
    Boolean,
    /// Calendar date
    Date,
    /// Tabular value
    Table,
}

/// A variable as declared in the variable catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Variable identifier
    pub id: VariableId,

    /// Tool code or reserved tag producing this variable
    pub source: VariableSource,

    /// Declared direction
    #[serde(default = "default_direction")]
    pub direction: Direction,

    /// Declared call-stage level
    #[serde(default)]
    pub call_stage: CallStage,

    /// Value type
    #[serde(default, rename = "type")]
    pub kind: ValueKind,
}

fn default_direction() -> Direction {
    Direction::Out
}

impl VariableDescriptor {
    /// Create a descriptor with default direction, stage and type.
    pub fn new(id: impl Into<VariableId>, source: impl Into<VariableSource>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            direction: default_direction(),
            call_stage: 0,
            kind: ValueKind::default(),
        }
    }
}
