//! Execution routes.

use crate::id::ToolCode;
use crate::tool::{ResourceKind, ToolDescriptor};
use std::sync::Arc;

/// Ordered, duplicate-free sequence of tools to run for one request.
///
/// Producers always precede their consumers. A route is built once by the
/// resolver and never changes while it is executed.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRoute {
    steps: Vec<Arc<ToolDescriptor>>,
}

impl ExecutionRoute {
    /// Create an empty route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step unless its code is already present.
    ///
    /// Returns `true` if the step was added.
    pub fn push(&mut self, step: Arc<ToolDescriptor>) -> bool {
        if self.contains(&step.code) {
            return false;
        }
        self.steps.push(step);
        true
    }

    /// Whether a tool with this code is on the route.
    pub fn contains(&self, code: &ToolCode) -> bool {
        self.steps.iter().any(|s| &s.code == code)
    }

    /// Index of the step with this code.
    pub fn position(&self, code: &ToolCode) -> Option<usize> {
        self.steps.iter().position(|s| &s.code == code)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the route has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.steps.iter()
    }

    /// Step codes in order.
    pub fn codes(&self) -> Vec<ToolCode> {
        self.steps.iter().map(|s| s.code.clone()).collect()
    }

    /// Calculation tools in route order.
    pub fn calculations(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.steps.iter().filter(|s| s.kind == ResourceKind::Tool)
    }

    /// Deliverable templates in route order.
    pub fn deliverables(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.steps.iter().filter(|s| s.kind == ResourceKind::Template)
    }
}
