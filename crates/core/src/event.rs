//! Progress events - what each route step is doing.

use crate::id::{RequestId, ToolCode};
use crate::Time;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one route step.
///
/// ```text
/// Pending → (Queued, exclusive tools only) → Running → Done | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started yet
    Pending,
    /// Waiting for an exclusive tool
    Queued,
    /// Being calculated or populated
    Running,
    /// Finished successfully
    Done,
    /// Finished with a failure
    Failed,
}

impl StepStatus {
    /// Whether the step has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Queued => write!(f, "queued"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Request the step belongs to
    pub request: RequestId,

    /// Step code
    pub step: ToolCode,

    /// New status
    pub status: StepStatus,

    /// When it happened
    pub timestamp: Time,
}

impl ProgressEvent {
    /// Create an event stamped now.
    pub fn new(request: RequestId, step: ToolCode, status: StepStatus) -> Self {
        Self {
            request,
            step,
            status,
            timestamp: chrono::Utc::now(),
        }
    }
}
