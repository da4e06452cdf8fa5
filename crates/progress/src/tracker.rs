//! Progress sinks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_core::{ProgressEvent, RequestId, StepStatus, ToolCode};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Receives step status updates.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Record that `step` of `request` moved to `status`.
    async fn update(&self, request: RequestId, step: &ToolCode, status: StepStatus);
}

/// Logs every update through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
    async fn update(&self, request: RequestId, step: &ToolCode, status: StepStatus) {
        match status {
            StepStatus::Failed => warn!(%request, step = %step, %status, "Step progress"),
            _ => info!(%request, step = %step, %status, "Step progress"),
        }
    }
}

/// Forwards updates as [`ProgressEvent`]s over a channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    /// Create a sink and its receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelProgressSink {
    async fn update(&self, request: RequestId, step: &ToolCode, status: StepStatus) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(ProgressEvent::new(request, step.clone(), status));
    }
}

/// A snapshot of a request's progress at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// When snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Request the snapshot belongs to
    pub request: RequestId,

    /// Latest status per step, in order of first appearance
    pub steps: Vec<(ToolCode, StepStatus)>,
}

impl ProgressSnapshot {
    /// Latest status of one step.
    pub fn status_of(&self, step: &ToolCode) -> Option<StepStatus> {
        self.steps.iter().find(|(code, _)| code == step).map(|(_, s)| *s)
    }

    /// Percentage of steps in a terminal state.
    pub fn percentage(&self) -> f32 {
        if self.steps.is_empty() {
            return 0.0;
        }
        let finished = self.steps.iter().filter(|(_, s)| s.is_terminal()).count();
        (finished as f32 / self.steps.len() as f32) * 100.0
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct ProgressRecorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, oldest first.
    pub async fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().await.clone()
    }

    /// Status sequence of one step.
    pub async fn history(&self, request: RequestId, step: &ToolCode) -> Vec<StepStatus> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.request == request && &e.step == step)
            .map(|e| e.status)
            .collect()
    }

    /// Take a progress snapshot for one request.
    pub async fn snapshot(&self, request: RequestId) -> ProgressSnapshot {
        let events = self.events.lock().await;
        let mut steps: Vec<(ToolCode, StepStatus)> = Vec::new();

        for event in events.iter().filter(|e| e.request == request) {
            match steps.iter_mut().find(|(code, _)| code == &event.step) {
                Some(slot) => slot.1 = event.status,
                None => steps.push((event.step.clone(), event.status)),
            }
        }

        ProgressSnapshot {
            timestamp: Utc::now(),
            request,
            steps,
        }
    }
}

#[async_trait]
impl ProgressSink for ProgressRecorder {
    async fn update(&self, request: RequestId, step: &ToolCode, status: StepStatus) {
        self.events
            .lock()
            .await
            .push(ProgressEvent::new(request, step.clone(), status));
    }
}
