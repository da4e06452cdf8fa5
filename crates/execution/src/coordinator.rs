//! The execution coordinator - walks a route and runs each step.
//!
//! ```text
//! calculations (route order) → deliverables (route order)
//! ```
//!
//! Steps run one after another. Exclusive steps wait for their turn in the
//! shared [`AdmissionQueue`] first. A failing step is recorded and the walk
//! continues; only an admission timeout or a data store failure aborts it.

use crate::admission::AdmissionQueue;
use crate::error::{ExecutionError, Result};
use docflow_core::{
    ExecutionRoute, Outputs, RequestId, ResourceKind, StepStatus, ToolCode, ToolDescriptor,
    VariableSource,
};
use docflow_progress::ProgressSink;
use docflow_storage::DataStore;
use docflow_tools::{CalculationFailure, Calculator, DocumentPopulator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one route step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Step code
    pub code: ToolCode,
    /// Tool or template
    pub kind: ResourceKind,
    /// Final status (`Done` or `Failed`)
    pub status: StepStatus,
    /// Why the step failed, if it did
    pub detail: Option<CalculationFailure>,
    /// Wall time including any admission wait
    pub elapsed: Duration,
}

/// Per-step outcomes of one run, in execution order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Outcomes in the order steps finished
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    /// Outcome of one step.
    pub fn outcome(&self, code: &ToolCode) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| &s.code == code)
    }

    /// Steps that failed.
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed)
    }

    /// Steps that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.status == StepStatus::Done)
    }

    /// Whether any step failed.
    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// A run stopped by a fatal error, with the outcomes of the steps that had
/// already finished.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunAborted {
    /// What stopped the run
    pub error: ExecutionError,
    /// Steps that finished before the error
    pub report: RunReport,
}

impl From<ExecutionError> for RunAborted {
    fn from(error: ExecutionError) -> Self {
        Self {
            error,
            report: RunReport::default(),
        }
    }
}

/// Runs execution routes.
pub struct ExecutionCoordinator {
    admission: Arc<AdmissionQueue>,
    calculator: Arc<dyn Calculator>,
    populator: Arc<dyn DocumentPopulator>,
}

impl ExecutionCoordinator {
    /// Create a coordinator sharing `admission` with every other coordinator
    /// in the process.
    pub fn new(
        admission: Arc<AdmissionQueue>,
        calculator: Arc<dyn Calculator>,
        populator: Arc<dyn DocumentPopulator>,
    ) -> Self {
        Self {
            admission,
            calculator,
            populator,
        }
    }

    /// The shared admission queue.
    pub fn admission(&self) -> &Arc<AdmissionQueue> {
        &self.admission
    }

    /// Run every step of `route` for `request`.
    ///
    /// Calculation tools run first, in route order, and their outputs are
    /// merged into `store`. Deliverable templates are populated afterwards.
    /// A fatal error stops the run; the error carries the steps that finished.
    pub async fn run(
        &self,
        request: RequestId,
        route: &ExecutionRoute,
        store: &mut dyn DataStore,
        progress: &dyn ProgressSink,
    ) -> std::result::Result<RunReport, RunAborted> {
        info!(%request, steps = route.len(), "Starting route");

        for step in route.iter() {
            progress.update(request, &step.code, StepStatus::Pending).await;
        }

        let mut report = RunReport::default();

        for step in route.calculations().chain(route.deliverables()) {
            match self.run_step(request, step, store, progress).await {
                Ok(outcome) => report.steps.push(outcome),
                Err(error) => return Err(RunAborted { error, report }),
            }
        }

        info!(
            %request,
            done = report.succeeded().count(),
            failed = report.failed().count(),
            "Route finished"
        );
        Ok(report)
    }

    async fn run_step(
        &self,
        request: RequestId,
        step: &ToolDescriptor,
        store: &mut dyn DataStore,
        progress: &dyn ProgressSink,
    ) -> Result<StepOutcome> {
        let start = Instant::now();

        let guard = if step.is_exclusive() {
            progress.update(request, &step.code, StepStatus::Queued).await;
            match self.admission.acquire(&step.code, request).await {
                Ok(guard) => Some(guard),
                Err(e) => {
                    progress.update(request, &step.code, StepStatus::Failed).await;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        progress.update(request, &step.code, StepStatus::Running).await;
        debug!(%request, step = %step.code, kind = ?step.kind, "Running step");

        let result = match step.kind {
            ResourceKind::Tool => self.calculator.calculate(step, &*store).await,
            ResourceKind::Template => self
                .populator
                .populate(step, &*store)
                .await
                .map(|()| Outputs::new()),
        };

        // Exclusive tools are held only while they compute
        drop(guard);

        let failure = match result {
            Ok(outputs) => {
                if !outputs.is_empty() {
                    let origin = VariableSource::Tool(step.code.clone());
                    if let Err(e) = store.merge(&outputs, &origin, chrono::Utc::now()).await {
                        progress.update(request, &step.code, StepStatus::Failed).await;
                        return Err(ExecutionError::Storage(e));
                    }
                }
                None
            }
            Err(failure) => {
                warn!(%request, step = %step.code, %failure, "Step failed");
                Some(failure)
            }
        };

        let status = if failure.is_some() {
            StepStatus::Failed
        } else {
            StepStatus::Done
        };
        progress.update(request, &step.code, status).await;

        Ok(StepOutcome {
            code: step.code.clone(),
            kind: step.kind,
            status,
            detail: failure,
            elapsed: start.elapsed(),
        })
    }
}
