//! Request processing - one deliverable request from lookup to report.

use crate::admission::AdmissionQueue;
use crate::config::{DocflowConfig, PartialFailurePolicy, ResolverConfig};
use crate::coordinator::{ExecutionCoordinator, RunAborted, RunReport};
use crate::dependency::DependencyResolver;
use crate::error::{ExecutionError, ResolveError, Result};
use docflow_catalog::{Catalog, ManifestProvider, ToolCatalog};
use docflow_core::{ExecutionRoute, ReservedTag, RequestId, ToolCode, VariableSource};
use docflow_progress::{ProgressSink, TracingProgressSink};
use docflow_storage::{DataStore, JsonDataStore, MemoryDataStore};
use docflow_tools::{CommandCalculator, CommandPopulator, PrepProvider, StaticPrep};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A request for one or more deliverables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableRequest {
    /// Request id
    pub id: RequestId,
    /// Deliverable template codes
    pub deliverables: Vec<ToolCode>,
}

impl DeliverableRequest {
    /// Create a request with a fresh id.
    pub fn new<I, C>(deliverables: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ToolCode>,
    {
        Self {
            id: RequestId::new(),
            deliverables: deliverables.into_iter().map(Into::into).collect(),
        }
    }
}

/// Overall status of a processed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Finished
    Done,
    /// Aborted, or finished with failures under `report_error`
    Error,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Done => write!(f, "done"),
            RequestStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of processing one request.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Request id
    pub request: RequestId,
    /// Overall status
    pub status: RequestStatus,
    /// Route that was executed; empty if resolution failed
    pub route: ExecutionRoute,
    /// Per-step outcomes of steps that ran
    pub report: RunReport,
    /// The fatal error, if one aborted the request
    pub error: Option<ExecutionError>,
}

/// Where per-request data stores live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreLocation {
    /// Discarded when the request finishes
    #[default]
    Memory,
    /// One `<request>.jsonl` file per request in this directory
    Dir(PathBuf),
}

/// Turns deliverable requests into executed routes.
///
/// A processor is shared by every in-flight request. Catalog and admission
/// queue are the only state requests see of each other.
pub struct RequestProcessor {
    catalog: Arc<Catalog>,
    manifests: Arc<dyn ManifestProvider>,
    coordinator: ExecutionCoordinator,
    prep: Arc<dyn PrepProvider>,
    progress: Arc<dyn ProgressSink>,
    resolver: ResolverConfig,
    partial_failure: PartialFailurePolicy,
    store: StoreLocation,
}

impl RequestProcessor {
    /// Create a processor using the catalog's inline manifests and an
    /// in-memory store per request.
    pub fn new(
        catalog: Arc<Catalog>,
        coordinator: ExecutionCoordinator,
        prep: Arc<dyn PrepProvider>,
    ) -> Self {
        let manifests: Arc<dyn ManifestProvider> = catalog.clone();
        Self {
            catalog,
            manifests,
            coordinator,
            prep,
            progress: Arc::new(TracingProgressSink),
            resolver: ResolverConfig::default(),
            partial_failure: PartialFailurePolicy::default(),
            store: StoreLocation::Memory,
        }
    }

    /// Build a processor with command-backed tools from a config file.
    pub fn from_config(
        catalog: Arc<Catalog>,
        admission: Arc<AdmissionQueue>,
        config: &DocflowConfig,
    ) -> Self {
        let coordinator = ExecutionCoordinator::new(
            admission,
            Arc::new(CommandCalculator::new(config.tools.clone())),
            Arc::new(CommandPopulator::new(config.templates.clone())),
        );
        let prep = Arc::new(StaticPrep::new(config.prep_values.clone()));

        let store = match &config.store_dir {
            Some(dir) => StoreLocation::Dir(dir.clone()),
            None => StoreLocation::Memory,
        };

        Self::new(catalog, coordinator, prep)
            .with_resolver_config(config.resolver.clone())
            .with_partial_failure(config.partial_failure)
            .with_store(store)
    }

    /// Set resolver settings.
    pub fn with_resolver_config(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the partial failure policy.
    pub fn with_partial_failure(mut self, policy: PartialFailurePolicy) -> Self {
        self.partial_failure = policy;
        self
    }

    /// Set where data stores live.
    pub fn with_store(mut self, store: StoreLocation) -> Self {
        self.store = store;
        self
    }

    /// Set the progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Read manifests from somewhere other than the catalog.
    pub fn with_manifests(mut self, manifests: Arc<dyn ManifestProvider>) -> Self {
        self.manifests = manifests;
        self
    }

    /// The catalog requests are resolved against.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// The shared admission queue.
    pub fn admission(&self) -> &Arc<AdmissionQueue> {
        self.coordinator.admission()
    }

    /// Resolve a request without running anything.
    pub fn plan(&self, request: &DeliverableRequest) -> Result<crate::dependency::Resolution> {
        let targets = request
            .deliverables
            .iter()
            .map(|code| {
                self.catalog.lookup(code).ok_or_else(|| ResolveError::UnknownToolCode {
                    code: code.clone(),
                    variable: None,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let resolver = DependencyResolver::new(&*self.catalog, &*self.catalog, &*self.manifests)
            .with_max_depth(self.resolver.max_depth);
        Ok(resolver.resolve(&targets, &self.resolver.excluded_sources)?)
    }

    /// Process one request to completion.
    ///
    /// Never fails; fatal errors are reported in the outcome.
    pub async fn process(&self, request: DeliverableRequest) -> RequestOutcome {
        info!(request = %request.id, deliverables = ?request.deliverables, "Processing request");

        let mut route = ExecutionRoute::new();
        let result = self.execute(&request, &mut route).await;

        let outcome = match result {
            Ok(report) => {
                let status = if report.has_failures() {
                    self.partial_failure.status()
                } else {
                    RequestStatus::Done
                };
                RequestOutcome {
                    request: request.id,
                    status,
                    route,
                    report,
                    error: None,
                }
            }
            Err(RunAborted { error, report }) => {
                error!(request = %request.id, %error, "Request aborted");
                RequestOutcome {
                    request: request.id,
                    status: RequestStatus::Error,
                    route,
                    report,
                    error: Some(error),
                }
            }
        };

        if outcome.report.has_failures() {
            warn!(
                request = %outcome.request,
                failed = outcome.report.failed().count(),
                status = %outcome.status,
                "Request finished with failed steps"
            );
        } else {
            info!(request = %outcome.request, status = %outcome.status, "Request finished");
        }
        outcome
    }

    /// Process a request on its own task.
    pub fn spawn(self: &Arc<Self>, request: DeliverableRequest) -> JoinHandle<RequestOutcome> {
        let processor = Arc::clone(self);
        tokio::spawn(async move { processor.process(request).await })
    }

    async fn execute(
        &self,
        request: &DeliverableRequest,
        route: &mut ExecutionRoute,
    ) -> std::result::Result<RunReport, RunAborted> {
        let resolution = self.plan(request)?;
        *route = resolution.route.clone();

        let mut store = self.open_store(request.id).await?;

        if !resolution.prep_variables.is_empty() {
            let values = self
                .prep
                .prepare(request.id, &resolution.prep_variables)
                .await
                .map_err(|e| ExecutionError::PrepFailed(format!("{e:#}")))?;
            store
                .merge(&values, &VariableSource::Reserved(ReservedTag::Prep), chrono::Utc::now())
                .await
                .map_err(ExecutionError::from)?;
        }

        self.coordinator
            .run(request.id, &resolution.route, store.as_mut(), &*self.progress)
            .await
    }

    async fn open_store(&self, request: RequestId) -> Result<Box<dyn DataStore>> {
        Ok(match &self.store {
            StoreLocation::Memory => Box::new(MemoryDataStore::new()),
            StoreLocation::Dir(dir) => {
                Box::new(JsonDataStore::open(dir.join(format!("{request}.jsonl"))).await?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionConfig;
    use crate::coordinator::tests::{RecordingPopulator, ScriptedCalculator};
    use docflow_catalog::ManifestDir;
    use docflow_tools::CommandSpec;
    use docflow_core::{StepStatus, ToolDescriptor, VariableDescriptor, VariableId};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn scenario_catalog() -> Arc<Catalog> {
        let variables = vec![
            VariableDescriptor::new("P1", ReservedTag::Prep),
            VariableDescriptor::new("A1", ToolCode::new("ToolA")),
            VariableDescriptor::new("C1", ToolCode::new("ToolC")),
        ];
        let tools = vec![
            ToolDescriptor::tool("ToolA")
                .with_input("P1", 0)
                .with_output("A1", 0),
            ToolDescriptor::tool("ToolC").with_output("C1", 0),
            ToolDescriptor::template("Doc1").with_input("A1", 0),
            ToolDescriptor::template("Doc2").with_input("C1", 0),
        ];
        Arc::new(Catalog::new(tools, variables).unwrap())
    }

    fn prep(values: &[(&str, serde_json::Value)]) -> Arc<StaticPrep> {
        let values: HashMap<VariableId, serde_json::Value> = values
            .iter()
            .map(|(k, v)| (VariableId::new(*k), v.clone()))
            .collect();
        Arc::new(StaticPrep::new(values))
    }

    fn processor(catalog: Arc<Catalog>, calculator: Arc<ScriptedCalculator>) -> RequestProcessor {
        let coordinator = ExecutionCoordinator::new(
            Arc::new(AdmissionQueue::default()),
            calculator,
            Arc::new(RecordingPopulator::default()),
        );
        RequestProcessor::new(catalog, coordinator, prep(&[("P1", json!(3))]))
    }

    #[tokio::test]
    async fn test_process_end_to_end_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let calculator = Arc::new(ScriptedCalculator::default().outputs("ToolA", &[("A1", json!(42))]));
        let processor = processor(scenario_catalog(), calculator.clone())
            .with_store(StoreLocation::Dir(dir.path().to_path_buf()));

        let request = DeliverableRequest::new(["Doc1"]);
        let id = request.id;
        let outcome = processor.process(request).await;

        assert_eq!(outcome.status, RequestStatus::Done);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.route.codes(), vec![ToolCode::new("ToolA"), ToolCode::new("Doc1")]);
        assert_eq!(calculator.calls(), vec![ToolCode::new("ToolA")]);

        let store = JsonDataStore::open(dir.path().join(format!("{id}.jsonl"))).await.unwrap();
        let p1 = store.latest(&VariableId::new("P1")).await.unwrap().unwrap();
        assert_eq!(p1.value, json!(3));
        assert_eq!(p1.origin, VariableSource::Reserved(ReservedTag::Prep));
        let a1 = store.latest(&VariableId::new("A1")).await.unwrap().unwrap();
        assert_eq!(a1.value, json!(42));
        assert_eq!(a1.origin, VariableSource::Tool(ToolCode::new("ToolA")));
    }

    #[tokio::test]
    async fn test_partial_failure_policies() {
        for (policy, expected) in [
            (PartialFailurePolicy::ReportError, RequestStatus::Error),
            (PartialFailurePolicy::ReportDone, RequestStatus::Done),
        ] {
            let calculator = Arc::new(ScriptedCalculator::default().failing("ToolC"));
            let processor =
                processor(scenario_catalog(), calculator).with_partial_failure(policy);

            let outcome = processor.process(DeliverableRequest::new(["Doc1", "Doc2"])).await;

            assert_eq!(outcome.status, expected);
            assert!(outcome.error.is_none());
            let doc1 = outcome.report.outcome(&ToolCode::new("Doc1")).unwrap();
            assert_eq!(doc1.status, StepStatus::Done);
            assert_eq!(outcome.report.failed().count(), 1);
        }
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_tool_runs() {
        let variables = vec![
            VariableDescriptor::new("VA", ToolCode::new("TA")),
            VariableDescriptor::new("VB", ToolCode::new("TB")),
        ];
        let tools = vec![
            ToolDescriptor::tool("TA").with_input("VB", 0).with_output("VA", 0),
            ToolDescriptor::tool("TB").with_input("VA", 0).with_output("VB", 0),
            ToolDescriptor::template("Doc").with_input("VA", 0),
        ];
        let catalog = Arc::new(Catalog::new(tools, variables).unwrap());
        let calculator = Arc::new(ScriptedCalculator::default());
        let processor = processor(catalog, calculator.clone());

        let outcome = processor.process(DeliverableRequest::new(["Doc"])).await;

        assert_eq!(outcome.status, RequestStatus::Error);
        assert!(matches!(
            outcome.error,
            Some(ExecutionError::Resolve(ResolveError::RecursionLimitExceeded { limit: 10, .. }))
        ));
        assert!(outcome.route.is_empty());
        assert!(outcome.report.steps.is_empty());
        assert!(calculator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_deliverable() {
        let processor = processor(scenario_catalog(), Arc::new(ScriptedCalculator::default()));

        let outcome = processor.process(DeliverableRequest::new(["Missing"])).await;

        assert_eq!(outcome.status, RequestStatus::Error);
        match outcome.error {
            Some(ExecutionError::Resolve(ResolveError::UnknownToolCode { code, variable })) => {
                assert_eq!(code, ToolCode::new("Missing"));
                assert!(variable.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prep_failure_is_fatal() {
        let calculator = Arc::new(ScriptedCalculator::default());
        let coordinator = ExecutionCoordinator::new(
            Arc::new(AdmissionQueue::default()),
            calculator.clone(),
            Arc::new(RecordingPopulator::default()),
        );
        let processor = RequestProcessor::new(scenario_catalog(), coordinator, prep(&[]));

        let outcome = processor.process(DeliverableRequest::new(["Doc1"])).await;

        assert_eq!(outcome.status, RequestStatus::Error);
        match outcome.error {
            Some(ExecutionError::PrepFailed(message)) => assert!(message.contains("P1")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(calculator.calls().is_empty());
        assert!(!outcome.route.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_request_reports_finished_steps() {
        let calculator = Arc::new(ScriptedCalculator::default().outputs("ToolA", &[("A1", json!(1))]));
        let admission = Arc::new(AdmissionQueue::new(
            AdmissionConfig::new().with_base_timeout_mins(1),
        ));
        let coordinator = ExecutionCoordinator::new(
            admission.clone(),
            calculator.clone(),
            Arc::new(RecordingPopulator::default()),
        );

        let variables = vec![
            VariableDescriptor::new("A1", ToolCode::new("ToolA")),
            VariableDescriptor::new("S1", ToolCode::new("Solo")),
        ];
        let tools = vec![
            ToolDescriptor::tool("ToolA").with_output("A1", 0),
            ToolDescriptor::tool("Solo").exclusive().with_output("S1", 0),
            ToolDescriptor::template("Doc").with_input("A1", 0).with_input("S1", 0),
        ];
        let catalog = Arc::new(Catalog::new(tools, variables).unwrap());
        let processor = RequestProcessor::new(catalog, coordinator, prep(&[]));

        // Held by another request for the whole test
        assert!(admission.request_turn(&ToolCode::new("Solo"), RequestId::new()).is_granted());

        let outcome = processor.process(DeliverableRequest::new(["Doc"])).await;

        assert_eq!(outcome.status, RequestStatus::Error);
        assert!(matches!(outcome.error, Some(ExecutionError::Admission(_))));
        assert_eq!(calculator.calls(), vec![ToolCode::new("ToolA")]);
        assert_eq!(outcome.report.steps.len(), 1);
        assert_eq!(
            outcome.report.outcome(&ToolCode::new("ToolA")).unwrap().status,
            StepStatus::Done
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_manifest_dir_inputs_reach_command_tool() {
        let manifests = tempfile::tempdir().unwrap();
        std::fs::write(
            manifests.path().join("Calc.json"),
            r#"[{"variable": "P1", "direction": "in"}, {"variable": "C1", "direction": "out"}]"#,
        )
        .unwrap();

        // Inline manifest of Calc is empty; the file is the only place P1 appears
        let catalog = Arc::new(
            Catalog::new(
                vec![
                    ToolDescriptor::tool("Calc"),
                    ToolDescriptor::template("Doc").with_input("C1", 0),
                ],
                vec![
                    VariableDescriptor::new("P1", ReservedTag::Prep),
                    VariableDescriptor::new("C1", ToolCode::new("Calc")),
                ],
            )
            .unwrap(),
        );

        // Echo the stdin payload back as the value of C1
        let calculator = CommandCalculator::default().with_command(
            "Calc",
            CommandSpec::new("sh").args(["-c", r#"read line; printf '{"C1": %s}' "$line""#]),
        );
        let coordinator = ExecutionCoordinator::new(
            Arc::new(AdmissionQueue::default()),
            Arc::new(calculator),
            Arc::new(RecordingPopulator::default()),
        );
        let stores = tempfile::tempdir().unwrap();
        let processor = RequestProcessor::new(catalog, coordinator, prep(&[("P1", json!(7))]))
            .with_manifests(Arc::new(ManifestDir::new(manifests.path())))
            .with_store(StoreLocation::Dir(stores.path().to_path_buf()));

        let request = DeliverableRequest::new(["Doc"]);
        let id = request.id;
        let outcome = processor.process(request).await;

        assert_eq!(outcome.status, RequestStatus::Done, "{:?}", outcome.error);
        assert_eq!(outcome.route.codes(), vec![ToolCode::new("Calc"), ToolCode::new("Doc")]);

        let store = JsonDataStore::open(stores.path().join(format!("{id}.jsonl"))).await.unwrap();
        let payload = store.latest(&VariableId::new("C1")).await.unwrap().unwrap().value;
        assert_eq!(payload["tool"], "Calc");
        assert_eq!(payload["inputs"], json!({ "P1": 7 }));
        assert_eq!(payload["snapshot"]["P1"], json!(7));
    }

    #[test]
    fn test_plan_lists_prep_variables() {
        let processor = processor(scenario_catalog(), Arc::new(ScriptedCalculator::default()));

        let resolution = processor.plan(&DeliverableRequest::new(["Doc1", "Doc2"])).unwrap();

        assert_eq!(resolution.prep_variables, vec![VariableId::new("P1")]);
        assert!(resolution.route.contains(&ToolCode::new("ToolC")));
        assert_eq!(resolution.route.deliverables().count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_requests_share_exclusive_tool() {
        let variables = vec![VariableDescriptor::new("S1", ToolCode::new("Solo"))];
        let tools = vec![
            ToolDescriptor::tool("Solo").exclusive().with_output("S1", 0),
            ToolDescriptor::template("Doc").with_input("S1", 0),
        ];
        let catalog = Arc::new(Catalog::new(tools, variables).unwrap());
        let calculator = Arc::new(ScriptedCalculator::default().delay(Duration::from_secs(10)));
        let processor = Arc::new(processor(catalog, calculator.clone()));

        let start = tokio::time::Instant::now();
        let first = processor.spawn(DeliverableRequest::new(["Doc"]));
        let second = processor.spawn(DeliverableRequest::new(["Doc"]));

        for handle in [first, second] {
            assert_eq!(handle.await.unwrap().status, RequestStatus::Done);
        }
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert_eq!(calculator.max_running.load(Ordering::SeqCst), 1);
        assert!(processor.admission().pending(&ToolCode::new("Solo")).is_empty());
    }
}
