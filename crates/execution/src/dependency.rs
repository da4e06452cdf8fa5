//! Dependency resolution for deliverables.
//!
//! Expands a list of target tools into the tools that produce their inputs,
//! level by level, and orders the result so producers run before consumers.

use crate::error::ResolveError;
use docflow_catalog::{ManifestProvider, ToolCatalog, VariableCatalog};
use docflow_core::{
    Direction, ExecutionRoute, ReservedTag, ToolDescriptor, VariableDescriptor, VariableId,
    VariableSource,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Default recursion limit.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// A variable found during resolution, tagged with the depth it was found at.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVariable {
    /// Catalog descriptor
    pub descriptor: Arc<VariableDescriptor>,
    /// Recursion depth of discovery (targets are depth 1)
    pub depth: usize,
}

/// Result of dependency resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Tools to run, producers first
    pub route: ExecutionRoute,
    /// Variables the preparation stage must supply
    pub prep_variables: Vec<VariableId>,
    /// Every live input variable found, shallowest first
    pub variables: Vec<ResolvedVariable>,
    /// Deepest recursion level reached
    pub depth: usize,
}

/// Tools discovered per depth; index 0 holds depth 1.
#[derive(Default)]
struct DepthHistory {
    levels: Vec<Vec<Arc<ToolDescriptor>>>,
}

impl DepthHistory {
    fn record(&mut self, depth: usize, tools: Vec<Arc<ToolDescriptor>>) {
        let index = depth - 1;
        if self.levels.len() <= index {
            self.levels.resize_with(index + 1, Vec::new);
        }
        self.levels[index] = tools;
    }

    /// Deepest level first, so true producers precede their dependents.
    fn into_route(self) -> ExecutionRoute {
        let mut route = ExecutionRoute::new();
        for level in self.levels.into_iter().rev() {
            for tool in level {
                route.push(tool);
            }
        }
        route
    }
}

/// Resolves the tools a set of deliverables depends on.
pub struct DependencyResolver<'a> {
    tools: &'a dyn ToolCatalog,
    variables: &'a dyn VariableCatalog,
    manifests: &'a dyn ManifestProvider,
    max_depth: usize,
}

impl<'a> DependencyResolver<'a> {
    /// Create a new resolver.
    pub fn new(
        tools: &'a dyn ToolCatalog,
        variables: &'a dyn VariableCatalog,
        manifests: &'a dyn ManifestProvider,
    ) -> Self {
        Self {
            tools,
            variables,
            manifests,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the recursion limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Compute the execution route for `targets`.
    ///
    /// Variables whose source is in `excluded` are treated as satisfied, as
    /// are variables with a reserved source tag.
    pub fn resolve(
        &self,
        targets: &[Arc<ToolDescriptor>],
        excluded: &HashSet<String>,
    ) -> Result<Resolution, ResolveError> {
        let mut history = DepthHistory::default();
        let variables = self.expand(targets.to_vec(), 1, excluded, &mut history)?;

        let depth = history.levels.len();
        let route = history.into_route();

        let mut prep_variables: Vec<VariableId> = Vec::new();
        for var in &variables {
            let id = &var.descriptor.id;
            if var.descriptor.source == VariableSource::Reserved(ReservedTag::Prep)
                && !prep_variables.contains(id)
            {
                prep_variables.push(id.clone());
            }
        }

        info!(
            route = ?route.codes(),
            prep = prep_variables.len(),
            depth,
            "Resolved execution route"
        );

        Ok(Resolution {
            route,
            prep_variables,
            variables,
            depth,
        })
    }

    fn expand(
        &self,
        targets: Vec<Arc<ToolDescriptor>>,
        depth: usize,
        excluded: &HashSet<String>,
        history: &mut DepthHistory,
    ) -> Result<Vec<ResolvedVariable>, ResolveError> {
        if depth > self.max_depth {
            return Err(ResolveError::RecursionLimitExceeded {
                depth,
                limit: self.max_depth,
            });
        }

        if targets.is_empty() {
            history.record(depth, Vec::new());
            return Ok(Vec::new());
        }

        debug!(depth, targets = targets.len(), "Expanding dependency level");

        let mut level = Vec::with_capacity(targets.len());
        let mut collected: Vec<ResolvedVariable> = Vec::new();
        for tool in targets {
            let tool = self.with_provided_manifest(tool)?;
            for descriptor in self.live_inputs(&tool)? {
                push_unique(&mut collected, ResolvedVariable { descriptor, depth });
            }
            level.push(tool);
        }
        history.record(depth, level);

        let mut sources: Vec<Arc<ToolDescriptor>> = Vec::new();
        for var in &collected {
            let Some(code) = var.descriptor.source.tool_code() else {
                continue;
            };
            if excluded.contains(code.as_str()) {
                continue;
            }

            let producer = self
                .tools
                .lookup(code)
                .ok_or_else(|| ResolveError::UnknownToolCode {
                    code: code.clone(),
                    variable: Some(var.descriptor.id.clone()),
                })?;

            if !sources.iter().any(|t| t.code == producer.code) {
                sources.push(producer);
            }
        }

        for var in self.expand(sources, depth + 1, excluded, history)? {
            push_unique(&mut collected, var);
        }

        Ok(collected)
    }

    /// `tool` carrying the manifest the provider returns for it, so the
    /// route's steps see the same inputs the resolver did.
    fn with_provided_manifest(
        &self,
        tool: Arc<ToolDescriptor>,
    ) -> Result<Arc<ToolDescriptor>, ResolveError> {
        let manifest = self
            .manifests
            .manifest(&tool)
            .map_err(|source| ResolveError::ManifestParse {
                tool: tool.code.clone(),
                source,
            })?;

        if manifest == tool.manifest {
            return Ok(tool);
        }
        Ok(Arc::new(ToolDescriptor {
            manifest,
            ..(*tool).clone()
        }))
    }

    /// Input variables of `tool` that count as dependencies.
    ///
    /// Only the first occurrence of a name in the manifest is considered, so a
    /// variable re-declared at a later call stage is not a second dependency.
    fn live_inputs(&self, tool: &ToolDescriptor) -> Result<Vec<Arc<VariableDescriptor>>, ResolveError> {
        let mut seen: HashSet<VariableId> = HashSet::new();
        let mut inputs = Vec::new();

        for entry in &tool.manifest {
            if !seen.insert(entry.variable.clone()) {
                continue;
            }
            if entry.direction != Direction::In {
                continue;
            }

            let descriptor = self.variables.resolve(&entry.variable).ok_or_else(|| {
                ResolveError::UnknownVariable {
                    tool: tool.code.clone(),
                    variable: entry.variable.clone(),
                }
            })?;
            inputs.push(descriptor);
        }

        Ok(inputs)
    }
}

fn push_unique(list: &mut Vec<ResolvedVariable>, var: ResolvedVariable) {
    if !list.iter().any(|v| v.descriptor.id == var.descriptor.id) {
        list.push(var);
    }
}
