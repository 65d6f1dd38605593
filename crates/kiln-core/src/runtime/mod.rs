//! Incremental expression runtime for resource graphs.
//!
//! [`GraphRuntime`] owns the templates produced by the graph builder plus an
//! arena of shared evaluation cells, one per distinct expression string. An
//! outer reconciler drives it to a fixed point:
//!
//! ```text
//! loop:
//!     again = runtime.synchronize()?
//!     for name in runtime.topological_order():
//!         if let (Some(body), Resolved) = runtime.get_resource(name):
//!             observed = apply body to the cluster
//!             runtime.set_resource(name, observed)
//!     if !again: break
//! ```
//!
//! Evaluation is knowledge-driven rather than order-driven: a dynamic cell
//! runs as soon as every resource it depends on has observed state, so the
//! topological order is advisory (apply order, diagnostics) and never a
//! correctness requirement. Cells transition unresolved to resolved exactly
//! once and are never re-evaluated, which makes every pass monotonic and
//! [`GraphRuntime::synchronize`] safe to repeat.
//!
//! # Cell sharing
//!
//! Two variables carrying the same expression string, even across different
//! resources, alias one cell: `expressions_cache` maps the string to an
//! arena index, and each per-resource variable list stores those indices.
//! A single evaluation therefore resolves the expression for every
//! referencing resource at once, and nothing is ever evaluated twice.

mod error;

pub use error::RuntimeError;

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, trace};

use crate::expr::{self, Environment, EnvironmentOptions};
use crate::graph::{FieldDescriptor, ResourceTemplate, VariableKind};
use crate::resolve::Resolver;

/// Reserved name under which the instance's own variables are tracked. The
/// graph builder guarantees no resource uses it; construction re-checks.
pub const INSTANCE_NAME: &str = "instance";

/// The instance body field static expressions evaluate against.
const SPEC_FIELD: &str = "spec";

/// Lifecycle state reported by [`GraphRuntime::get_resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// The returned body is the observed state, or a fully materialized
    /// template ready to be applied to the cluster.
    Resolved,
    /// The resource (or one of its dependencies) still has unresolved
    /// dynamic variables.
    WaitingOnDependencies,
}

/// Index of a cell in the runtime's expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellId(usize);

/// Shared evaluation record for one distinct expression string.
#[derive(Debug)]
struct EvalCell {
    expression: String,
    dependencies: Vec<String>,
    kind: VariableKind,
    /// `Some` once evaluated. A resolved cell is never rewritten.
    value: Option<Value>,
}

impl EvalCell {
    const fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

/// The evaluation core: caches expressions, resolves them as knowledge
/// arrives, and substitutes the results into resource templates.
///
/// A runtime is single-owner and not thread-safe; it is meant to be driven
/// by one reconciliation worker. All operations are synchronous and perform
/// no I/O - applying bodies to the cluster and feeding observed state back
/// through [`GraphRuntime::set_resource`] is the driver's job.
#[derive(Debug)]
pub struct GraphRuntime {
    /// The top-level resource owning the graph. Its body receives status
    /// writes as information becomes available.
    instance: ResourceTemplate,

    /// The immutable input graph, keyed by resource name.
    resources: BTreeMap<String, ResourceTemplate>,

    /// Observed post-apply state, fed by the driver. Presence of a name
    /// means the resource exists in the cluster.
    resolved_resources: BTreeMap<String, Value>,

    /// Per-resource (and per-instance, under [`INSTANCE_NAME`]) cell
    /// references, parallel to each template's variable list.
    runtime_variables: HashMap<String, Vec<CellId>>,

    /// The cell arena. Entries are created during construction and live for
    /// the runtime's lifetime.
    cells: Vec<EvalCell>,

    /// Expression string to arena index; the authoritative dedup map.
    expressions_cache: HashMap<String, CellId>,

    /// Advisory dependency order, kept for the driver's apply loop.
    topological_order: Vec<String>,
}

impl GraphRuntime {
    /// Builds a runtime over the given graph, resolves every static cell,
    /// and runs a first propagation pass so the first caller-visible
    /// [`GraphRuntime::synchronize`] starts from maximally advanced state.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource map uses the reserved
    /// [`INSTANCE_NAME`], when an instance variable does not carry exactly
    /// one expression, or when a static expression fails to compile,
    /// evaluate, or convert.
    pub fn new(
        instance: ResourceTemplate,
        resources: BTreeMap<String, ResourceTemplate>,
        topological_order: Vec<String>,
    ) -> Result<Self, RuntimeError> {
        if resources.contains_key(INSTANCE_NAME) {
            return Err(RuntimeError::ReservedResourceName);
        }
        for variable in instance.variables() {
            let count = variable.descriptor.expressions.len();
            if count != 1 {
                return Err(RuntimeError::MalformedInstanceVariable {
                    path: variable.descriptor.path.clone(),
                    count,
                });
            }
        }

        let mut runtime = Self {
            instance,
            resources,
            resolved_resources: BTreeMap::new(),
            runtime_variables: HashMap::new(),
            cells: Vec::new(),
            expressions_cache: HashMap::new(),
            topological_order,
        };

        let names: Vec<String> = runtime.resources.keys().cloned().collect();
        for name in &names {
            let Some(resource) = runtime.resources.get(name) else {
                continue;
            };
            let variables = resource.variables().to_vec();
            for variable in &variables {
                for expression in &variable.descriptor.expressions {
                    let id = runtime.intern(expression, variable.kind, &variable.dependencies);
                    runtime
                        .runtime_variables
                        .entry(name.clone())
                        .or_default()
                        .push(id);
                }
            }
        }

        let instance_variables = runtime.instance.variables().to_vec();
        for variable in &instance_variables {
            for expression in &variable.descriptor.expressions {
                let id = runtime.intern(expression, variable.kind, &variable.dependencies);
                runtime
                    .runtime_variables
                    .entry(INSTANCE_NAME.to_owned())
                    .or_default()
                    .push(id);
            }
        }

        runtime.evaluate_static_variables()?;
        runtime.propagate_resource_variables()?;

        debug!(
            resources = runtime.resources.len(),
            cells = runtime.cells.len(),
            "runtime constructed"
        );
        Ok(runtime)
    }

    /// Returns the existing cell for `expression`, or creates one. The first
    /// variable to intern an expression fixes the cell's kind and
    /// dependencies; later references alias it.
    fn intern(
        &mut self,
        expression: &str,
        kind: VariableKind,
        dependencies: &[String],
    ) -> CellId {
        if let Some(&id) = self.expressions_cache.get(expression) {
            return id;
        }
        let id = CellId(self.cells.len());
        self.cells.push(EvalCell {
            expression: expression.to_owned(),
            dependencies: dependencies.to_vec(),
            kind,
            value: None,
        });
        self.expressions_cache.insert(expression.to_owned(), id);
        id
    }

    /// The advisory dependency order the graph builder computed.
    #[must_use]
    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    /// The template metadata for a resource, if the graph contains it.
    #[must_use]
    pub fn resource_descriptor(&self, name: &str) -> Option<&ResourceTemplate> {
        self.resources.get(name)
    }

    /// Returns the body the driver should act on, plus its state.
    ///
    /// Observed state wins; otherwise, if every dynamic variable of the
    /// resource and of its dependencies is resolved, the materialized
    /// template is returned as the signal "apply this to the cluster". The
    /// driver may mutate the returned body. Unknown names report
    /// [`ResourceState::WaitingOnDependencies`].
    pub fn get_resource(&mut self, name: &str) -> (Option<&mut Value>, ResourceState) {
        if self.resolved_resources.contains_key(name) {
            return (
                self.resolved_resources.get_mut(name),
                ResourceState::Resolved,
            );
        }
        if self.can_process_resource(name) {
            if let Some(resource) = self.resources.get_mut(name) {
                return (Some(resource.body_mut()), ResourceState::Resolved);
            }
        }
        (None, ResourceState::WaitingOnDependencies)
    }

    /// Records the observed post-apply state of a resource. Typically called
    /// after the driver created or updated the resource in the cluster.
    pub fn set_resource(&mut self, name: impl Into<String>, observed: Value) {
        self.resolved_resources.insert(name.into(), observed);
    }

    /// The instance body, including any status fields written so far.
    #[must_use]
    pub fn get_instance(&self) -> &Value {
        self.instance.body()
    }

    /// Replaces the instance's body contents in place. The instance keeps
    /// its identity, so cell bindings and variable lists stay valid.
    pub fn set_instance(&mut self, body: Value) {
        *self.instance.body_mut() = body;
    }

    /// One forward-progress step. Returns `Ok(false)` once every cell is
    /// resolved and every resource has observed state (quiescence);
    /// `Ok(true)` means the driver should apply newly processable resources,
    /// feed their observed state back, and call again.
    ///
    /// # Errors
    ///
    /// Any evaluation or substitution failure aborts the cycle. An error for
    /// which [`RuntimeError::is_incomplete_data`] holds should be retried on
    /// the next reconcile tick; progress made before the failure is kept
    /// either way.
    pub fn synchronize(&mut self) -> Result<bool, RuntimeError> {
        if self.all_expressions_resolved()
            && self.resolved_resources.len() == self.resources.len()
        {
            debug!("graph is quiescent");
            return Ok(false);
        }

        self.evaluate_dynamic_variables()?;
        self.propagate_resource_variables()?;
        self.evaluate_instance_statuses()?;
        Ok(true)
    }

    /// Evaluates a resource's readiness expressions against its latest
    /// observed state. No readiness result is cached: the caller may have
    /// just refreshed the observed body, and the answer must reflect it.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ResourceNotObserved`] when the resource has
    /// not been passed to [`GraphRuntime::set_resource`] yet, and a fatal
    /// error when an expression fails or yields a non-boolean.
    pub fn is_resource_ready(&self, name: &str) -> Result<bool, RuntimeError> {
        let Some(observed) = self.resolved_resources.get(name) else {
            return Err(RuntimeError::ResourceNotObserved {
                name: name.to_owned(),
            });
        };
        let Some(resource) = self.resources.get(name) else {
            return Err(RuntimeError::UnknownResource {
                name: name.to_owned(),
            });
        };

        let expressions = resource.ready_when();
        if expressions.is_empty() {
            return Ok(true);
        }

        let fields = resource.top_level_fields();
        let env = Environment::new(EnvironmentOptions::with_variables(fields.iter().cloned()));
        let inputs: Vec<(&str, &Value)> = fields
            .iter()
            .filter_map(|field| observed.get(field).map(|value| (field.as_str(), value)))
            .collect();

        for expression in expressions {
            let program = env.compile(expression).map_err(|source| {
                RuntimeError::Readiness {
                    name: name.to_owned(),
                    source,
                }
            })?;
            let value = program.eval(inputs.iter().copied()).map_err(|source| {
                RuntimeError::Readiness {
                    name: name.to_owned(),
                    source,
                }
            })?;
            let native = expr::to_native(value).map_err(|source| RuntimeError::Readiness {
                name: name.to_owned(),
                source,
            })?;
            match native {
                Value::Bool(true) => {}
                Value::Bool(false) => {
                    trace!(resource = name, expression = %expression, "readiness condition not met");
                    return Ok(false);
                }
                _ => {
                    return Err(RuntimeError::NonBooleanReadiness {
                        name: name.to_owned(),
                        expression: expression.clone(),
                    })
                }
            }
        }
        Ok(true)
    }

    /// Resolves every static cell against the instance's `spec` subtree.
    /// Runs once, from construction.
    fn evaluate_static_variables(&mut self) -> Result<(), RuntimeError> {
        let env = Environment::new(EnvironmentOptions::with_variables([SPEC_FIELD]));
        let spec = self
            .instance
            .body()
            .get(SPEC_FIELD)
            .cloned()
            .unwrap_or(Value::Null);

        for index in 0..self.cells.len() {
            if !self.cells[index].kind.is_static() || self.cells[index].is_resolved() {
                continue;
            }
            let program = env
                .compile(&self.cells[index].expression)
                .map_err(RuntimeError::StaticVariables)?;
            let value = program
                .eval([(SPEC_FIELD, &spec)])
                .map_err(RuntimeError::StaticVariables)?;
            let native = expr::to_native(value).map_err(RuntimeError::StaticVariables)?;
            self.cells[index].value = Some(native);
        }
        Ok(())
    }

    /// Resolves every dynamic cell whose dependencies all have observed
    /// state. A fresh environment is built each call so newly observed
    /// siblings become bindable.
    fn evaluate_dynamic_variables(&mut self) -> Result<(), RuntimeError> {
        let observed: Vec<String> = self.resolved_resources.keys().cloned().collect();
        let env = Environment::new(EnvironmentOptions::with_variables(observed));

        'cells: for index in 0..self.cells.len() {
            {
                let cell = &self.cells[index];
                if !cell.kind.is_dynamic() || cell.is_resolved() {
                    continue;
                }
                if !cell
                    .dependencies
                    .iter()
                    .all(|dependency| self.resolved_resources.contains_key(dependency))
                {
                    continue;
                }
            }

            let program = env
                .compile(&self.cells[index].expression)
                .map_err(RuntimeError::DynamicVariables)?;

            let mut inputs = Vec::with_capacity(self.cells[index].dependencies.len());
            for dependency in &self.cells[index].dependencies {
                let Some(body) = self.resolved_resources.get(dependency) else {
                    continue 'cells;
                };
                inputs.push((dependency.as_str(), body));
            }

            let value = program.eval(inputs).map_err(|error| {
                if error.is_missing_key() {
                    RuntimeError::IncompleteData(error)
                } else {
                    RuntimeError::DynamicVariables(error)
                }
            })?;
            let native = expr::to_native(value).map_err(RuntimeError::DynamicVariables)?;
            trace!(
                expression = %self.cells[index].expression,
                "resolved dynamic expression"
            );
            self.cells[index].value = Some(native);
        }
        Ok(())
    }

    /// Substitutes resolved values into the template of every processable
    /// resource.
    fn propagate_resource_variables(&mut self) -> Result<(), RuntimeError> {
        let names: Vec<String> = self.resources.keys().cloned().collect();
        let values = self.resolved_expression_values();

        for name in names {
            if !self.can_process_resource(&name) {
                continue;
            }
            let Some(resource) = self.resources.get_mut(&name) else {
                continue;
            };
            let descriptors: Vec<FieldDescriptor> = resource
                .variables()
                .iter()
                .map(|variable| variable.descriptor.clone())
                .collect();
            if descriptors.is_empty() {
                continue;
            }

            let mut resolver = Resolver::new(resource.body_mut(), &values);
            let summary = resolver.resolve(&descriptors);
            if !summary.errors.is_empty() {
                let detail = summary
                    .errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(RuntimeError::Propagation { name, detail });
            }
            trace!(resource = %name, fields = summary.resolved.len(), "propagated template variables");
        }
        Ok(())
    }

    /// Writes resolved instance-variable values onto the instance body.
    /// Best-effort: unresolved variables are skipped without error.
    fn evaluate_instance_statuses(&mut self) -> Result<(), RuntimeError> {
        let mut writes = Vec::new();
        for variable in self.instance.variables() {
            // construction guarantees instance variables are singletons
            let Some(expression) = variable.descriptor.expressions.first() else {
                continue;
            };
            let Some(&id) = self.expressions_cache.get(expression) else {
                continue;
            };
            if let Some(value) = &self.cells[id.0].value {
                writes.push((variable.descriptor.path.clone(), value.clone()));
            }
        }
        if writes.is_empty() {
            return Ok(());
        }

        let values = HashMap::new();
        let mut resolver = Resolver::new(self.instance.body_mut(), &values);
        for (path, value) in writes {
            resolver
                .blind_set_value_at_path(&path, value)
                .map_err(|source| RuntimeError::InstanceStatus { path, source })?;
        }
        Ok(())
    }

    /// Expression string to resolved value, for every resolved cell.
    fn resolved_expression_values(&self) -> HashMap<String, Value> {
        self.cells
            .iter()
            .filter_map(|cell| {
                cell.value
                    .as_ref()
                    .map(|value| (cell.expression.clone(), value.clone()))
            })
            .collect()
    }

    /// A resource is processable when all of its own dynamic variables are
    /// resolved and the same holds for every resource it depends on.
    fn can_process_resource(&self, name: &str) -> bool {
        let Some(resource) = self.resources.get(name) else {
            return false;
        };
        resource
            .dependencies()
            .iter()
            .all(|dependency| self.resource_variables_resolved(dependency))
            && self.resource_variables_resolved(name)
    }

    /// Whether every dynamic cell referenced by `name`'s variable list is
    /// resolved. A resource without variables trivially qualifies.
    fn resource_variables_resolved(&self, name: &str) -> bool {
        self.runtime_variables.get(name).map_or(true, |ids| {
            ids.iter().all(|id| {
                let cell = &self.cells[id.0];
                !cell.kind.is_dynamic() || cell.is_resolved()
            })
        })
    }

    fn all_expressions_resolved(&self) -> bool {
        self.cells.iter().all(EvalCell::is_resolved)
    }
}
