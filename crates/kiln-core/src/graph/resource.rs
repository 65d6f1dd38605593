//! Resource templates produced by the graph builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::variable::ResourceVariable;

/// A named resource template: an unstructured body plus the evaluation
/// metadata the runtime needs to fill it in and to judge its readiness.
///
/// The body is handed out by mutable reference on purpose: the runtime
/// substitutes evaluated values in place, and the driver is allowed to adjust
/// the materialized body before applying it to the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    body: Value,
    #[serde(default)]
    variables: Vec<ResourceVariable>,
    #[serde(default)]
    ready_when: Vec<String>,
    #[serde(default)]
    top_level_fields: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl ResourceTemplate {
    /// Creates a template with the given body and no evaluation metadata.
    #[must_use]
    pub const fn new(body: Value) -> Self {
        Self {
            body,
            variables: Vec::new(),
            ready_when: Vec::new(),
            top_level_fields: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the ordered variable list.
    #[must_use]
    pub fn with_variables(mut self, variables: Vec<ResourceVariable>) -> Self {
        self.variables = variables;
        self
    }

    /// Sets the readiness expressions evaluated against observed state.
    #[must_use]
    pub fn with_ready_when<I, S>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ready_when = expressions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the top-level body fields readiness expressions may reference.
    #[must_use]
    pub fn with_top_level_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.top_level_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the names of sibling resources this template references.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// The unstructured body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Mutable access to the body for in-place substitution.
    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    /// The ordered variable list.
    #[must_use]
    pub fn variables(&self) -> &[ResourceVariable] {
        &self.variables
    }

    /// The readiness expressions; empty means always ready.
    #[must_use]
    pub fn ready_when(&self) -> &[String] {
        &self.ready_when
    }

    /// Top-level fields that scope readiness evaluation.
    #[must_use]
    pub fn top_level_fields(&self) -> &[String] {
        &self.top_level_fields
    }

    /// Names of sibling resources this template depends on.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
}
