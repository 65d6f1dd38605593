//! # kiln-core
//!
//! Core library for kiln - an orchestrator that materializes a declarative
//! graph of dependent resources from a single top-level instance object.
//!
//! The instance declares a collection of child resources. Each resource
//! template embeds expressions whose values depend on the instance's input
//! spec and on the observed state of already-realized sibling resources. This
//! crate drives that dependency graph to a fixed point: it evaluates every
//! expression whose inputs are available, substitutes the result into the
//! resource template, and - once a resource has been applied and its observed
//! state fed back - unlocks the downstream resources that referenced it.
//!
//! ## Modules
//!
//! - [`graph`]: the resource/variable data model handed over by the graph
//!   builder
//! - [`expr`]: the expression environment (compile, evaluate, convert)
//! - [`resolve`]: path-addressed substitution into unstructured bodies
//! - [`runtime`]: the incremental evaluation core and its driver contract
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//!
//! use kiln_core::{GraphRuntime, ResourceTemplate, ResourceVariable};
//! use serde_json::json;
//!
//! let instance = ResourceTemplate::new(json!({
//!     "kind": "WebApp",
//!     "spec": { "replicas": 3 },
//! }));
//!
//! let deployment = ResourceTemplate::new(json!({
//!     "kind": "Deployment",
//!     "spec": { "replicas": "${spec.replicas}" },
//! }))
//! .with_variables(vec![ResourceVariable::static_field(
//!     "spec.replicas",
//!     "spec.replicas",
//! )]);
//!
//! let mut resources = BTreeMap::new();
//! resources.insert("deployment".to_string(), deployment);
//!
//! let mut runtime =
//!     GraphRuntime::new(instance, resources, vec!["deployment".to_string()]).unwrap();
//! while runtime.synchronize().unwrap() {
//!     // apply ready resources to the cluster, feed observed state back via
//!     // runtime.set_resource(...), then loop.
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod expr;
pub mod graph;
pub mod resolve;
pub mod runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::graph::{FieldDescriptor, ResourceTemplate, ResourceVariable, VariableKind};
    pub use crate::runtime::{GraphRuntime, ResourceState, RuntimeError};
}

pub use graph::{FieldDescriptor, ResourceTemplate, ResourceVariable, VariableKind};
pub use runtime::{GraphRuntime, ResourceState, RuntimeError};
