//! Runtime error surface.

use thiserror::Error;

use crate::expr::ExprError;
use crate::resolve::ResolveError;

/// Errors surfaced by [`GraphRuntime`](super::GraphRuntime).
///
/// Only one kind is recoverable by waiting: [`RuntimeError::IncompleteData`],
/// raised when observed cluster state has not populated a key an expression
/// reads. Drivers check [`RuntimeError::is_incomplete_data`] and retry on the
/// next reconcile tick instead of surfacing the failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The resource map claims the name reserved for the instance.
    #[error("resource name \"instance\" is reserved for the top-level instance")]
    ReservedResourceName,

    /// An instance variable carried zero or several expressions.
    #[error("instance variable at {path} must carry exactly one expression, found {count}")]
    MalformedInstanceVariable {
        /// The variable's field path.
        path: String,
        /// How many expressions it carried.
        count: usize,
    },

    /// A static expression failed to compile, evaluate, or convert.
    #[error("failed to evaluate static variables: {0}")]
    StaticVariables(#[source] ExprError),

    /// A dynamic expression failed for a reason that will not heal on retry.
    #[error("failed to evaluate dynamic variables: {0}")]
    DynamicVariables(#[source] ExprError),

    /// Observed state is missing a key a dynamic expression reads.
    #[error("incomplete data: {0}")]
    IncompleteData(#[source] ExprError),

    /// Substituting resolved values into a resource template failed.
    #[error("failed to resolve resource {name}: {detail}")]
    Propagation {
        /// The resource whose template could not be filled.
        name: String,
        /// Joined per-field failures.
        detail: String,
    },

    /// Writing a resolved status value onto the instance failed.
    #[error("failed to set value at path {path}: {source}")]
    InstanceStatus {
        /// The instance status path.
        path: String,
        /// The underlying write failure.
        source: ResolveError,
    },

    /// Readiness was queried for a resource without observed state.
    #[error("resource {name} not found")]
    ResourceNotObserved {
        /// The queried resource name.
        name: String,
    },

    /// The named resource is not part of the graph.
    #[error("unknown resource {name}")]
    UnknownResource {
        /// The queried resource name.
        name: String,
    },

    /// A readiness expression failed to compile, evaluate, or convert.
    #[error("failed to evaluate readiness for resource {name}: {source}")]
    Readiness {
        /// The resource being checked.
        name: String,
        /// The underlying expression failure.
        source: ExprError,
    },

    /// A readiness expression produced something other than a boolean.
    #[error("readiness expression {expression:?} for resource {name} did not evaluate to a boolean")]
    NonBooleanReadiness {
        /// The resource being checked.
        name: String,
        /// The offending expression.
        expression: String,
    },
}

impl RuntimeError {
    /// True when the failure only means "observed state is not complete yet";
    /// the driver should call `synchronize` again after the next observation.
    #[must_use]
    pub const fn is_incomplete_data(&self) -> bool {
        matches!(self, Self::IncompleteData(_))
    }
}
