//! Expression-environment error types.

use thiserror::Error;

/// Errors produced while compiling, evaluating, or converting an expression.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExprError {
    /// The expression source is not syntactically valid.
    #[error("failed to parse expression {expression:?}: {detail}")]
    Parse {
        /// The offending expression source.
        expression: String,
        /// Parser diagnostic.
        detail: String,
    },

    /// The expression references a variable the environment does not declare.
    #[error("expression {expression:?} references undeclared variable {variable:?}")]
    UndeclaredVariable {
        /// The offending expression source.
        expression: String,
        /// The undeclared root variable.
        variable: String,
    },

    /// Evaluation reached for a key the bound value does not carry (yet).
    #[error("no such key {key:?} while evaluating {expression:?}")]
    MissingKey {
        /// The offending expression source.
        expression: String,
        /// The absent key.
        key: String,
    },

    /// Evaluation failed for any other reason.
    #[error("failed to evaluate expression {expression:?}: {detail}")]
    Eval {
        /// The offending expression source.
        expression: String,
        /// Evaluator diagnostic.
        detail: String,
    },

    /// The evaluated value has no native representation.
    #[error("cannot convert evaluation result: {detail}")]
    Convert {
        /// Converter diagnostic.
        detail: String,
    },
}

impl ExprError {
    /// True when the failure only signals that the bound state does not carry
    /// a referenced key yet. Callers treat this as "retry once more state has
    /// been observed" rather than as a terminal failure. All retry/abort
    /// classification of evaluator errors funnels through this predicate.
    #[must_use]
    pub const fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }
}
