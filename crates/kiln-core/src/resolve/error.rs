//! Path-resolution error types.

use thiserror::Error;

/// Errors produced while writing values into an unstructured body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The field path is not syntactically valid.
    #[error("invalid field path {path:?}: {detail}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// What made it invalid.
        detail: String,
    },

    /// A path segment does not exist in the target object.
    #[error("field {segment:?} of path {path:?} does not exist")]
    MissingField {
        /// The full path being walked.
        path: String,
        /// The absent segment.
        segment: String,
    },

    /// A field segment landed on a value that is not an object.
    #[error("field {segment:?} of path {path:?} is not addressable: parent is not an object")]
    NotAnObject {
        /// The full path being walked.
        path: String,
        /// The segment whose parent is not an object.
        segment: String,
    },

    /// An index segment landed on a value that is not an array.
    #[error("index [{index}] of path {path:?} is not addressable: parent is not an array")]
    NotAnArray {
        /// The full path being walked.
        path: String,
        /// The index whose parent is not an array.
        index: usize,
    },

    /// An index segment is past the end of the array.
    #[error("index [{index}] of path {path:?} is out of bounds")]
    IndexOutOfBounds {
        /// The full path being walked.
        path: String,
        /// The out-of-range index.
        index: usize,
    },

    /// No evaluated value exists for an expression a descriptor references.
    #[error("no evaluated value for expression {expression:?} at path {path:?}")]
    MissingValue {
        /// The path being filled.
        path: String,
        /// The expression without a value.
        expression: String,
    },

    /// An interpolated descriptor points at a non-string field.
    #[error("path {path:?} must hold a string to interpolate into")]
    ExpectedString {
        /// The path being filled.
        path: String,
    },

    /// A descriptor carries no expressions at all.
    #[error("descriptor for path {path:?} carries no expressions")]
    NoExpressions {
        /// The path being filled.
        path: String,
    },
}
