//! Variables: where an evaluated expression lands, and what it needs first.

use serde::{Deserialize, Serialize};

/// Classifies when a variable's expressions can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Depends only on the instance's input spec; evaluated once at
    /// construction.
    Static,
    /// Reads the observed state of sibling resources; evaluated during the
    /// synchronization loop once every dependency has been observed.
    Dynamic,
}

impl VariableKind {
    /// Returns `true` for [`VariableKind::Static`].
    #[must_use]
    pub const fn is_static(self) -> bool {
        matches!(self, Self::Static)
    }

    /// Returns `true` for [`VariableKind::Dynamic`].
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// Locates a field in a resource body and names the expressions that feed it.
///
/// A standalone descriptor replaces the whole field with the evaluated value
/// of its single expression. A non-standalone descriptor describes a string
/// field containing one or more `${expression}` segments; each segment is
/// substituted textually and the field keeps its string type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    /// Dotted field path into the resource body, e.g. `spec.replicas` or
    /// `spec.containers[0].image`.
    pub path: String,
    /// Expression sources. Exactly one entry for standalone descriptors.
    pub expressions: Vec<String>,
    /// Whether the single expression covers the whole field.
    pub standalone: bool,
}

impl FieldDescriptor {
    /// Descriptor for a field whose value is a single whole-field expression.
    #[must_use]
    pub fn standalone(path: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            expressions: vec![expression.into()],
            standalone: true,
        }
    }

    /// Descriptor for a string field interpolating one or more expressions.
    #[must_use]
    pub fn interpolated<I, S>(path: impl Into<String>, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            expressions: expressions.into_iter().map(Into::into).collect(),
            standalone: false,
        }
    }
}

/// One template variable: a field to fill plus the evaluation inputs it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceVariable {
    /// Where the evaluated value is written.
    pub descriptor: FieldDescriptor,
    /// Static or dynamic evaluation timing.
    pub kind: VariableKind,
    /// Names of sibling resources whose observed state the expressions read.
    /// Empty for static variables.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceVariable {
    /// A variable reading only the instance spec.
    #[must_use]
    pub fn static_field(path: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            descriptor: FieldDescriptor::standalone(path, expression),
            kind: VariableKind::Static,
            dependencies: Vec::new(),
        }
    }

    /// A variable reading the observed state of the named sibling resources.
    #[must_use]
    pub fn dynamic_field<I, S>(
        path: impl Into<String>,
        expression: impl Into<String>,
        dependencies: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            descriptor: FieldDescriptor::standalone(path, expression),
            kind: VariableKind::Dynamic,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }

    /// Replaces the descriptor with an interpolated one sharing the same
    /// evaluation timing and dependencies.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: FieldDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }
}
