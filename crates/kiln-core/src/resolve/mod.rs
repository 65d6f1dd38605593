//! Path-addressed writes into unstructured resource bodies.
//!
//! Once expressions have been evaluated, their values still have to land at
//! the right spot inside a resource template. A [`Resolver`] wraps one root
//! object together with the expression-to-value map and offers two write
//! modes: [`Resolver::resolve`], which fills the fields named by
//! [`FieldDescriptor`]s and expects the template to already carry the path
//! (the descriptors were derived from that very template), and
//! [`Resolver::blind_set_value_at_path`], which creates missing intermediate
//! objects on the way down and is used for best-effort status writes.

mod error;

pub use error::ResolveError;

use std::collections::HashMap;

use serde_json::Value;

use crate::graph::FieldDescriptor;

/// One parsed component of a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
}

/// Outcome of a [`Resolver::resolve`] pass.
#[derive(Debug, Default)]
pub struct ResolutionSummary {
    /// Paths whose values were written.
    pub resolved: Vec<String>,
    /// Failures encountered; any entry invalidates the pass.
    pub errors: Vec<ResolveError>,
}

/// Substitutes pre-evaluated expression values into an unstructured object.
#[derive(Debug)]
pub struct Resolver<'a> {
    root: &'a mut Value,
    expression_values: &'a HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `root` with the given expression values.
    pub fn new(root: &'a mut Value, expression_values: &'a HashMap<String, Value>) -> Self {
        Self {
            root,
            expression_values,
        }
    }

    /// Writes each descriptor's value at its path, collecting per-field
    /// outcomes instead of stopping at the first failure.
    pub fn resolve(&mut self, fields: &[FieldDescriptor]) -> ResolutionSummary {
        let mut summary = ResolutionSummary::default();
        for field in fields {
            match self.resolve_field(field) {
                Ok(()) => summary.resolved.push(field.path.clone()),
                Err(error) => summary.errors.push(error),
            }
        }
        summary
    }

    fn resolve_field(&mut self, field: &FieldDescriptor) -> Result<(), ResolveError> {
        if field.standalone {
            let Some(expression) = field.expressions.first() else {
                return Err(ResolveError::NoExpressions {
                    path: field.path.clone(),
                });
            };
            let value = self.lookup(&field.path, expression)?.clone();
            return self.set_value_at_path(&field.path, value);
        }

        // Interpolated: substitute every `${expression}` occurrence inside
        // the string currently held at the path.
        let segments = parse_path(&field.path)?;
        let target = descend(self.root, &field.path, &segments)?;
        let Value::String(template) = target else {
            return Err(ResolveError::ExpectedString {
                path: field.path.clone(),
            });
        };
        let mut rendered = template.clone();
        for expression in &field.expressions {
            let value = self.expression_values.get(expression).ok_or_else(|| {
                ResolveError::MissingValue {
                    path: field.path.clone(),
                    expression: expression.clone(),
                }
            })?;
            let needle = format!("${{{expression}}}");
            rendered = rendered.replace(&needle, &render_scalar(value));
        }
        let target = descend(self.root, &field.path, &segments)?;
        *target = Value::String(rendered);
        Ok(())
    }

    fn lookup(&self, path: &str, expression: &str) -> Result<&Value, ResolveError> {
        self.expression_values
            .get(expression)
            .ok_or_else(|| ResolveError::MissingValue {
                path: path.to_owned(),
                expression: expression.to_owned(),
            })
    }

    /// Writes `value` at `path`, requiring every intermediate segment to
    /// already exist.
    fn set_value_at_path(&mut self, path: &str, value: Value) -> Result<(), ResolveError> {
        let segments = parse_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(invalid(path, "path is empty"));
        };
        let parent = descend(self.root, path, parents)?;
        match (last, parent) {
            (Segment::Field(name), Value::Object(entries)) => {
                entries.insert(name.clone(), value);
                Ok(())
            }
            (Segment::Field(name), _) => Err(ResolveError::NotAnObject {
                path: path.to_owned(),
                segment: name.clone(),
            }),
            (Segment::Index(index), Value::Array(items)) => {
                let slot = items
                    .get_mut(*index)
                    .ok_or_else(|| ResolveError::IndexOutOfBounds {
                        path: path.to_owned(),
                        index: *index,
                    })?;
                *slot = value;
                Ok(())
            }
            (Segment::Index(index), _) => Err(ResolveError::NotAnArray {
                path: path.to_owned(),
                index: *index,
            }),
        }
    }

    /// Writes `value` at `path`, creating missing intermediate objects on the
    /// way down. Arrays are never created and their indices must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when the path is invalid, an existing
    /// intermediate is neither an object nor `null`, or an index is out of
    /// bounds.
    pub fn blind_set_value_at_path(
        &mut self,
        path: &str,
        value: Value,
    ) -> Result<(), ResolveError> {
        let segments = parse_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(invalid(path, "path is empty"));
        };

        let mut current: &mut Value = self.root;
        for segment in parents {
            current = match segment {
                Segment::Field(name) => {
                    let entries = as_object_mut(current, path, name)?;
                    let slot = entries
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    if slot.is_null() {
                        *slot = Value::Object(serde_json::Map::new());
                    }
                    slot
                }
                Segment::Index(index) => match current {
                    Value::Array(items) => items.get_mut(*index).ok_or_else(|| {
                        ResolveError::IndexOutOfBounds {
                            path: path.to_owned(),
                            index: *index,
                        }
                    })?,
                    _ => {
                        return Err(ResolveError::NotAnArray {
                            path: path.to_owned(),
                            index: *index,
                        })
                    }
                },
            };
        }

        match last {
            Segment::Field(name) => {
                let entries = as_object_mut(current, path, name)?;
                entries.insert(name.clone(), value);
                Ok(())
            }
            Segment::Index(index) => match current {
                Value::Array(items) => {
                    let slot =
                        items
                            .get_mut(*index)
                            .ok_or_else(|| ResolveError::IndexOutOfBounds {
                                path: path.to_owned(),
                                index: *index,
                            })?;
                    *slot = value;
                    Ok(())
                }
                _ => Err(ResolveError::NotAnArray {
                    path: path.to_owned(),
                    index: *index,
                }),
            },
        }
    }
}

/// Upgrades `null` to an empty object, then demands an object.
fn as_object_mut<'v>(
    value: &'v mut Value,
    path: &str,
    segment: &str,
) -> Result<&'v mut serde_json::Map<String, Value>, ResolveError> {
    if value.is_null() {
        *value = Value::Object(serde_json::Map::new());
    }
    match value {
        Value::Object(entries) => Ok(entries),
        _ => Err(ResolveError::NotAnObject {
            path: path.to_owned(),
            segment: segment.to_owned(),
        }),
    }
}

/// Renders a value for textual interpolation. Strings substitute verbatim,
/// everything else as compact JSON.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Walks `segments` down from `root` and returns the addressed slot.
fn descend<'v>(
    root: &'v mut Value,
    path: &str,
    segments: &[Segment],
) -> Result<&'v mut Value, ResolveError> {
    let mut current = root;
    for segment in segments {
        current = match segment {
            Segment::Field(name) => match current {
                Value::Object(entries) => {
                    entries
                        .get_mut(name)
                        .ok_or_else(|| ResolveError::MissingField {
                            path: path.to_owned(),
                            segment: name.clone(),
                        })?
                }
                _ => {
                    return Err(ResolveError::NotAnObject {
                        path: path.to_owned(),
                        segment: name.clone(),
                    })
                }
            },
            Segment::Index(index) => match current {
                Value::Array(items) => {
                    items
                        .get_mut(*index)
                        .ok_or_else(|| ResolveError::IndexOutOfBounds {
                            path: path.to_owned(),
                            index: *index,
                        })?
                }
                _ => {
                    return Err(ResolveError::NotAnArray {
                        path: path.to_owned(),
                        index: *index,
                    })
                }
            },
        };
    }
    Ok(current)
}

fn invalid(path: &str, detail: &str) -> ResolveError {
    ResolveError::InvalidPath {
        path: path.to_owned(),
        detail: detail.to_owned(),
    }
}

/// Parses `spec.containers[0].image`-style paths. A single leading dot is
/// tolerated.
fn parse_path(path: &str) -> Result<Vec<Segment>, ResolveError> {
    let rest = path.strip_prefix('.').unwrap_or(path);
    let mut segments = Vec::new();
    let mut pos = 0;
    let mut need_field = true;

    while pos < rest.len() {
        let bytes = rest.as_bytes();
        match bytes[pos] {
            b'.' => {
                if need_field {
                    return Err(invalid(path, "empty path segment"));
                }
                need_field = true;
                pos += 1;
            }
            b'[' => {
                if need_field && !segments.is_empty() {
                    return Err(invalid(path, "index must follow a field"));
                }
                let close = rest[pos..]
                    .find(']')
                    .map(|offset| pos + offset)
                    .ok_or_else(|| invalid(path, "unterminated index"))?;
                let digits = &rest[pos + 1..close];
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| invalid(path, "index is not a number"))?;
                segments.push(Segment::Index(index));
                need_field = false;
                pos = close + 1;
            }
            _ => {
                if !need_field {
                    return Err(invalid(path, "missing separator"));
                }
                let end = rest[pos..]
                    .find(['.', '['])
                    .map_or(rest.len(), |offset| pos + offset);
                segments.push(Segment::Field(rest[pos..end].to_owned()));
                need_field = false;
                pos = end;
            }
        }
    }

    if need_field {
        return Err(invalid(path, "empty path segment"));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(expression, value)| ((*expression).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn parses_nested_paths() {
        let segments = parse_path("spec.containers[0].image").expect("parse path");
        assert_eq!(
            segments,
            vec![
                Segment::Field("spec".to_owned()),
                Segment::Field("containers".to_owned()),
                Segment::Index(0),
                Segment::Field("image".to_owned()),
            ]
        );
    }

    #[test]
    fn tolerates_leading_dot() {
        let segments = parse_path(".status.phase").expect("parse path");
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in ["", "a..b", "a.", "a[x]", "a[1", "a.[0]"] {
            assert!(
                matches!(parse_path(path), Err(ResolveError::InvalidPath { .. })),
                "path {path:?} should be invalid"
            );
        }
    }

    #[test]
    fn standalone_descriptor_replaces_field() {
        let mut body = json!({"spec": {"replicas": "${spec.replicas}"}});
        let expression_values = values(&[("spec.replicas", json!(3))]);
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary = resolver.resolve(&[FieldDescriptor::standalone(
            "spec.replicas",
            "spec.replicas",
        )]);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.resolved, vec!["spec.replicas"]);
        assert_eq!(body["spec"]["replicas"], json!(3));
    }

    #[test]
    fn interpolated_descriptor_substitutes_segments() {
        let mut body = json!({"spec": {"address": "${db.status.host}:${db.status.port}"}});
        let expression_values = values(&[
            ("db.status.host", json!("10.0.0.4")),
            ("db.status.port", json!(5432)),
        ]);
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary = resolver.resolve(&[FieldDescriptor::interpolated(
            "spec.address",
            ["db.status.host", "db.status.port"],
        )]);
        assert!(summary.errors.is_empty());
        assert_eq!(body["spec"]["address"], json!("10.0.0.4:5432"));
    }

    #[test]
    fn interpolation_requires_string_target() {
        let mut body = json!({"spec": {"address": 7}});
        let expression_values = values(&[("db.status.host", json!("h"))]);
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary =
            resolver.resolve(&[FieldDescriptor::interpolated("spec.address", ["db.status.host"])]);
        assert!(matches!(
            summary.errors.as_slice(),
            [ResolveError::ExpectedString { .. }]
        ));
    }

    #[test]
    fn missing_value_is_reported() {
        let mut body = json!({"spec": {"replicas": "${spec.replicas}"}});
        let expression_values = HashMap::new();
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary = resolver.resolve(&[FieldDescriptor::standalone(
            "spec.replicas",
            "spec.replicas",
        )]);
        assert!(matches!(
            summary.errors.as_slice(),
            [ResolveError::MissingValue { .. }]
        ));
    }

    #[test]
    fn strict_write_requires_existing_parents() {
        let mut body = json!({"spec": {}});
        let expression_values = values(&[("x", json!(1))]);
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary = resolver.resolve(&[FieldDescriptor::standalone("spec.a.b", "x")]);
        assert!(matches!(
            summary.errors.as_slice(),
            [ResolveError::MissingField { .. }]
        ));
    }

    #[test]
    fn writes_through_array_indices() {
        let mut body = json!({"spec": {"containers": [{"image": "${img}"}]}});
        let expression_values = values(&[("img", json!("registry/app:v2"))]);
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let summary = resolver.resolve(&[FieldDescriptor::standalone(
            "spec.containers[0].image",
            "img",
        )]);
        assert!(summary.errors.is_empty());
        assert_eq!(body["spec"]["containers"][0]["image"], json!("registry/app:v2"));
    }

    #[test]
    fn blind_set_creates_intermediate_objects() {
        let mut body = json!({"kind": "WebApp"});
        let expression_values = HashMap::new();
        let mut resolver = Resolver::new(&mut body, &expression_values);
        resolver
            .blind_set_value_at_path("status.endpoints.primary", json!("10.1.2.3"))
            .expect("blind set");
        assert_eq!(body["status"]["endpoints"]["primary"], json!("10.1.2.3"));
    }

    #[test]
    fn blind_set_upgrades_null_intermediates() {
        let mut body = json!({"status": null});
        let expression_values = HashMap::new();
        let mut resolver = Resolver::new(&mut body, &expression_values);
        resolver
            .blind_set_value_at_path("status.ready", json!(true))
            .expect("blind set");
        assert_eq!(body["status"]["ready"], json!(true));
    }

    #[test]
    fn blind_set_refuses_non_object_intermediates() {
        let mut body = json!({"status": "Pending"});
        let expression_values = HashMap::new();
        let mut resolver = Resolver::new(&mut body, &expression_values);
        let err = resolver
            .blind_set_value_at_path("status.ready", json!(true))
            .expect_err("non-object intermediate");
        assert!(matches!(err, ResolveError::NotAnObject { .. }));
    }
}
