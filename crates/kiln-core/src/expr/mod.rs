//! Expression environment backed by the HCL evaluator.
//!
//! The runtime treats the expression language as a black box with three
//! operations: declare which named inputs an expression may reference
//! ([`Environment::new`]), turn a source string into an executable
//! [`Program`] ([`Environment::compile`]), and run it against concrete input
//! values ([`Program::eval`]). Results come back as evaluator-typed
//! [`hcl::Value`]s; [`to_native`] lowers them to plain JSON values.
//!
//! Compilation walks the parsed expression tree and rejects any reference to
//! a root variable the environment does not declare, so an expression that
//! reaches evaluation can only fail on the *shape* of the bound values. Of
//! those evaluation failures, exactly one is recoverable: a traversal into a
//! key the bound object does not carry yet ([`ExprError::MissingKey`]),
//! which the caller maps to its retry path.

mod error;

pub use error::ExprError;

use std::collections::BTreeSet;

use hcl::eval::{Context, Evaluate};
use hcl::template::{Directive, Element};
use hcl::{Expression, Identifier, Operation, Template, TraversalOperator};
use serde_json::Value as JsonValue;

/// Declares the named inputs an [`Environment`] exposes to expressions.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentOptions {
    variables: Vec<String>,
}

impl EnvironmentOptions {
    /// Options declaring the given input names.
    #[must_use]
    pub fn with_variables<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }
}

/// A compilation scope: the set of root variables expressions may reference.
#[derive(Debug, Clone)]
pub struct Environment {
    declared: BTreeSet<String>,
}

impl Environment {
    /// Creates an environment from the declared input names.
    #[must_use]
    pub fn new(options: EnvironmentOptions) -> Self {
        Self {
            declared: options.variables.into_iter().collect(),
        }
    }

    /// Compiles an expression source string into an executable [`Program`].
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::Parse`] for invalid syntax and
    /// [`ExprError::UndeclaredVariable`] when the expression references a
    /// root variable outside the declared set.
    pub fn compile(&self, source: &str) -> Result<Program, ExprError> {
        let parsed = hcl_edit::parser::parse_expr(source).map_err(|err| ExprError::Parse {
            expression: source.to_owned(),
            detail: err.to_string(),
        })?;
        let expression = Expression::from(parsed);

        let mut roots = BTreeSet::new();
        collect_roots(&expression, &mut roots);
        for root in &roots {
            if !self.declared.contains(root) {
                return Err(ExprError::UndeclaredVariable {
                    expression: source.to_owned(),
                    variable: root.clone(),
                });
            }
        }

        Ok(Program {
            source: source.to_owned(),
            expression,
        })
    }
}

/// A compiled expression, ready to run against concrete input values.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expression: Expression,
}

impl Program {
    /// The original expression source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the program with each `(name, value)` pair bound as an
    /// input variable.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::MissingKey`] when a traversal reaches for a key
    /// the bound value does not carry, and [`ExprError::Eval`] for every
    /// other evaluation failure.
    pub fn eval<'a, I>(&self, inputs: I) -> Result<hcl::Value, ExprError>
    where
        I: IntoIterator<Item = (&'a str, &'a JsonValue)>,
    {
        let mut context = Context::new();
        for (name, value) in inputs {
            context.declare_var(Identifier::sanitized(name), to_eval_value(value));
        }
        self.expression
            .evaluate(&context)
            .map_err(|error| classify_eval_errors(&self.source, &hcl::eval::Errors::from(error)))
    }
}

/// Maps evaluator failures onto [`ExprError`]. The single place where the
/// recoverable missing-key case is told apart from terminal failures.
fn classify_eval_errors(expression: &str, errors: &hcl::eval::Errors) -> ExprError {
    for error in errors.iter() {
        if let hcl::eval::ErrorKind::NoSuchKey(key) = error.kind() {
            return ExprError::MissingKey {
                expression: expression.to_owned(),
                key: key.clone(),
            };
        }
    }
    ExprError::Eval {
        expression: expression.to_owned(),
        detail: errors.to_string(),
    }
}

/// Lowers an evaluator-typed value to a native JSON value.
///
/// # Errors
///
/// Returns [`ExprError::Convert`] for values JSON cannot represent
/// (non-finite numbers).
pub fn to_native(value: hcl::Value) -> Result<JsonValue, ExprError> {
    match value {
        hcl::Value::Null => Ok(JsonValue::Null),
        hcl::Value::Bool(flag) => Ok(JsonValue::Bool(flag)),
        hcl::Value::Number(number) => to_native_number(&number),
        hcl::Value::String(text) => Ok(JsonValue::String(text)),
        hcl::Value::Array(items) => items
            .into_iter()
            .map(to_native)
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        hcl::Value::Object(entries) => {
            let mut object = serde_json::Map::with_capacity(entries.len());
            for (key, entry) in entries {
                object.insert(key, to_native(entry)?);
            }
            Ok(JsonValue::Object(object))
        }
    }
}

fn to_native_number(number: &hcl::Number) -> Result<JsonValue, ExprError> {
    if let Some(int) = number.as_i64() {
        return Ok(JsonValue::Number(int.into()));
    }
    if let Some(int) = number.as_u64() {
        return Ok(JsonValue::Number(int.into()));
    }
    number
        .as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(JsonValue::Number)
        .ok_or_else(|| ExprError::Convert {
            detail: format!("number {number} has no JSON representation"),
        })
}

/// Lifts a native JSON value into the evaluator's value space.
fn to_eval_value(value: &JsonValue) -> hcl::Value {
    match value {
        JsonValue::Null => hcl::Value::Null,
        JsonValue::Bool(flag) => hcl::Value::Bool(*flag),
        JsonValue::Number(number) => to_eval_number(number),
        JsonValue::String(text) => hcl::Value::String(text.clone()),
        JsonValue::Array(items) => hcl::Value::Array(items.iter().map(to_eval_value).collect()),
        JsonValue::Object(entries) => hcl::Value::Object(
            entries
                .iter()
                .map(|(key, entry)| (key.clone(), to_eval_value(entry)))
                .collect(),
        ),
    }
}

fn to_eval_number(number: &serde_json::Number) -> hcl::Value {
    if let Some(int) = number.as_i64() {
        return hcl::Number::from(int).into();
    }
    if let Some(int) = number.as_u64() {
        return hcl::Number::from(int).into();
    }
    number
        .as_f64()
        .and_then(hcl::Number::from_f64)
        .map_or(hcl::Value::Null, Into::into)
}

/// Collects the root variable names an expression references.
fn collect_roots(expression: &Expression, roots: &mut BTreeSet<String>) {
    match expression {
        Expression::Variable(variable) => {
            roots.insert(variable.as_str().to_owned());
        }
        Expression::Traversal(traversal) => {
            collect_roots(&traversal.expr, roots);
            for operator in &traversal.operators {
                if let TraversalOperator::Index(index) = operator {
                    collect_roots(index, roots);
                }
            }
        }
        Expression::Array(items) => {
            for item in items {
                collect_roots(item, roots);
            }
        }
        Expression::Object(object) => {
            for entry in object.values() {
                collect_roots(entry, roots);
            }
        }
        Expression::Parenthesis(inner) => collect_roots(inner, roots),
        Expression::Conditional(conditional) => {
            collect_roots(&conditional.cond_expr, roots);
            collect_roots(&conditional.true_expr, roots);
            collect_roots(&conditional.false_expr, roots);
        }
        Expression::Operation(operation) => match operation.as_ref() {
            Operation::Binary(binary) => {
                collect_roots(&binary.lhs_expr, roots);
                collect_roots(&binary.rhs_expr, roots);
            }
            Operation::Unary(unary) => collect_roots(&unary.expr, roots),
        },
        Expression::FuncCall(call) => {
            for argument in &call.args {
                collect_roots(argument, roots);
            }
        }
        Expression::TemplateExpr(template_expr) => {
            if let Ok(template) = Template::from_expr(template_expr) {
                collect_template_roots(&template, roots);
            }
        }
        Expression::ForExpr(for_expr) => {
            collect_roots(&for_expr.collection_expr, roots);
            // loop variables are locals, not environment inputs
            let mut inner = BTreeSet::new();
            if let Some(key_expr) = &for_expr.key_expr {
                collect_roots(key_expr, &mut inner);
            }
            collect_roots(&for_expr.value_expr, &mut inner);
            if let Some(cond_expr) = &for_expr.cond_expr {
                collect_roots(cond_expr, &mut inner);
            }
            inner.remove(for_expr.value_var.as_str());
            if let Some(key_var) = &for_expr.key_var {
                inner.remove(key_var.as_str());
            }
            roots.extend(inner);
        }
        _ => {}
    }
}

fn collect_template_roots(template: &Template, roots: &mut BTreeSet<String>) {
    for element in template.elements() {
        match element {
            Element::Interpolation(interpolation) => collect_roots(&interpolation.expr, roots),
            Element::Directive(Directive::If(directive)) => {
                collect_roots(&directive.cond_expr, roots);
                collect_template_roots(&directive.true_template, roots);
                if let Some(false_template) = &directive.false_template {
                    collect_template_roots(false_template, roots);
                }
            }
            Element::Directive(Directive::For(directive)) => {
                collect_roots(&directive.collection_expr, roots);
                collect_template_roots(&directive.template, roots);
            }
            Element::Literal(_) => {}
        }
    }
}
