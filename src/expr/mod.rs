//! Cell expression language
//!
//! A template field is either a literal string or, when it starts with `=`,
//! an expression such as `=item[A, $row]`. A literal that must begin with `=`
//! is written with a leading `/` (`/=5` is the literal `=5`).

pub mod ast;
pub mod context;
pub mod error;
pub mod eval;
pub mod functions;
mod grammar;
pub mod lexer;
pub mod value;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

pub use ast::{Expr, Variable};
pub use context::{Axis, EntityRelations, EvaluationContext, ItemLookup, ItemTable, NoItems};
pub use error::EvaluationError;
pub use functions::RegexCache;
pub use grammar::parse;
pub use value::{CellRange, CellValue, Value};

use crate::error::ParseError;

static IMPORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"__import__|\bimport(\s+\w|\s*\()").expect("Invalid import regex")
});

/// First import-like construct in `text`, if any
pub fn find_import(text: &str) -> Option<&str> {
    IMPORT_PATTERN.find(text).map(|m| m.as_str())
}

/// Raised when a template field cannot be compiled
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid expression '{source_text}': {}", summarize(.errors))]
pub struct InvalidExpression {
    pub source_text: String,
    pub errors: Vec<ParseError>,
}

impl InvalidExpression {
    /// Render every error against the expression body with ariadne
    pub fn report(&self, filename: &str) -> String {
        let body = self.source_text.strip_prefix('=').unwrap_or(&self.source_text);
        self.errors
            .iter()
            .map(|e| e.format(body, filename))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn summarize(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq)]
enum Compiled {
    Literal(String),
    Expression(Expr),
}

/// A compiled template field, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    source: String,
    compiled: Compiled,
    uses_n: bool,
    uses_qualifier_vars: bool,
}

impl Code {
    /// Original text as written in the template
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.compiled, Compiled::Literal(_))
    }

    pub fn expression(&self) -> Option<&Expr> {
        match &self.compiled {
            Compiled::Expression(e) => Some(e),
            Compiled::Literal(_) => None,
        }
    }

    /// Whether the expression mentions `$n`
    pub fn uses_n(&self) -> bool {
        self.uses_n
    }

    /// Whether the expression mentions `$qrow` or `$qcol`
    pub fn uses_qualifier_vars(&self) -> bool {
        self.uses_qualifier_vars
    }

    pub fn references(&self, var: Variable) -> bool {
        self.expression().is_some_and(|e| e.references(var))
    }

    /// Evaluate, running the `$n` search when the expression needs it
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        if self.uses_n && ctx.vars.n.is_none() {
            iterate_on_n(self, ctx, ctx.n_bound)
        } else {
            evaluate(self, ctx)
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compile a raw template field
pub fn compile(raw: &str) -> Result<Code, InvalidExpression> {
    let invalid = |errors| InvalidExpression {
        source_text: raw.to_string(),
        errors,
    };

    if let Some(construct) = find_import(raw) {
        return Err(invalid(vec![ParseError::forbidden(construct)]));
    }

    let compiled = match raw.strip_prefix('=') {
        Some(body) => Compiled::Expression(parse(body).map_err(invalid)?),
        None => {
            let literal = match raw.strip_prefix("/=") {
                Some(rest) => format!("={}", rest),
                None => raw.to_string(),
            };
            Compiled::Literal(literal)
        }
    };

    let (uses_n, uses_qualifier_vars) = match &compiled {
        Compiled::Expression(e) => (
            e.references(Variable::N),
            e.references(Variable::QRow) || e.references(Variable::QCol),
        ),
        Compiled::Literal(_) => (false, false),
    };

    Ok(Code {
        source: raw.to_string(),
        compiled,
        uses_n,
        uses_qualifier_vars,
    })
}

/// Evaluate once with the variables bound in `ctx`
pub fn evaluate(code: &Code, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    match &code.compiled {
        Compiled::Literal(s) => Ok(Value::Text(s.clone())),
        Compiled::Expression(e) => eval::eval(e, ctx),
    }
}

/// Linear search over `$n = 0, 1, ...` for the first truthy result
///
/// Stops at the first out-of-bounds read. A missing item is treated as a
/// non-match; any other evaluation error aborts the search.
pub fn iterate_on_n(
    code: &Code,
    ctx: &EvaluationContext<'_>,
    upper_bound: Option<usize>,
) -> Result<Value, EvaluationError> {
    let bound = upper_bound.unwrap_or_else(|| ctx.default_n_bound());
    for n in 0..=bound {
        match evaluate(code, &ctx.with_n(n as i64)) {
            Ok(value) if value.is_truthy() => {
                trace!(n, expression = %code, "n search matched");
                return Ok(value);
            }
            Ok(_) | Err(EvaluationError::ItemNotFound { .. }) => {}
            Err(e) if e.is_out_of_bounds() => break,
            Err(e) => return Err(e),
        }
    }
    Err(EvaluationError::NoMatch { bound })
}
