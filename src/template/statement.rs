//! Evaluating a template for one cell
//!
//! Each field is evaluated on its own and failures are collected in a
//! [`CellErrors`] map keyed by field path (`value`, `qualifier[0].unit`).
//! Only failures on the load-bearing fields (property, value, and the subject
//! of the top-level statement) discard a node.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use super::calendar::{ethiopian_to_gregorian, CalendarPolicy, ETHIOPIAN_CALENDAR, GREGORIAN_CALENDAR};
use super::mapping::NodeTemplate;
use crate::expr::value::parse_finite;
use crate::expr::{Code, EvaluationContext, Value};
use crate::provider::PropertyType;
use crate::session::Session;
use crate::sheet::Coordinate;

/// Field path -> error message for one cell
pub type CellErrors = IndexMap<String, String>;

/// A template field failed on a load-bearing field; the cell has no statement
#[derive(Debug, Clone, PartialEq, Error)]
#[error("template did not apply to {cell}: {}", summarize(.errors))]
pub struct TemplateDidNotApply {
    pub cell: String,
    pub errors: CellErrors,
}

fn summarize(errors: &CellErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One evaluated property/value pair with its type-specific fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Node {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Date format that matched the value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Free-form template fields (`time_zone`, `globe`, ...)
    #[serde(flatten)]
    pub additional_fields: IndexMap<String, String>,
    /// Cell the value was read from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
}

/// A top-level statement for one region cell
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statement {
    pub subject: Option<String>,
    #[serde(flatten)]
    pub node: Node,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qualifier: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<Node>,
}

/// Outcome of evaluating one node template
struct Evaluated {
    node: Node,
    fatal: bool,
    /// Gregorian siblings added by the `add` calendar policy
    siblings: Vec<Node>,
}

/// Evaluate `template` for the region cell at 1-indexed `(col, row)`
///
/// Returns the statement together with any non-fatal field errors. A
/// qualifier or reference whose own property or value failed is left out and
/// its errors are reported.
pub fn get_cell_statement(
    template: &NodeTemplate,
    session: &Session<'_>,
    col: usize,
    row: usize,
) -> Result<(Statement, CellErrors), TemplateDidNotApply> {
    let cell = Coordinate::new(col, row).label();
    let ctx = session.context().at(col, row);
    let mut errors = CellErrors::new();

    let subject = match &template.subject {
        Some(code) => text_field(code, &ctx, "subject", &mut errors),
        None => {
            errors.insert("subject".to_string(), "no subject in template".to_string());
            None
        }
    };
    let subject_failed = subject.is_none();
    if subject_failed && !errors.contains_key("subject") {
        errors.insert("subject".to_string(), "subject is empty".to_string());
    }

    let main = evaluate_node(template, session, &ctx, "", &mut errors);
    if main.fatal || subject_failed {
        return Err(TemplateDidNotApply { cell, errors });
    }

    let mut qualifiers = main.siblings;
    for (i, qualifier) in template.qualifiers.iter().enumerate() {
        let path = format!("qualifier[{}]", i);
        match &qualifier.region {
            None => push_node(&mut qualifiers, evaluate_node(qualifier, session, &ctx, &path, &mut errors)),
            Some(spec) => match session.regions().resolve(spec, &ctx) {
                Ok(region) => {
                    for q in region.iter() {
                        let qctx = ctx.with_qualifier(q.col, q.row);
                        let path = format!("{}({})", path, q.label());
                        push_node(&mut qualifiers, evaluate_node(qualifier, session, &qctx, &path, &mut errors));
                    }
                }
                Err(e) => {
                    errors.insert(format!("{}.region", path), e.to_string());
                }
            },
        }
    }

    let mut references = Vec::new();
    for (i, reference) in template.references.iter().enumerate() {
        let path = format!("reference[{}]", i);
        push_node(&mut references, evaluate_node(reference, session, &ctx, &path, &mut errors));
    }

    let mut node = main.node;
    node.cell = Some(cell);
    trace!(cell = ?node.cell, errors = errors.len(), "statement built");
    Ok((
        Statement {
            subject,
            node,
            qualifier: qualifiers,
            reference: references,
        },
        errors,
    ))
}

fn push_node(list: &mut Vec<Node>, evaluated: Evaluated) {
    if !evaluated.fatal {
        list.push(evaluated.node);
        list.extend(evaluated.siblings);
    }
}

fn field_key(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

/// Evaluate a field to text; empty results count as absent
fn text_field(code: &Code, ctx: &EvaluationContext<'_>, key: &str, errors: &mut CellErrors) -> Option<String> {
    evaluate_field(code, ctx, key, errors).map(|(text, _)| text)
}

fn evaluate_field(
    code: &Code,
    ctx: &EvaluationContext<'_>,
    key: &str,
    errors: &mut CellErrors,
) -> Option<(String, Option<Coordinate>)> {
    match code.evaluate(ctx) {
        Ok(Value::Range(_)) => {
            errors.insert(key.to_string(), "expected a single value, found a range".to_string());
            None
        }
        Ok(value) => {
            let text = value.to_string();
            let text = text.trim();
            (!text.is_empty()).then(|| (text.to_string(), value.origin()))
        }
        Err(e) => {
            errors.insert(key.to_string(), e.to_string());
            None
        }
    }
}

fn evaluate_node(
    template: &NodeTemplate,
    session: &Session<'_>,
    ctx: &EvaluationContext<'_>,
    path: &str,
    errors: &mut CellErrors,
) -> Evaluated {
    let mut node = Node::default();
    let mut fatal = false;
    let optional = |code: &Option<Code>, field: &str, errors: &mut CellErrors| {
        code.as_ref()
            .and_then(|c| text_field(c, ctx, &field_key(path, field), errors))
    };

    let property_key = field_key(path, "property");
    node.property = optional(&template.property, "property", errors);
    if node.property.is_none() {
        errors.entry(property_key.clone()).or_insert_with(|| "property is empty".to_string());
        fatal = true;
    }

    let value_key = field_key(path, "value");
    if let Some(code) = &template.value {
        match evaluate_field(code, ctx, &value_key, errors) {
            Some((text, origin)) => {
                node.value = Some(text);
                node.cell = origin.map(|c| c.label());
            }
            None => {
                errors.entry(value_key.clone()).or_insert_with(|| "value is empty".to_string());
                fatal = true;
            }
        }
    }

    node.unit = optional(&template.unit, "unit", errors);
    node.latitude = optional(&template.latitude, "latitude", errors);
    node.longitude = optional(&template.longitude, "longitude", errors);
    node.precision = optional(&template.precision, "precision", errors);
    node.calendar = optional(&template.calendar, "calendar", errors);
    node.lang = optional(&template.lang, "lang", errors);
    for (field, code) in &template.additional_fields {
        if let Some(text) = text_field(code, ctx, &field_key(path, field), errors) {
            node.additional_fields.insert(field.clone(), text);
        }
    }
    let formats: Vec<String> = template
        .format
        .iter()
        .filter_map(|c| text_field(c, ctx, &field_key(path, "format"), errors))
        .collect();

    let mut siblings = Vec::new();
    if let Some(property) = node.property.clone() {
        match session.provider.get_property_type(&property) {
            Ok(data_type) => {
                let valid = check_value(&mut node, data_type, &formats, session, path, errors);
                if !valid {
                    fatal = true;
                }
                if valid && data_type == PropertyType::Time && node.calendar.as_deref() == Some(ETHIOPIAN_CALENDAR) {
                    if let Some(sibling) = apply_calendar_policy(&mut node, session.config.calendar_policy, path, errors) {
                        siblings.push(sibling);
                    }
                }
            }
            Err(e) => {
                errors.insert(property_key, e.to_string());
                fatal = true;
            }
        }
    }

    Evaluated { node, fatal, siblings }
}

/// Type-specific value check; returns false when the value is unusable
fn check_value(
    node: &mut Node,
    data_type: PropertyType,
    formats: &[String],
    session: &Session<'_>,
    path: &str,
    errors: &mut CellErrors,
) -> bool {
    let value_key = field_key(path, "value");
    match data_type {
        PropertyType::GlobeCoordinate => {
            if node.value.is_none() && (node.latitude.is_none() || node.longitude.is_none()) {
                errors.insert(value_key, "globe coordinates need both latitude and longitude".to_string());
                return false;
            }
            for field in ["latitude", "longitude"] {
                let text = if field == "latitude" { &node.latitude } else { &node.longitude };
                if let Some(text) = text {
                    if parse_finite(text).is_none() {
                        errors.insert(field_key(path, field), format!("'{}' is not a number", text));
                        return false;
                    }
                }
            }
            true
        }
        PropertyType::Quantity => match &node.value {
            Some(text) if parse_finite(text).is_none() => {
                errors.insert(value_key, format!("'{}' is not a number", text));
                false
            }
            Some(_) => true,
            None => {
                errors.entry(value_key).or_insert_with(|| "value is empty".to_string());
                false
            }
        },
        PropertyType::Time => {
            let Some(text) = node.value.clone() else {
                errors.entry(value_key).or_insert_with(|| "value is empty".to_string());
                return false;
            };
            match session.dates().parse(&text, formats) {
                Some(parsed) => {
                    node.value = Some(parsed.iso());
                    node.format = Some(parsed.format.clone());
                    node.precision.get_or_insert_with(|| parsed.precision.code().to_string());
                    true
                }
                // Ethiopian ISO dates may name month 13
                None if node.calendar.as_deref() == Some(ETHIOPIAN_CALENDAR) && ethiopian_to_gregorian(&text).is_ok() => {
                    true
                }
                None => {
                    let tried = if formats.is_empty() {
                        "ISO formats".to_string()
                    } else {
                        formats.join(", ")
                    };
                    errors.insert(value_key, format!("could not parse '{}' as a date (tried {})", text, tried));
                    false
                }
            }
        }
        _ => {
            if node.value.is_none() {
                errors.entry(value_key).or_insert_with(|| "value is empty".to_string());
                return false;
            }
            true
        }
    }
}

fn apply_calendar_policy(node: &mut Node, policy: CalendarPolicy, path: &str, errors: &mut CellErrors) -> Option<Node> {
    if policy == CalendarPolicy::Leave {
        return None;
    }
    let value = node.value.clone()?;
    let gregorian = match ethiopian_to_gregorian(&value) {
        Ok(g) => g,
        Err(e) => {
            errors.insert(field_key(path, "calendar"), e.to_string());
            return None;
        }
    };
    match policy {
        CalendarPolicy::Replace => {
            node.value = Some(gregorian);
            node.calendar = Some(GREGORIAN_CALENDAR.to_string());
            None
        }
        CalendarPolicy::Add => Some(Node {
            property: node.property.clone(),
            value: Some(gregorian),
            precision: node.precision.clone(),
            calendar: Some(GREGORIAN_CALENDAR.to_string()),
            cell: node.cell.clone(),
            ..Node::default()
        }),
        CalendarPolicy::Leave => None,
    }
}
