//! Template inference from an annotation
//!
//! The data block becomes the mapping region. Every other linked block turns
//! into a cell reference relative to the statement cell: a block sharing the
//! data block's rows is read at a fixed column and `$row`, a block sharing its
//! columns at `$col` and a fixed row. A block that lines up with neither is
//! left as a placeholder comment for the user to fill in.

use std::fmt::Write as _;

use serde_json::Value as Json;
use tracing::debug;

use super::TemplateError;
use crate::annotation::{Alignment, Annotation, Block, Rect, Role};
use crate::config::GenerationConfig;
use crate::provider::PropertyType;
use crate::sheet::column_letter;

/// First line of every inferred template
pub const HEADER: &str = "#AUTO-GENERATED YAML";

/// A cell reference relative to the statement cell
enum Reference {
    /// `B, $row`
    Scalar(String),
    /// `D:F, $row`, covering `len` cells
    Span(String, usize),
}

fn reference(source: &Rect, data: &Rect) -> Option<Reference> {
    if source.is_single_cell() {
        return Some(Reference::Scalar(format!("{}, {}", column_letter(source.x1), source.y1)));
    }
    match source.alignment(data) {
        Alignment::Row if source.width() == 1 => {
            Some(Reference::Scalar(format!("{}, $row", column_letter(source.x1))))
        }
        Alignment::Row => Some(Reference::Span(
            format!("{}:{}, $row", column_letter(source.x1), column_letter(source.x2)),
            source.width(),
        )),
        Alignment::Column if source.height() == 1 => Some(Reference::Scalar(format!("$col, {}", source.y1))),
        Alignment::Column => Some(Reference::Span(format!("$col, {}:{}", source.y1, source.y2), source.height())),
        Alignment::Misaligned => None,
    }
}

/// Expression reading `block` for the statement cell, or why there is none
fn block_expression(block: &Block, data: &Block) -> Result<(String, Option<&'static str>), String> {
    let as_item = matches!(block.role, Role::Property | Role::MainSubject | Role::Unit)
        || block.value_type.is_some_and(|t| t.is_entity());
    let reference = if block.id == data.id {
        Reference::Scalar("$col, $row".to_string())
    } else {
        reference(&block.rect, &data.rect).ok_or_else(|| {
            format!(
                "cannot resolve {} ({}): it is not aligned with the data block ({})",
                block.id,
                block.rect.label(),
                data.rect.label()
            )
        })?
    };
    match reference {
        Reference::Scalar(r) if as_item => Ok((format!("=item[{}]", r), None)),
        Reference::Scalar(r) if block.is_quantity() => Ok((format!("=make_numeric(value[{}])", r), None)),
        Reference::Scalar(r) => Ok((format!("=value[{}]", r), None)),
        Reference::Span(r, len) if block.value_type == Some(PropertyType::Time) && (2..=3).contains(&len) => {
            let format = if len == 3 { "%Y/%m/%d" } else { "%Y/%m" };
            Ok((format!("=concat(value[{}], \"/\")", r), Some(format)))
        }
        Reference::Span(..) => Err(format!(
            "cannot resolve {} ({}): multi-cell spans have no single value",
            block.id,
            block.rect.label()
        )),
    }
}

/// Quote a string for YAML when a plain scalar would change its meaning
pub fn yaml_scalar(s: &str) -> String {
    const INDICATORS: &str = "-?:,[]{}#&*!|>'\"%@`";
    let lowered = s.to_ascii_lowercase();
    let plain = !s.is_empty()
        && !s.starts_with(|c: char| INDICATORS.contains(c) || c.is_whitespace())
        && !s.ends_with(|c: char| c == ':' || c.is_whitespace())
        && !s.contains(": ")
        && !s.contains(" #")
        && !s.contains('\n')
        && !matches!(lowered.as_str(), "true" | "false" | "yes" | "no" | "on" | "off" | "null" | "~")
        && s.parse::<f64>().is_err();
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "''"))
    }
}

fn json_scalar(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(yaml_scalar(s)),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

struct Writer {
    out: String,
}

impl Writer {
    fn line(&mut self, indent: usize, text: &str) {
        let _ = writeln!(self.out, "{:width$}{}", "", text, width = indent);
    }

    fn field(&mut self, indent: usize, key: &str, value: &str) {
        self.line(indent, &format!("{}: {}", key, value));
    }

    fn placeholder(&mut self, indent: usize, key: &str, comment: &str) {
        self.line(indent, &format!("{}: # {}", key, comment));
    }

    /// Extra annotation keys, copied as template fields
    fn passthrough(&mut self, indent: usize, block: &Block, skip: &[&str]) {
        for (key, value) in &block.extra {
            if skip.contains(&key.as_str()) || value.is_null() {
                continue;
            }
            let key = yaml_scalar(key);
            let rendered = match value {
                Json::Array(items) => items
                    .iter()
                    .map(|v| match v {
                        Json::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
                        other => json_scalar(other),
                    })
                    .collect::<Option<Vec<_>>>()
                    .map(|items| format!("[{}]", items.join(", "))),
                other => json_scalar(other),
            };
            match rendered {
                Some(text) => self.field(indent, &key, &text),
                None => self.line(indent, &format!("# {}: could not be templated (unsupported value {})", key, value)),
            }
        }
    }
}

/// Infer a mapping template from `annotation`
///
/// Initializes the annotation if that has not happened yet. Assignment notes
/// are emitted as comments under the header.
pub fn generate_yaml(annotation: &mut Annotation, config: &GenerationConfig) -> Result<String, TemplateError> {
    annotation.initialize(config);
    let annotation = &*annotation;
    let data = annotation.data_block().ok_or(TemplateError::NoDataBlock)?;

    let mut w = Writer { out: String::new() };
    w.line(0, HEADER);
    for note in annotation.notes() {
        w.line(0, &format!("# {}", note));
    }
    w.line(0, "statementMapping:");
    w.line(2, "region:");
    w.field(4, "range", &data.rect.label());
    w.line(2, "template:");

    match annotation.linked(data, Role::MainSubject) {
        Some(subject) => match block_expression(subject, data) {
            Ok((expr, _)) => w.field(4, "subject", &yaml_scalar(&expr)),
            Err(reason) => w.placeholder(4, "subject", &reason),
        },
        None => match data.extra.get("subject").and_then(json_scalar) {
            Some(constant) => w.field(4, "subject", &constant),
            None => w.placeholder(4, "subject", "no mainSubject block is linked to the data block"),
        },
    }
    write_node(&mut w, 4, annotation, data, data);

    let qualifiers = annotation.qualifier_blocks();
    if !qualifiers.is_empty() {
        w.line(4, "qualifier:");
        for qualifier in qualifiers {
            let start = w.out.len();
            write_node(&mut w, 8, annotation, qualifier, data);
            // First line of the entry carries the list marker
            w.out.replace_range(start..start + 8, "      - ");
        }
    }
    debug!(data = %data.id, lines = w.out.lines().count(), "generated template");
    Ok(w.out)
}

/// `property`, `value`, `unit` and passthrough keys for one target block
fn write_node(w: &mut Writer, indent: usize, annotation: &Annotation, block: &Block, data: &Block) {
    match annotation.linked(block, Role::Property) {
        Some(property) => match block_expression(property, data) {
            Ok((expr, _)) => w.field(indent, "property", &yaml_scalar(&expr)),
            Err(reason) => w.placeholder(indent, "property", &reason),
        },
        None => match &block.property {
            Some(constant) => w.field(indent, "property", &yaml_scalar(constant)),
            None => w.placeholder(indent, "property", &format!("no property block is linked to {}", block.id)),
        },
    }

    let mut skip = vec!["subject", "value", "unit"];
    match block_expression(block, data) {
        Ok((expr, format)) => {
            w.field(indent, "value", &yaml_scalar(&expr));
            if let Some(format) = format {
                w.field(indent, "format", &yaml_scalar(format));
                skip.push("format");
            }
        }
        Err(reason) => w.placeholder(indent, "value", &reason),
    }

    match annotation.linked(block, Role::Unit) {
        Some(unit) => match block_expression(unit, data) {
            Ok((expr, _)) => w.field(indent, "unit", &yaml_scalar(&expr)),
            Err(reason) => w.placeholder(indent, "unit", &reason),
        },
        None => {
            if let Some(constant) = block.extra.get("unit").and_then(json_scalar) {
                w.field(indent, "unit", &constant);
            }
        }
    }
    w.passthrough(indent, block, &skip);
}
