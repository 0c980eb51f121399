//! Statement mapping documents
//!
//! ```yaml
//! statementMapping:
//!   region:
//!     range: B2:B4
//!   template:
//!     subject: =item[A, $row]
//!     property: P1082
//!     value: =value[B, $row]
//!     qualifier:
//!       - property: P585
//!         value: =value[C, $row]
//! ```
//!
//! The document and region sections reject unknown keys. A template node
//! keeps any other scalar key as a free-form field, unless the key looks like
//! a misspelling of a known one. Field values are compiled once, when the
//! document is loaded.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use super::TemplateError;
use crate::error::{find_similar, DeclarationError};
use crate::expr::{compile, find_import, Code};
use crate::region::{RegionError, RegionSpec};

/// A scalar as written in YAML
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum FieldValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(FieldValue),
    Many(Vec<FieldValue>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingDocument {
    #[serde(rename = "statementMapping")]
    statement_mapping: StatementDocument,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatementDocument {
    region: RegionSpec,
    template: NodeDocument,
}

/// Keys a template node understands; anything else is a free-form field
const NODE_KEYS: &[&str] = &[
    "subject",
    "item",
    "property",
    "value",
    "unit",
    "latitude",
    "longitude",
    "precision",
    "calendar",
    "lang",
    "format",
    "qualifier",
    "reference",
    "region",
    "cell",
];

#[derive(Debug, Default, Deserialize)]
struct NodeDocument {
    #[serde(alias = "item")]
    subject: Option<FieldValue>,
    property: Option<FieldValue>,
    value: Option<FieldValue>,
    unit: Option<FieldValue>,
    latitude: Option<FieldValue>,
    longitude: Option<FieldValue>,
    precision: Option<FieldValue>,
    calendar: Option<FieldValue>,
    lang: Option<FieldValue>,
    format: Option<OneOrMany>,
    qualifier: Option<Vec<NodeDocument>>,
    reference: Option<Vec<NodeDocument>>,
    region: Option<RegionSpec>,
    /// Free-form fields such as `time_zone` or `globe`
    #[serde(flatten)]
    extra: IndexMap<String, serde_yaml::Value>,
}

/// Where a node sits in the template; decides which keys it may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Statement,
    Qualifier,
    Reference,
}

/// Compiled template for one node (statement, qualifier or reference)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTemplate {
    pub subject: Option<Code>,
    pub property: Option<Code>,
    pub value: Option<Code>,
    pub unit: Option<Code>,
    pub latitude: Option<Code>,
    pub longitude: Option<Code>,
    pub precision: Option<Code>,
    pub calendar: Option<Code>,
    pub lang: Option<Code>,
    pub format: Vec<Code>,
    /// Free-form fields, evaluated into the node's additional fields
    pub additional_fields: IndexMap<String, Code>,
    pub qualifiers: Vec<NodeTemplate>,
    pub references: Vec<NodeTemplate>,
    /// Qualifier region; each of its cells yields one qualifier node
    pub region: Option<RegionSpec>,
}

/// A loaded `statementMapping` document
#[derive(Debug, Clone, PartialEq)]
pub struct StatementMapping {
    pub region: RegionSpec,
    pub template: NodeTemplate,
}

impl StatementMapping {
    /// Load a mapping from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Load a mapping from YAML text
    ///
    /// The raw text is screened for import-like constructs before parsing.
    pub fn from_yaml(content: &str) -> Result<Self, DeclarationError> {
        if let Some(construct) = find_import(content) {
            return Err(DeclarationError::Forbidden {
                construct: construct.to_string(),
            });
        }
        let document: MappingDocument = serde_yaml::from_str(content)
            .map_err(|e| DeclarationError::from_serde("statementMapping", &e.to_string()))?;
        let StatementDocument { region, template } = document.statement_mapping;
        region.validate().map_err(|e| match e {
            RegionError::Declaration(d) => d,
            other => DeclarationError::invalid("region", other.to_string()),
        })?;
        let template = compile_node("template", template, NodeKind::Statement)?;
        Ok(Self { region, template })
    }
}

fn compile_field(section: &str, key: &str, value: Option<FieldValue>) -> Result<Option<Code>, DeclarationError> {
    value
        .map(|v| {
            compile(&v.to_string()).map_err(|e| DeclarationError::expression(format!("{}.{}", section, key), e))
        })
        .transpose()
}

/// Compile free-form fields; a key one or two edits from a known key is a typo
fn compile_extra(
    section: &str,
    extra: IndexMap<String, serde_yaml::Value>,
) -> Result<IndexMap<String, Code>, DeclarationError> {
    let mut fields = IndexMap::new();
    for (key, value) in extra {
        let suggestions = find_similar(NODE_KEYS.iter().copied(), &key, 2);
        if !suggestions.is_empty() {
            return Err(DeclarationError::UnknownKey {
                section: section.to_string(),
                key,
                suggestions,
            });
        }
        if NODE_KEYS.contains(&key.as_str()) {
            return Err(DeclarationError::invalid(
                format!("{}.{}", section, key),
                "this key is reserved",
            ));
        }
        let raw = match value {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(DeclarationError::invalid(
                    format!("{}.{}", section, key),
                    "free-form fields must be scalars",
                ))
            }
        };
        let code = compile(&raw).map_err(|e| DeclarationError::expression(format!("{}.{}", section, key), e))?;
        fields.insert(key, code);
    }
    Ok(fields)
}

fn compile_node(section: &str, doc: NodeDocument, kind: NodeKind) -> Result<NodeTemplate, DeclarationError> {
    if doc.property.is_none() {
        return Err(DeclarationError::missing(section, "property"));
    }
    if doc.value.is_none() && (doc.latitude.is_none() || doc.longitude.is_none()) {
        return Err(DeclarationError::missing(section, "value"));
    }
    if kind != NodeKind::Qualifier && doc.region.is_some() {
        return Err(DeclarationError::invalid(
            section,
            "'region' is only allowed on qualifiers",
        ));
    }
    if kind != NodeKind::Statement && (doc.qualifier.is_some() || doc.reference.is_some()) {
        return Err(DeclarationError::invalid(
            section,
            "only the top-level template may declare qualifiers or references",
        ));
    }
    if let Some(region) = &doc.region {
        region.validate().map_err(|e| match e {
            RegionError::Declaration(d) => d,
            other => DeclarationError::invalid(format!("{}.region", section), other.to_string()),
        })?;
    }

    let format = match doc.format {
        None => Vec::new(),
        Some(OneOrMany::One(v)) => vec![v],
        Some(OneOrMany::Many(vs)) => vs,
    }
    .into_iter()
    .map(|v| compile_field(section, "format", Some(v)))
    .filter_map(Result::transpose)
    .collect::<Result<Vec<_>, _>>()?;

    let children = |key: &str, nodes: Option<Vec<NodeDocument>>, kind: NodeKind| {
        nodes
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, node)| compile_node(&format!("{}[{}]", key, i), node, kind))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(NodeTemplate {
        subject: compile_field(section, "subject", doc.subject)?,
        property: compile_field(section, "property", doc.property)?,
        value: compile_field(section, "value", doc.value)?,
        unit: compile_field(section, "unit", doc.unit)?,
        latitude: compile_field(section, "latitude", doc.latitude)?,
        longitude: compile_field(section, "longitude", doc.longitude)?,
        precision: compile_field(section, "precision", doc.precision)?,
        calendar: compile_field(section, "calendar", doc.calendar)?,
        lang: compile_field(section, "lang", doc.lang)?,
        format,
        additional_fields: compile_extra(section, doc.extra)?,
        qualifiers: children("qualifier", doc.qualifier, NodeKind::Qualifier)?,
        references: children("reference", doc.reference, NodeKind::Reference)?,
        region: doc.region,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MAPPING: &str = r#"
statementMapping:
  region:
    range: B2:B4
  template:
    subject: =item[A, $row]
    property: P1082
    value: =value[B, $row]
    qualifier:
      - property: P585
        value: 2020
        format: "%Y"
"#;

    #[test]
    fn test_load_mapping() {
        let mapping = StatementMapping::from_yaml(MAPPING).unwrap();
        assert_eq!(mapping.region.range.as_deref(), Some("B2:B4"));
        assert_eq!(mapping.template.property.as_ref().unwrap().source(), "P1082");
        assert!(!mapping.template.value.as_ref().unwrap().is_literal());
        let qualifier = &mapping.template.qualifiers[0];
        assert_eq!(qualifier.value.as_ref().unwrap().source(), "2020");
        assert_eq!(qualifier.format.len(), 1);
    }

    #[test]
    fn test_unknown_key_suggests() {
        let err = StatementMapping::from_yaml(&MAPPING.replace("subject:", "subjet:")).unwrap_err();
        match err {
            DeclarationError::UnknownKey { key, suggestions, .. } => {
                assert_eq!(key, "subjet");
                assert_eq!(suggestions, vec!["subject".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_item_is_the_subject_key() {
        let mapping = StatementMapping::from_yaml(&MAPPING.replace("subject:", "item:")).unwrap();
        assert_eq!(mapping.template.subject.as_ref().unwrap().source(), "=item[A, $row]");
    }

    #[test]
    fn test_free_form_fields() {
        let yaml = MAPPING.replace(
            "    property: P1082\n",
            "    property: P1082\n    source: =value[D, 1]\n    time_zone: 0\n    remark: ~\n",
        );
        let mapping = StatementMapping::from_yaml(&yaml).unwrap();
        let fields: Vec<(&str, &str)> = mapping
            .template
            .additional_fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.source()))
            .collect();
        assert_eq!(fields, vec![("source", "=value[D, 1]"), ("time_zone", "0")]);
        assert!(mapping.template.qualifiers[0].additional_fields.is_empty());
    }

    #[test]
    fn test_free_form_fields_must_be_scalars() {
        let yaml = MAPPING.replace("    property: P1082\n", "    property: P1082\n    source: [a, b]\n");
        assert!(matches!(
            StatementMapping::from_yaml(&yaml),
            Err(DeclarationError::Invalid { section, .. }) if section == "template.source"
        ));
        let yaml = MAPPING.replace("    property: P1082\n", "    property: P1082\n    cell: B2\n");
        assert!(matches!(
            StatementMapping::from_yaml(&yaml),
            Err(DeclarationError::Invalid { .. })
        ));
    }

    #[test]
    fn test_null_property_is_missing() {
        let err = StatementMapping::from_yaml(&MAPPING.replace("property: P1082", "property: # todo")).unwrap_err();
        assert_eq!(err, DeclarationError::missing("template", "property"));
    }

    #[test]
    fn test_globe_coordinates_replace_value() {
        let yaml = r#"
statementMapping:
  region:
    range: C2:C3
  template:
    property: P625
    latitude: =value[C, $row]
    longitude: =value[D, $row]
"#;
        assert!(StatementMapping::from_yaml(yaml).is_ok());
    }

    #[test]
    fn test_region_only_on_qualifiers() {
        let yaml = MAPPING.replace("    subject: =item[A, $row]\n", "    region:\n      range: A1\n");
        assert!(matches!(
            StatementMapping::from_yaml(&yaml),
            Err(DeclarationError::Invalid { .. })
        ));
    }

    #[test]
    fn test_import_rejected_before_parsing() {
        let yaml = MAPPING.replace("=item[A, $row]", "=__import__('os')");
        assert!(matches!(
            StatementMapping::from_yaml(&yaml),
            Err(DeclarationError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_bad_expression_names_field() {
        let yaml = MAPPING.replace("=value[B, $row]", "=value[B, $row");
        match StatementMapping::from_yaml(&yaml) {
            Err(DeclarationError::Expression { field, .. }) => assert_eq!(field, "template.value"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
