//! T2WML - spreadsheet to knowledge graph statements
//!
//! This library provides the cell expression language, the region resolver,
//! the annotation-to-template compiler and the per-cell statement builder.
//!
//! # Example
//!
//! ```rust
//! use t2wml::{generate, DictionaryProvider, ItemTable, MemorySheet, PropertyType, Session};
//!
//! let sheet = MemorySheet::from_rows("data", vec![vec!["Peru", "33"], vec!["Chile", "19"]]);
//! let mut items = ItemTable::new();
//! items.insert_value("", "Peru", "Q419");
//! items.insert_value("", "Chile", "Q298");
//! let provider = DictionaryProvider::new().with_entry("P1082", PropertyType::Quantity);
//! let session = Session::new(&sheet, &items, &provider);
//!
//! let mapping = "
//! statementMapping:
//!   region:
//!     range: B1:B2
//!   template:
//!     subject: =item[A, $row]
//!     property: P1082
//!     value: =value[$col, $row]
//! ";
//! let graph = generate(mapping, &session).unwrap();
//! assert_eq!(graph.statements["B2"].subject.as_deref(), Some("Q298"));
//! ```

pub mod annotation;
pub mod config;
pub mod datetime;
pub mod error;
pub mod expr;
pub mod graph;
pub mod provider;
pub mod region;
pub mod session;
pub mod settings;
pub mod sheet;
pub mod template;

pub use annotation::{Annotation, AnnotationError, Block, Rect, Role};
pub use config::GenerationConfig;
pub use error::{DeclarationError, ParseError};
pub use expr::{compile, Code, EvaluationContext, EvaluationError, ItemLookup, ItemTable, Value};
pub use graph::KnowledgeGraph;
pub use provider::{CachingProvider, DictionaryProvider, PropertyType, PropertyTypeProvider, ProviderError};
pub use region::{Region, RegionCache, RegionError, RegionSpec};
pub use session::Session;
pub use settings::{Settings, SettingsError};
pub use sheet::{MemorySheet, Sheet, SheetError};
pub use template::{generate_yaml, CalendarPolicy, Statement, StatementMapping, TemplateError};

use thiserror::Error;

/// Errors that can occur across the generation pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed mapping document
    #[error("declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// Region could not be resolved
    #[error("region error: {0}")]
    Region(#[from] RegionError),

    /// Malformed annotation document
    #[error("annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("property provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Load a mapping from YAML and evaluate it over the session's sheet
pub fn generate(mapping: &str, session: &Session<'_>) -> Result<KnowledgeGraph, Error> {
    let mapping = StatementMapping::from_yaml(mapping)?;
    Ok(KnowledgeGraph::generate(&mapping, session)?)
}

/// Infer a mapping template from an annotation document
pub fn annotate(annotation: &str, config: &GenerationConfig) -> Result<String, Error> {
    let mut annotation = Annotation::from_json(annotation)?;
    Ok(generate_yaml(&mut annotation, config)?)
}
