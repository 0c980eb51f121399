//! Knowledge graph generation over a whole region

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::provider::BulkQuery;
use crate::region::RegionError;
use crate::session::Session;
use crate::template::{get_cell_statement, CellErrors, Statement, StatementMapping};

/// Statements and per-cell errors, keyed by A1 cell label in region order
///
/// A cell whose statement was built with non-fatal errors appears in both maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeGraph {
    pub statements: IndexMap<String, Statement>,
    pub errors: IndexMap<String, CellErrors>,
}

impl KnowledgeGraph {
    /// Evaluate `mapping` for every cell of its region
    ///
    /// Property types are looked up inside one bulk scope. Only a region that
    /// cannot be resolved fails the whole run.
    pub fn generate(mapping: &StatementMapping, session: &Session<'_>) -> Result<Self, RegionError> {
        let _bulk = BulkQuery::new(session.provider);
        let region = session.regions().resolve(&mapping.region, &session.context())?;

        let mut graph = Self::default();
        for cell in region.iter() {
            let label = cell.label();
            match get_cell_statement(&mapping.template, session, cell.col, cell.row) {
                Ok((statement, errors)) => {
                    if !errors.is_empty() {
                        graph.errors.insert(label.clone(), errors);
                    }
                    graph.statements.insert(label, statement);
                }
                Err(e) => {
                    debug!(cell = %e.cell, error = %e, "template did not apply");
                    graph.errors.insert(e.cell, e.errors);
                }
            }
        }
        info!(
            sheet = session.sheet.name(),
            cells = region.len(),
            statements = graph.statements.len(),
            errors = graph.errors.len(),
            "generated knowledge graph"
        );
        Ok(graph)
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ItemTable;
    use crate::provider::{CachingProvider, DictionaryProvider, PropertyType, PropertyTypeProvider};
    use crate::sheet::MemorySheet;

    #[test]
    fn test_failed_cells_do_not_abort_sheet() {
        let sheet = MemorySheet::from_rows("s", vec![vec!["1"], vec!["x"], vec!["3"]]);
        let items = ItemTable::new();
        let provider = CachingProvider::new(DictionaryProvider::new().with_entry("P1", PropertyType::Quantity));
        let session = Session::new(&sheet, &items, &provider);
        let mapping = StatementMapping::from_yaml(
            "statementMapping:\n  region:\n    range: A1:A3\n  template:\n    subject: Q1\n    property: P1\n    value: =value[A, $row]\n",
        )
        .unwrap();

        let graph = KnowledgeGraph::generate(&mapping, &session).unwrap();
        assert_eq!(graph.statements.keys().collect::<Vec<_>>(), vec!["A1", "A3"]);
        assert!(graph.errors["A2"].contains_key("value"));
        assert!(!provider.in_bulk());
        assert_eq!(provider.cached(), 1);
        assert!(provider.get_property_type("P1").is_ok());
    }

    #[test]
    fn test_unresolvable_region_fails() {
        let sheet = MemorySheet::from_rows("s", vec![vec!["1"]]);
        let items = ItemTable::new();
        let provider = DictionaryProvider::new();
        let session = Session::new(&sheet, &items, &provider);
        let mapping = StatementMapping::from_yaml(
            "statementMapping:\n  region:\n    left: 3\n    right: 1\n  template:\n    property: P1\n    value: x\n",
        )
        .unwrap();
        let err = KnowledgeGraph::generate(&mapping, &session).unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
