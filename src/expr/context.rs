//! Evaluation context: the sheet, the item table and the bound coordinates
//!
//! Everything an expression can observe is passed in explicitly; there is no
//! process-wide "current sheet".

use std::collections::{HashMap, HashSet};

use crate::expr::functions::RegexCache;
use crate::sheet::Sheet;

/// Maps a cell's text to a knowledge-base entity id
pub trait ItemLookup: Send + Sync {
    /// Entity for the cell at 1-indexed `(col, row)` holding `value`
    fn lookup(&self, col: usize, row: usize, context: &str, value: &str) -> Option<String>;
}

/// Class membership in the external knowledge base
pub trait EntityRelations: Send + Sync {
    fn is_instance_of(&self, item: &str, class: &str) -> bool;
}

/// Item lookup that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoItems;

impl ItemLookup for NoItems {
    fn lookup(&self, _col: usize, _row: usize, _context: &str, _value: &str) -> Option<String> {
        None
    }
}

/// In-memory wikification table
///
/// Lookups prefer an exact cell entry, then the value within the requested
/// context, then the value in the default (empty) context.
#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    by_cell: HashMap<(usize, usize, String), String>,
    by_value: HashMap<(String, String), String>,
    instances: HashSet<(String, String)>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a cell value to an entity within a context (`""` is the default context)
    pub fn insert_value(
        &mut self,
        context: impl Into<String>,
        value: impl Into<String>,
        item: impl Into<String>,
    ) {
        self.by_value
            .insert((context.into(), value.into()), item.into());
    }

    /// Map one specific cell to an entity
    pub fn insert_cell(
        &mut self,
        col: usize,
        row: usize,
        context: impl Into<String>,
        item: impl Into<String>,
    ) {
        self.by_cell.insert((col, row, context.into()), item.into());
    }

    /// Record `item` as an instance of `class`
    pub fn add_instance(&mut self, item: impl Into<String>, class: impl Into<String>) {
        self.instances.insert((item.into(), class.into()));
    }

    pub fn len(&self) -> usize {
        self.by_cell.len() + self.by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ItemLookup for ItemTable {
    fn lookup(&self, col: usize, row: usize, context: &str, value: &str) -> Option<String> {
        self.by_cell
            .get(&(col, row, context.to_string()))
            .or_else(|| self.by_value.get(&(context.to_string(), value.to_string())))
            .or_else(|| self.by_value.get(&(String::new(), value.to_string())))
            .cloned()
    }
}

impl EntityRelations for ItemTable {
    fn is_instance_of(&self, item: &str, class: &str) -> bool {
        self.instances
            .contains(&(item.to_string(), class.to_string()))
    }
}

/// Coordinate variables bound for one evaluation (all 1-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Variables {
    pub row: Option<i64>,
    pub col: Option<i64>,
    pub qrow: Option<i64>,
    pub qcol: Option<i64>,
    pub n: Option<i64>,
    pub left: Option<i64>,
    pub right: Option<i64>,
    pub top: Option<i64>,
    pub bottom: Option<i64>,
}

/// Which sheet axis `$end` refers to when it is not inside a cell reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

/// Everything an expression may read while it is evaluated
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub sheet: &'a dyn Sheet,
    pub items: &'a dyn ItemLookup,
    pub relations: Option<&'a dyn EntityRelations>,
    pub vars: Variables,
    /// Axis used for a bare `$end`
    pub end_axis: Option<Axis>,
    /// Upper bound for the `$n` search, defaulting to the larger sheet dimension
    pub n_bound: Option<usize>,
    /// Session cache for compiled regex patterns
    pub regexes: Option<&'a RegexCache>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(sheet: &'a dyn Sheet, items: &'a dyn ItemLookup) -> Self {
        Self {
            sheet,
            items,
            relations: None,
            vars: Variables::default(),
            end_axis: None,
            n_bound: None,
            regexes: None,
        }
    }

    pub fn with_relations(mut self, relations: &'a dyn EntityRelations) -> Self {
        self.relations = Some(relations);
        self
    }

    /// Bind `$col`/`$row`
    pub fn at(mut self, col: usize, row: usize) -> Self {
        self.vars.col = Some(col as i64);
        self.vars.row = Some(row as i64);
        self
    }

    /// Bind only `$col`
    pub fn at_col(mut self, col: usize) -> Self {
        self.vars.col = Some(col as i64);
        self
    }

    /// Bind only `$row`
    pub fn at_row(mut self, row: usize) -> Self {
        self.vars.row = Some(row as i64);
        self
    }

    /// Bind `$qcol`/`$qrow` for a qualifier region cell
    pub fn with_qualifier(mut self, qcol: usize, qrow: usize) -> Self {
        self.vars.qcol = Some(qcol as i64);
        self.vars.qrow = Some(qrow as i64);
        self
    }

    pub fn with_n(mut self, n: i64) -> Self {
        self.vars.n = Some(n);
        self
    }

    pub fn with_n_bound(mut self, bound: Option<usize>) -> Self {
        self.n_bound = bound;
        self
    }

    pub fn with_regex_cache(mut self, regexes: &'a RegexCache) -> Self {
        self.regexes = Some(regexes);
        self
    }

    pub fn with_end_axis(mut self, axis: Axis) -> Self {
        self.end_axis = Some(axis);
        self
    }

    /// Default bound for the `$n` search: the larger sheet dimension
    pub fn default_n_bound(&self) -> usize {
        self.sheet.row_len().max(self.sheet.col_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::MemorySheet;

    #[test]
    fn test_item_table_precedence() {
        let mut table = ItemTable::new();
        table.insert_value("", "Peru", "Q419");
        table.insert_value("countries", "Peru", "Q1");
        table.insert_cell(1, 2, "", "Q2");

        assert_eq!(table.lookup(1, 2, "", "Peru").as_deref(), Some("Q2"));
        assert_eq!(table.lookup(1, 3, "countries", "Peru").as_deref(), Some("Q1"));
        assert_eq!(table.lookup(1, 3, "other", "Peru").as_deref(), Some("Q419"));
        assert_eq!(table.lookup(1, 3, "", "Chile"), None);
    }

    #[test]
    fn test_instances() {
        let mut table = ItemTable::new();
        table.add_instance("Q419", "Q6256");
        assert!(table.is_instance_of("Q419", "Q6256"));
        assert!(!table.is_instance_of("Q419", "Q5"));
    }

    #[test]
    fn test_context_builders() {
        let sheet = MemorySheet::from_rows("s", vec![vec!["a"; 4]; 7]);
        let ctx = EvaluationContext::new(&sheet, &NoItems)
            .at(2, 3)
            .with_qualifier(4, 5);
        assert_eq!(ctx.vars.col, Some(2));
        assert_eq!(ctx.vars.row, Some(3));
        assert_eq!(ctx.vars.qcol, Some(4));
        assert_eq!(ctx.default_n_bound(), 7);
    }
}
