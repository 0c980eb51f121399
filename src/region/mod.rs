//! Region resolution
//!
//! A region declaration names a bounding box (`range`, or any of
//! `left`/`right`/`top`/`bottom`), inclusion lists (`columns`, `rows`, `cells`)
//! and exclusion lists (`skip_columns`, `skip_rows`, `skip_cells`). Every value is
//! either a literal (`B`, `3`, `C7`) or an `=` expression.
//!
//! Resolution yields cells in column-major order: all rows of the first column,
//! then the next column. Explicit `cells` are appended after the box expansion
//! and are never removed by the skip lists.

pub mod cache;
pub mod error;

pub use cache::RegionCache;
pub use error::RegionError;

use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeclarationError;
use crate::expr::{compile, Axis, Code, EvaluationContext, EvaluationError, Value, Variable};
use crate::sheet::{column_index, parse_range, range_label, Coordinate};

/// A literal or `=` expression, as written in the document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// A single entry or a list of entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarList {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl ScalarList {
    pub fn entries(&self) -> &[Scalar] {
        match self {
            ScalarList::One(s) => std::slice::from_ref(s),
            ScalarList::Many(v) => v,
        }
    }
}

/// Declarative region, as it appears under `statementMapping.region`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ScalarList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<ScalarList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells: Option<ScalarList>,
    #[serde(default, alias = "skip_column", skip_serializing_if = "Option::is_none")]
    pub skip_columns: Option<ScalarList>,
    #[serde(default, alias = "skip_row", skip_serializing_if = "Option::is_none")]
    pub skip_rows: Option<ScalarList>,
    #[serde(default, alias = "skip_cell", skip_serializing_if = "Option::is_none")]
    pub skip_cells: Option<ScalarList>,
}

/// Resolved, non-empty set of 1-indexed cells plus the bounding box used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    cells: IndexSet<Coordinate>,
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Region {
    pub fn iter(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.cells.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        self.cells.contains(&coordinate)
    }

    /// A1 label of the bounding box
    pub fn range_label(&self) -> String {
        range_label(
            Coordinate::new(self.left, self.top),
            Coordinate::new(self.right, self.bottom),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    const ALL: [Side; 4] = [Side::Left, Side::Right, Side::Top, Side::Bottom];

    fn variable(self) -> Variable {
        match self {
            Side::Left => Variable::Left,
            Side::Right => Variable::Right,
            Side::Top => Variable::Top,
            Side::Bottom => Variable::Bottom,
        }
    }

    fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
        }
    }

    fn axis(self) -> Axis {
        match self {
            Side::Left | Side::Right => Axis::Column,
            Side::Top | Side::Bottom => Axis::Row,
        }
    }

    fn name(self) -> &'static str {
        self.variable().name()
    }
}

enum BoundarySource {
    Fixed(i64),
    Expression(Code),
}

/// Boundary values bound so far, in `left, right, top, bottom` order
#[derive(Default)]
struct Bounds([Option<i64>; 4]);

impl Bounds {
    fn get(&self, side: Side) -> Option<i64> {
        self.0[side as usize]
    }

    fn set(&mut self, side: Side, value: i64) {
        self.0[side as usize] = Some(value);
    }

    fn bind<'a>(&self, mut ctx: EvaluationContext<'a>) -> EvaluationContext<'a> {
        ctx.vars.left = self.get(Side::Left);
        ctx.vars.right = self.get(Side::Right);
        ctx.vars.top = self.get(Side::Top);
        ctx.vars.bottom = self.get(Side::Bottom);
        ctx
    }
}

fn compile_field(key: &str, raw: &str) -> Result<Code, RegionError> {
    compile(raw).map_err(|e| DeclarationError::expression(format!("region.{}", key), e).into())
}

fn is_expression(raw: &str) -> bool {
    raw.starts_with('=')
}

/// Interpret a literal position on `axis` (column letters or a 1-indexed number)
fn literal_position(scalar: &Scalar, axis: Axis, key: &str) -> Result<i64, RegionError> {
    let position = match scalar {
        Scalar::Int(i) => Some(*i),
        Scalar::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| match axis {
                Axis::Column => column_index(s).map(|c| c as i64),
                Axis::Row => None,
            })
        }
    };
    match position {
        Some(p) if p >= 1 => Ok(p),
        _ => Err(DeclarationError::invalid(
            format!("region.{}", key),
            format!("'{}' is not a valid {} position", scalar, axis_name(axis)),
        )
        .into()),
    }
}

fn check_bounds(left: i64, right: i64, top: i64, bottom: i64) -> Result<(), RegionError> {
    if left > right {
        return Err(RegionError::violation(format!(
            "left ({}) is greater than right ({})",
            left, right
        )));
    }
    if top > bottom {
        return Err(RegionError::violation(format!(
            "top ({}) is greater than bottom ({})",
            top, bottom
        )));
    }
    if left < 1 || top < 1 {
        return Err(RegionError::violation(format!(
            "region starts before the first cell (left {}, top {})",
            left, top
        )));
    }
    Ok(())
}

fn axis_name(axis: Axis) -> &'static str {
    match axis {
        Axis::Column => "column",
        Axis::Row => "row",
    }
}

/// Interpret an evaluated boundary value on `axis`
fn value_position(value: &Value, axis: Axis, key: &str) -> Result<i64, RegionError> {
    if let Some(n) = value.as_number().filter(|n| n.fract() == 0.0) {
        return Ok(n as i64);
    }
    let text = value.as_text().unwrap_or_default();
    let position = match axis {
        Axis::Column => column_index(text.trim()).map(|c| c as i64),
        Axis::Row => None,
    };
    position.ok_or_else(|| {
        RegionError::evaluation(
            key,
            EvaluationError::InvalidIndex {
                value: value.to_string(),
            },
        )
    })
}

impl RegionSpec {
    /// Region covering an A1 range
    pub fn from_range(range: impl Into<String>) -> Self {
        Self {
            range: Some(range.into()),
            ..Self::default()
        }
    }

    fn has_box_keys(&self) -> bool {
        self.range.is_some()
            || self.left.is_some()
            || self.right.is_some()
            || self.top.is_some()
            || self.bottom.is_some()
            || self.columns.is_some()
            || self.rows.is_some()
    }

    fn side(&self, side: Side) -> Option<&Scalar> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
            Side::Top => self.top.as_ref(),
            Side::Bottom => self.bottom.as_ref(),
        }
    }

    /// Check the declaration without evaluating anything
    pub fn validate(&self) -> Result<(), RegionError> {
        if let Some(range) = &self.range {
            if Side::ALL.iter().any(|s| self.side(*s).is_some()) {
                return Err(DeclarationError::invalid(
                    "region",
                    "'range' cannot be combined with left/right/top/bottom",
                )
                .into());
            }
            if parse_range(range).is_none() {
                return Err(DeclarationError::invalid(
                    "region.range",
                    format!("'{}' is not an A1 range", range),
                )
                .into());
            }
        }
        for side in Side::ALL {
            if let Some(Scalar::Text(raw)) = self.side(side) {
                if is_expression(raw) {
                    compile_field(side.name(), raw)?;
                }
            }
        }
        let lists = [
            ("columns", &self.columns),
            ("rows", &self.rows),
            ("cells", &self.cells),
            ("skip_columns", &self.skip_columns),
            ("skip_rows", &self.skip_rows),
            ("skip_cells", &self.skip_cells),
        ];
        for (key, list) in lists {
            for entry in list.iter().flat_map(ScalarList::entries) {
                if let Scalar::Text(raw) = entry {
                    if is_expression(raw) {
                        compile_field(key, raw)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve against the sheet bound in `ctx`
    pub fn resolve(&self, ctx: &EvaluationContext<'_>) -> Result<Region, RegionError> {
        self.validate()?;
        let bounds = self.resolve_bounds(ctx)?;
        let (left, right) = (bounds.0, bounds.1);
        let (top, bottom) = (bounds.2, bounds.3);
        // A cells-only region takes the sheet as its box, which may be empty
        if self.has_box_keys() {
            check_bounds(left, right, top, bottom)?;
        }
        let (left, right) = (left.max(1) as usize, right.max(0) as usize);
        let (top, bottom) = (top.max(1) as usize, bottom.max(0) as usize);
        let inner = Bounds([
            Some(left as i64),
            Some(right as i64),
            Some(top as i64),
            Some(bottom as i64),
        ])
        .bind(*ctx);

        let mut cells = IndexSet::new();
        if self.has_box_keys() {
            let skip_columns = self.axis_list(&self.skip_columns, "skip_columns", Axis::Column, left, right, &inner)?;
            let skip_rows = self.axis_list(&self.skip_rows, "skip_rows", Axis::Row, top, bottom, &inner)?;
            let skip_cells: IndexSet<Coordinate> = self
                .cell_list(&self.skip_cells, "skip_cells", (left, right, top, bottom), &inner)?
                .into_iter()
                .collect();

            let columns = match &self.columns {
                Some(_) => self.axis_list(&self.columns, "columns", Axis::Column, left, right, &inner)?,
                None => (left..=right).collect(),
            };
            let rows = match &self.rows {
                Some(_) => self.axis_list(&self.rows, "rows", Axis::Row, top, bottom, &inner)?,
                None => (top..=bottom).collect(),
            };

            for &col in columns.iter().filter(|c| !skip_columns.contains(*c)) {
                for &row in rows.iter().filter(|r| !skip_rows.contains(*r)) {
                    let coordinate = Coordinate::new(col, row);
                    if !skip_cells.contains(&coordinate) {
                        cells.insert(coordinate);
                    }
                }
            }
        }
        cells.extend(self.cell_list(&self.cells, "cells", (left, right, top, bottom), &inner)?);

        if cells.is_empty() {
            return Err(RegionError::Empty);
        }
        debug!(
            cells = cells.len(),
            bounds = %range_label(Coordinate::new(left, top), Coordinate::new(right, bottom)),
            "resolved region"
        );
        Ok(Region {
            cells,
            left,
            right,
            top,
            bottom,
        })
    }

    /// Resolve `left, right, top, bottom` in dependency order
    fn resolve_bounds(&self, ctx: &EvaluationContext<'_>) -> Result<(i64, i64, i64, i64), RegionError> {
        let sheet = ctx.sheet;
        if let Some(range) = &self.range {
            let (from, to) = parse_range(range).ok_or_else(|| {
                DeclarationError::invalid("region.range", format!("'{}' is not an A1 range", range))
            })?;
            return Ok((
                from.col.min(to.col) as i64,
                from.col.max(to.col) as i64,
                from.row.min(to.row) as i64,
                from.row.max(to.row) as i64,
            ));
        }

        let mut bounds = Bounds::default();
        let mut pending = Vec::new();
        for side in Side::ALL {
            let source = match self.side(side) {
                None => BoundarySource::Fixed(match side {
                    Side::Left | Side::Top => 1,
                    Side::Right => sheet.col_len() as i64,
                    Side::Bottom => sheet.row_len() as i64,
                }),
                Some(Scalar::Text(raw)) if is_expression(raw) => {
                    BoundarySource::Expression(compile_field(side.name(), raw)?)
                }
                Some(scalar) => BoundarySource::Fixed(literal_position(scalar, side.axis(), side.name())?),
            };
            match source {
                BoundarySource::Fixed(value) => bounds.set(side, value),
                BoundarySource::Expression(code) => {
                    if code.references(side.variable()) {
                        return Err(RegionError::violation(format!(
                            "{} cannot refer to itself",
                            side.name()
                        )));
                    }
                    if code.references(side.opposite().variable()) {
                        return Err(RegionError::violation(format!(
                            "{} cannot depend on {}",
                            side.name(),
                            side.opposite().name()
                        )));
                    }
                    pending.push((side, code));
                }
            }
        }

        while !pending.is_empty() {
            let ready = pending.iter().position(|(_, code)| {
                Side::ALL
                    .iter()
                    .all(|s| bounds.get(*s).is_some() || !code.references(s.variable()))
            });
            let Some(index) = ready else {
                let names: Vec<&str> = pending.iter().map(|(s, _)| s.name()).collect();
                return Err(RegionError::violation(format!(
                    "circular dependency between {}",
                    names.join(", ")
                )));
            };
            let (side, code) = pending.remove(index);
            let bound_ctx = bounds.bind(*ctx).with_end_axis(side.axis());
            let value = code
                .evaluate(&bound_ctx)
                .map_err(|e| RegionError::evaluation(side.name(), e))?;
            bounds.set(side, value_position(&value, side.axis(), side.name())?);
        }

        let get = |side| bounds.get(side).unwrap_or(1);
        Ok((get(Side::Left), get(Side::Right), get(Side::Top), get(Side::Bottom)))
    }

    /// Positions on one axis named by `list`: literals plus expression matches within `lo..=hi`
    fn axis_list(
        &self,
        list: &Option<ScalarList>,
        key: &str,
        axis: Axis,
        lo: usize,
        hi: usize,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Vec<usize>, RegionError> {
        let mut positions = IndexSet::new();
        for entry in list.iter().flat_map(ScalarList::entries) {
            match entry {
                Scalar::Text(raw) if is_expression(raw) => {
                    let code = compile_field(key, raw)?;
                    for position in lo..=hi {
                        let scoped = match axis {
                            Axis::Column => ctx.at_col(position),
                            Axis::Row => ctx.at_row(position),
                        }
                        .with_end_axis(axis);
                        if matches(&code, &scoped, key)? {
                            positions.insert(position);
                        }
                    }
                }
                literal => {
                    positions.insert(literal_position(literal, axis, key)? as usize);
                }
            }
        }
        Ok(positions.into_iter().collect())
    }

    /// Cells named by `list`: A1 literals plus expression matches within the box
    fn cell_list(
        &self,
        list: &Option<ScalarList>,
        key: &str,
        (left, right, top, bottom): (usize, usize, usize, usize),
        ctx: &EvaluationContext<'_>,
    ) -> Result<Vec<Coordinate>, RegionError> {
        let mut cells = IndexSet::new();
        for entry in list.iter().flat_map(ScalarList::entries) {
            match entry {
                Scalar::Text(raw) if is_expression(raw) => {
                    let code = compile_field(key, raw)?;
                    for col in left..=right {
                        for row in top..=bottom {
                            if matches(&code, &ctx.at(col, row), key)? {
                                cells.insert(Coordinate::new(col, row));
                            }
                        }
                    }
                }
                literal => {
                    let label = literal.to_string();
                    let coordinate = Coordinate::parse(label.trim()).ok_or_else(|| {
                        DeclarationError::invalid(
                            format!("region.{}", key),
                            format!("'{}' is not a cell reference", label),
                        )
                    })?;
                    cells.insert(coordinate);
                }
            }
        }
        Ok(cells.into_iter().collect())
    }
}

/// Membership test; reading past the sheet edge counts as a non-match
fn matches(code: &Code, ctx: &EvaluationContext<'_>, key: &str) -> Result<bool, RegionError> {
    match code.evaluate(ctx) {
        Ok(value) => Ok(value.is_truthy()),
        Err(e) if e.is_out_of_bounds() => Ok(false),
        Err(EvaluationError::NoMatch { .. }) | Err(EvaluationError::ItemNotFound { .. }) => Ok(false),
        Err(e) => Err(RegionError::evaluation(key, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NoItems;
    use crate::sheet::MemorySheet;
    use pretty_assertions::assert_eq;

    fn sheet() -> MemorySheet {
        MemorySheet::from_rows(
            "s",
            vec![
                vec!["country", "2019", "2020", "notes"],
                vec!["Peru", "1", "2", ""],
                vec!["Chile", "3", "4", "x"],
                vec!["total", "4", "6", ""],
            ],
        )
    }

    fn spec(yaml: &str) -> RegionSpec {
        serde_yaml::from_str(yaml).expect("Should deserialize")
    }

    fn labels(region: &Region) -> Vec<String> {
        region.iter().map(|c| c.label()).collect()
    }

    #[test]
    fn test_range_is_column_major() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = RegionSpec::from_range("B2:C3").resolve(&ctx).unwrap();
        assert_eq!(labels(&region), vec!["B2", "B3", "C2", "C3"]);
        assert_eq!(region.range_label(), "B2:C3");
    }

    #[test]
    fn test_defaults_to_sheet_extent() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = spec("left: B\ntop: 2").resolve(&ctx).unwrap();
        assert_eq!((region.left, region.right, region.top, region.bottom), (2, 4, 2, 4));
    }

    #[test]
    fn test_skip_lists() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = spec(
            "range: B2:D4\nskip_columns: [D]\nskip_rows: ['=value[A, $row] == \"total\"']\nskip_cells: [C3]",
        )
        .resolve(&ctx)
        .unwrap();
        assert_eq!(labels(&region), vec!["B2", "B3", "C2"]);
    }

    #[test]
    fn test_singular_skip_alias() {
        let region = spec("range: A1:B2\nskip_row: 1");
        assert!(region.skip_rows.is_some());
    }

    #[test]
    fn test_explicit_cells_only() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = spec("cells: [D3, A1]").resolve(&ctx).unwrap();
        assert_eq!(labels(&region), vec!["D3", "A1"]);
    }

    #[test]
    fn test_cells_unioned_after_box() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = spec("range: B2:B3\ncells: [D3, B2]\nskip_cells: [D3]").resolve(&ctx).unwrap();
        assert_eq!(labels(&region), vec!["B2", "B3", "D3"]);
    }

    #[test]
    fn test_data_dependent_boundary() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        // bottom stops at the last row before "total"
        let region = spec("left: B\nright: C\ntop: 2\nbottom: '=value[A, 2 + $n] == \"total\" -> 1 + $n'")
            .resolve(&ctx)
            .unwrap();
        assert_eq!(region.bottom, 3);
        assert_eq!(region.len(), 4);
    }

    #[test]
    fn test_expression_columns() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let region = spec("top: 2\nbottom: 2\ncolumns: ['=starts_with(value[$col, 1], \"20\")']").resolve(&ctx).unwrap();
        assert_eq!(labels(&region), vec!["B2", "C2"]);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let err = spec("left: C\nright: B").resolve(&ctx).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_opposite_boundary_dependency_rejected() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let err = spec("left: '=$right - 1'").resolve(&ctx).unwrap_err();
        assert!(err.is_constraint_violation());
        let err = spec("bottom: '=$bottom'").resolve(&ctx).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_cross_axis_cycle_rejected() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let err = spec("left: '=$top'\ntop: '=$left'").resolve(&ctx).unwrap_err();
        assert!(err.is_constraint_violation());
        let ok = spec("left: 2\ntop: '=$left'").resolve(&ctx).unwrap();
        assert_eq!(ok.top, 2);
    }

    #[test]
    fn test_empty_region() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let err = spec("range: A1:A2\nskip_columns: [A]").resolve(&ctx).unwrap_err();
        assert_eq!(err, RegionError::Empty);
    }

    #[test]
    fn test_range_with_boundaries_is_declaration_error() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let err = spec("range: A1:B2\nleft: A").resolve(&ctx).unwrap_err();
        assert!(matches!(err, RegionError::Declaration(_)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(serde_yaml::from_str::<RegionSpec>("range: A1:B2\nrigth: C").is_err());
    }
}
