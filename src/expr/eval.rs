//! Tree-walking interpreter for compiled expressions

use std::cmp::Ordering;

use crate::expr::ast::*;
use crate::expr::context::{Axis, EvaluationContext};
use crate::expr::error::EvaluationError;
use crate::expr::functions;
use crate::expr::value::{CellRange, CellValue, Value};
use crate::sheet::{cell_at, Coordinate};

/// Evaluate `expr` against the bound context
pub fn eval(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::String(s) => Ok(Value::Text(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Column(c) => Ok(Value::Number(*c as f64)),
        Expr::Var(var) => variable(*var, ctx),
        Expr::CellRef {
            accessor,
            col,
            row,
            context,
        } => cell_ref(*accessor, col, row, context.as_deref(), ctx),
        Expr::Call { name, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            functions::call(name, values, ctx)
        }
        Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!eval(inner, ctx)?.is_truthy())),
        Expr::Unary(UnaryOp::Neg, inner) => {
            let value = eval(inner, ctx)?;
            value
                .as_number()
                .map(|n| Value::Number(-n))
                .ok_or_else(|| EvaluationError::type_mismatch("number", value.type_name()))
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !eval(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.is_truthy()))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if eval(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.is_truthy()))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, ctx)?;
            let rhs = eval(rhs, ctx)?;
            binary(*op, &lhs, &rhs)
        }
        Expr::Guard(condition, body) => {
            if eval(condition, ctx)?.is_truthy() {
                eval(body, ctx)
            } else {
                Ok(Value::Bool(false))
            }
        }
    }
}

fn bound(value: Option<i64>, variable: Variable) -> Result<Value, EvaluationError> {
    value
        .map(|v| Value::Number(v as f64))
        .ok_or(EvaluationError::UnboundVariable { variable })
}

fn variable(var: Variable, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let vars = &ctx.vars;
    match var {
        Variable::Row => bound(vars.row, var),
        Variable::Col => bound(vars.col, var),
        Variable::N => bound(vars.n, var),
        Variable::Left => bound(vars.left, var),
        Variable::Right => bound(vars.right, var),
        Variable::Top => bound(vars.top, var),
        Variable::Bottom => bound(vars.bottom, var),
        Variable::QRow | Variable::QCol => {
            let value = if var == Variable::QRow { vars.qrow } else { vars.qcol };
            value
                .map(|v| Value::Number(v as f64))
                .ok_or(EvaluationError::MissingQualifierContext { variable: var })
        }
        Variable::End => match ctx.end_axis {
            Some(Axis::Column) => Ok(Value::Number(ctx.sheet.col_len() as f64)),
            Some(Axis::Row) => Ok(Value::Number(ctx.sheet.row_len() as f64)),
            None => Err(EvaluationError::UnboundVariable { variable: var }),
        },
        Variable::Sheet => Ok(Value::Text(ctx.sheet.name().to_string())),
        Variable::Filename => Ok(Value::Text(ctx.sheet.source_file_name().to_string())),
    }
}

fn coordinate(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<i64, EvaluationError> {
    let value = eval(expr, ctx)?;
    match value.as_number() {
        Some(n) if n.fract() == 0.0 => Ok(n as i64),
        _ => Err(EvaluationError::InvalidIndex {
            value: value.to_string(),
        }),
    }
}

/// Inclusive bounds of one index, evaluated with `$end` on `axis`
fn index_bounds(
    index: &Index,
    axis: Axis,
    ctx: &EvaluationContext<'_>,
) -> Result<(i64, i64, bool), EvaluationError> {
    let ctx = ctx.with_end_axis(axis);
    match index {
        Index::Single(e) => {
            let at = coordinate(e, &ctx)?;
            Ok((at, at, false))
        }
        Index::Span(from, to) => {
            let from = coordinate(from, &ctx)?;
            let to = coordinate(to, &ctx)?;
            Ok((from.min(to), from.max(to), true))
        }
    }
}

fn cell_ref(
    accessor: Accessor,
    col: &Index,
    row: &Index,
    context: Option<&Expr>,
    ctx: &EvaluationContext<'_>,
) -> Result<Value, EvaluationError> {
    let (c0, c1, col_span) = index_bounds(col, Axis::Column, ctx)?;
    let (r0, r1, row_span) = index_bounds(row, Axis::Row, ctx)?;
    let wiki_context = match context {
        Some(e) => eval(e, ctx)?.to_string(),
        None => String::new(),
    };

    if !col_span && !row_span {
        return read_cell(accessor, c0, r0, &wiki_context, ctx, true);
    }

    let mut cells = Vec::new();
    for r in r0..=r1 {
        for c in c0..=c1 {
            match read_cell(accessor, c, r, &wiki_context, ctx, false)? {
                Value::Cell(cell) => cells.push(cell),
                _ => cells.push(CellValue {
                    col: c as usize,
                    row: r as usize,
                    value: String::new(),
                    accessor,
                }),
            }
        }
    }
    Ok(Value::Range(CellRange { cells }))
}

fn read_cell(
    accessor: Accessor,
    col: i64,
    row: i64,
    wiki_context: &str,
    ctx: &EvaluationContext<'_>,
    strict: bool,
) -> Result<Value, EvaluationError> {
    let text = cell_at(ctx.sheet, col, row)?;
    let (col, row) = (col as usize, row as usize);
    let value = match accessor {
        Accessor::Value => text.to_string(),
        Accessor::Item => {
            if text.is_empty() {
                return Ok(Value::Empty);
            }
            match ctx.items.lookup(col, row, wiki_context, text) {
                Some(item) => item,
                None if strict => {
                    return Err(EvaluationError::ItemNotFound {
                        cell: Coordinate::new(col, row).label(),
                        value: text.to_string(),
                    })
                }
                None => return Ok(Value::Empty),
            }
        }
    };
    Ok(Value::Cell(CellValue {
        col,
        row,
        value,
        accessor,
    }))
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Less
        | BinaryOp::LessEq
        | BinaryOp::Greater
        | BinaryOp::GreaterEq => Ok(Value::Bool(compare_any(op, lhs, rhs))),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, lhs, rhs),
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => lhs.is_truthy() && rhs.is_truthy(),
            _ => lhs.is_truthy() || rhs.is_truthy(),
        })),
    }
}

/// Ranges compare true when any element satisfies the comparison
fn compare_any(op: BinaryOp, lhs: &Value, rhs: &Value) -> bool {
    let lhs = lhs.elements();
    let rhs = rhs.elements();
    lhs.iter()
        .any(|l| rhs.iter().any(|r| compare_scalar(op, l, r)))
}

fn compare_scalar(op: BinaryOp, lhs: &Value, rhs: &Value) -> bool {
    let ordering = match (lhs.as_number(), rhs.as_number()) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => {
            let l = lhs.as_text().unwrap_or_default();
            let r = rhs.as_text().unwrap_or_default();
            Some(l.cmp(&r))
        }
    };
    let Some(ordering) = ordering else {
        return op == BinaryOp::NotEq;
    };
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEq => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        BinaryOp::GreaterEq => ordering != Ordering::Less,
        _ => false,
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, EvaluationError> {
    for side in [lhs, rhs] {
        if matches!(side, Value::Range(_)) {
            return Err(EvaluationError::type_mismatch("scalar", "range"));
        }
    }
    match (lhs.as_number(), rhs.as_number()) {
        (Some(l), Some(r)) => match op {
            BinaryOp::Add => Ok(Value::Number(l + r)),
            BinaryOp::Sub => Ok(Value::Number(l - r)),
            BinaryOp::Mul => Ok(Value::Number(l * r)),
            _ if r == 0.0 => Err(EvaluationError::DivisionByZero),
            _ => Ok(Value::Number(l / r)),
        },
        // `+` on text joins the two sides
        _ if op == BinaryOp::Add => Ok(Value::Text(format!("{}{}", lhs, rhs))),
        (None, _) => Err(EvaluationError::type_mismatch("number", lhs.type_name())),
        (_, None) => Err(EvaluationError::type_mismatch("number", rhs.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::context::{ItemTable, NoItems};
    use crate::expr::grammar::parse;
    use crate::sheet::MemorySheet;

    fn sheet() -> MemorySheet {
        MemorySheet::from_rows(
            "Sheet1",
            vec![
                vec!["country", "gdp", "year"],
                vec!["Peru", "1,200", "2019"],
                vec!["Chile", "900", "2020"],
                vec!["", "", ""],
            ],
        )
        .with_source_file_name("data.csv")
    }

    fn run(source: &str, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
        eval(&parse(source).expect("Should parse"), ctx)
    }

    #[test]
    fn test_value_reference_is_one_indexed() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(2, 3);
        let out = run("value[A, $row]", &ctx).unwrap();
        assert_eq!(out.to_string(), "Chile");
        assert_eq!(out.origin().map(|c| c.label()), Some("A3".to_string()));
    }

    #[test]
    fn test_item_lookup() {
        let sheet = sheet();
        let mut items = ItemTable::new();
        items.insert_value("", "Peru", "Q419");
        let ctx = EvaluationContext::new(&sheet, &items).at(2, 2);
        assert_eq!(run("item[A, $row]", &ctx).unwrap().to_string(), "Q419");

        let ctx = ctx.at(2, 3);
        assert!(matches!(
            run("item[A, $row]", &ctx),
            Err(EvaluationError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_range_is_row_major() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        match run("value[A:B, 2:3]", &ctx).unwrap() {
            Value::Range(r) => {
                let values: Vec<&str> = r.iter().map(|c| c.value.as_str()).collect();
                assert_eq!(values, vec!["Peru", "1,200", "Chile", "900"]);
            }
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_end_is_axis_sensitive() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        assert_eq!(run("value[$end, 1]", &ctx).unwrap().to_string(), "year");
        assert_eq!(run("value[A, $end - 1]", &ctx).unwrap().to_string(), "Chile");
        assert!(run("$end", &ctx).is_err());
    }

    #[test]
    fn test_out_of_bounds_propagates() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(1, 1);
        let err = run("value[$col, $row - 1]", &ctx).unwrap_err();
        assert!(err.is_out_of_bounds());
    }

    #[test]
    fn test_qualifier_variables_require_context() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(2, 2);
        assert!(matches!(
            run("value[$qcol, $row]", &ctx),
            Err(EvaluationError::MissingQualifierContext { .. })
        ));
        let ctx = ctx.with_qualifier(3, 1);
        assert_eq!(run("value[$qcol, $row]", &ctx).unwrap().to_string(), "2019");
    }

    #[test]
    fn test_guard() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(1, 2);
        assert_eq!(
            run("value[A, $row] == \"Peru\" -> \"yes\"", &ctx).unwrap(),
            Value::Text("yes".into())
        );
        assert_eq!(
            run("value[A, $row] == \"Chile\" -> \"yes\"", &ctx).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_numeric_and_textual_comparison() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(3, 2);
        assert_eq!(run("value[C, $row] < 2020", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("value[C, $row] == \"2019\"", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("value[A, $row] > \"Chile\"", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_range_comparison_is_any() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        assert_eq!(run("value[A, 1:3] == \"Chile\"", &ctx).unwrap(), Value::Bool(true));
        assert_eq!(run("value[A, 1:3] == \"Bolivia\"", &ctx).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_sheet_metadata() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        assert_eq!(run("$sheet", &ctx).unwrap().to_string(), "Sheet1");
        assert_eq!(run("$filename", &ctx).unwrap().to_string(), "data.csv");
    }

    #[test]
    fn test_arithmetic() {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems).at(2, 3);
        assert_eq!(run("value[B, $row] / 3", &ctx).unwrap(), Value::Number(300.0));
        assert_eq!(run("\"a\" + value[A, $row]", &ctx).unwrap(), Value::Text("aChile".into()));
        assert!(matches!(run("1 / 0", &ctx), Err(EvaluationError::DivisionByZero)));
    }
}
