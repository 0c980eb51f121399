//! Built-in functions callable from expressions
//!
//! Boolean predicates accept a range as their first argument and are true when
//! any element matches. Extraction functions only accept scalars and keep the
//! provenance of a single-cell input.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::datetime::parse_date;
use crate::expr::context::EvaluationContext;
use crate::expr::error::EvaluationError;
use crate::expr::value::{format_number, parse_finite, Value};

/// How a function treats its principal (first) argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Vectorized over ranges with "any element" semantics
    Predicate,
    /// Scalar only; a range is an error
    Extraction,
    /// Flattens every argument but the trailing separator
    Concat,
}

/// Signature of a built-in function
#[derive(Debug, Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub kind: FunctionKind,
}

impl FunctionSpec {
    const fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        kind: FunctionKind,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            kind,
        }
    }

    /// Check an argument count at compile time
    pub fn check_arity(&self, count: usize) -> Result<(), String> {
        let too_many = self.max_args.is_some_and(|max| count > max);
        if count < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => format!("{}", max),
                Some(max) => format!("{} to {}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(format!(
                "{} takes {} arguments, got {}",
                self.name, expected, count
            ));
        }
        Ok(())
    }
}

use FunctionKind::*;

static FUNCTIONS: &[FunctionSpec] = &[
    FunctionSpec::new("contains", 2, Some(2), Predicate),
    FunctionSpec::new("starts_with", 2, Some(2), Predicate),
    FunctionSpec::new("ends_with", 2, Some(2), Predicate),
    FunctionSpec::new("instance_of", 2, Some(2), Predicate),
    FunctionSpec::new("substring", 2, Some(3), Extraction),
    FunctionSpec::new("regex", 2, Some(3), Extraction),
    FunctionSpec::new("replace_regex", 3, Some(3), Extraction),
    FunctionSpec::new("split_index", 3, Some(3), Extraction),
    FunctionSpec::new("extract_date", 2, None, Extraction),
    FunctionSpec::new("make_numeric", 1, Some(1), Extraction),
    FunctionSpec::new("strip", 1, Some(1), Extraction),
    FunctionSpec::new("lower", 1, Some(1), Extraction),
    FunctionSpec::new("upper", 1, Some(1), Extraction),
    FunctionSpec::new("title", 1, Some(1), Extraction),
    FunctionSpec::new("str", 1, Some(1), Extraction),
    FunctionSpec::new("concat", 2, None, Concat),
];

/// Find a built-in by name
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    FUNCTIONS.iter().find(|f| f.name == name)
}

static NUMERIC_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s$%€£]").expect("Invalid numeric noise regex"));

/// Apply a built-in to already-evaluated arguments
pub fn call(
    name: &str,
    args: Vec<Value>,
    ctx: &EvaluationContext<'_>,
) -> Result<Value, EvaluationError> {
    let spec = lookup(name)
        .ok_or_else(|| EvaluationError::function(name, "unknown function"))?;
    spec.check_arity(args.len())
        .map_err(|reason| EvaluationError::function(name, reason))?;

    match spec.kind {
        Predicate => predicate(name, &args, ctx).map(Value::Bool),
        Concat => concat(&args),
        Extraction => {
            if matches!(args[0], Value::Range(_)) {
                return Err(EvaluationError::RangeNotSupported {
                    function: name.to_string(),
                });
            }
            extraction(name, &args, ctx)
        }
    }
}

fn text_arg(args: &[Value], index: usize, function: &str) -> Result<String, EvaluationError> {
    args[index]
        .as_text()
        .map(|t| t.into_owned())
        .ok_or_else(|| EvaluationError::function(function, format!("argument {} must be a scalar", index + 1)))
}

fn int_arg(args: &[Value], index: usize, function: &str) -> Result<i64, EvaluationError> {
    args[index]
        .as_number()
        .filter(|n| n.fract() == 0.0)
        .map(|n| n as i64)
        .ok_or_else(|| EvaluationError::function(function, format!("argument {} must be an integer", index + 1)))
}

fn predicate(
    name: &str,
    args: &[Value],
    ctx: &EvaluationContext<'_>,
) -> Result<bool, EvaluationError> {
    let needle = text_arg(args, 1, name)?;
    let mut any = false;
    for element in args[0].elements() {
        let text = element.as_text().unwrap_or_default();
        let hit = match name {
            "contains" => text.contains(needle.as_str()),
            "starts_with" => text.starts_with(needle.as_str()),
            "ends_with" => text.ends_with(needle.as_str()),
            "instance_of" => {
                let relations = ctx.relations.ok_or(EvaluationError::NoRelations)?;
                !text.is_empty() && relations.is_instance_of(&text, &needle)
            }
            _ => return Err(EvaluationError::function(name, "not a predicate")),
        };
        if hit {
            any = true;
            break;
        }
    }
    Ok(any)
}

fn concat(args: &[Value]) -> Result<Value, EvaluationError> {
    let (separator, values) = args
        .split_last()
        .ok_or_else(|| EvaluationError::function("concat", "missing separator"))?;
    let separator = separator
        .as_text()
        .ok_or_else(|| EvaluationError::function("concat", "separator must be a scalar"))?;
    let parts: Vec<String> = values
        .iter()
        .flat_map(Value::elements)
        .filter_map(|v| v.as_text().map(|t| t.into_owned()))
        .filter(|t| !t.is_empty())
        .collect();
    Ok(Value::Text(parts.join(&separator)))
}

/// Rewrap extracted text so a single-cell input keeps its origin
fn rewrap(input: &Value, text: String) -> Value {
    match input {
        Value::Cell(cell) => Value::Cell(cell.with_value(text)),
        _ => Value::Text(text),
    }
}

fn extraction(name: &str, args: &[Value], ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let input = text_arg(args, 0, name)?;
    let result = match name {
        "substring" => {
            let start = int_arg(args, 1, name)?;
            let end = if args.len() > 2 {
                Some(int_arg(args, 2, name)?)
            } else {
                None
            };
            substring(&input, start, end)
        }
        "regex" => {
            let pattern = text_arg(args, 1, name)?;
            let group = if args.len() > 2 {
                int_arg(args, 2, name)?.max(0) as usize
            } else {
                0
            };
            let re = regex_for(ctx, &pattern)?;
            re.captures(&input)
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        }
        "replace_regex" => {
            let re = regex_for(ctx, &text_arg(args, 1, name)?)?;
            let replacement = text_arg(args, 2, name)?;
            re.replace_all(&input, replacement.as_str()).into_owned()
        }
        "split_index" => {
            let separator = text_arg(args, 1, name)?;
            let index = int_arg(args, 2, name)?;
            if separator.is_empty() {
                return Err(EvaluationError::function(name, "separator cannot be empty"));
            }
            let parts: Vec<&str> = input.split(separator.as_str()).collect();
            pick(&parts, index)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        }
        "extract_date" => {
            let formats = args[1..]
                .iter()
                .map(|a| a.as_text().map(|t| t.into_owned()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| EvaluationError::function(name, "formats must be scalars"))?;
            parse_date(&input, &formats)
                .map(|d| d.iso())
                .ok_or(EvaluationError::InvalidDate { value: input.clone() })?
        }
        "make_numeric" => {
            let cleaned = NUMERIC_NOISE.replace_all(&input, "");
            match parse_finite(&cleaned) {
                Some(n) => return Ok(rewrap(&args[0], format_number(n))),
                None => return Ok(Value::Empty),
            }
        }
        "strip" => input.trim().to_string(),
        "lower" => input.to_lowercase(),
        "upper" => input.to_uppercase(),
        "title" => title_case(&input),
        "str" => input,
        _ => return Err(EvaluationError::function(name, "not an extraction function")),
    };
    Ok(rewrap(&args[0], result))
}

fn compile_regex(pattern: &str) -> Result<Regex, EvaluationError> {
    Regex::new(pattern).map_err(|e| EvaluationError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn regex_for(ctx: &EvaluationContext<'_>, pattern: &str) -> Result<Regex, EvaluationError> {
    match ctx.regexes {
        Some(cache) => cache.get(pattern),
        None => compile_regex(pattern),
    }
}

/// Compiled `regex`/`replace_regex` patterns, scoped to one generation session
#[derive(Debug, Default)]
pub struct RegexCache {
    entries: DashMap<String, Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled pattern; invalid patterns are not cached
    pub fn get(&self, pattern: &str) -> Result<Regex, EvaluationError> {
        if let Some(hit) = self.entries.get(pattern) {
            return Ok(hit.clone());
        }
        let re = compile_regex(pattern)?;
        self.entries.insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 1-indexed element; negative indexes count from the end
fn pick<'s>(parts: &[&'s str], index: i64) -> Option<&'s str> {
    let len = parts.len() as i64;
    let i = if index < 0 { len + index } else { index - 1 };
    if (0..len).contains(&i) {
        Some(parts[i as usize])
    } else {
        None
    }
}

/// 1-indexed inclusive character slice; negative positions count from the end
fn substring(input: &str, start: i64, end: Option<i64>) -> String {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len() as i64;
    let resolve = |p: i64| if p < 0 { len + p + 1 } else { p };
    let from = resolve(start).max(1);
    let to = end.map(resolve).unwrap_or(len).min(len);
    if from > to {
        return String::new();
    }
    chars[(from - 1) as usize..to as usize].iter().collect()
}

fn title_case(input: &str) -> String {
    input
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::Accessor;
    use crate::expr::context::{ItemTable, NoItems};
    use crate::expr::value::{CellRange, CellValue};
    use crate::sheet::MemorySheet;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn cell(col: usize, row: usize, s: &str) -> CellValue {
        CellValue {
            col,
            row,
            value: s.to_string(),
            accessor: Accessor::Value,
        }
    }

    fn run(name: &str, args: Vec<Value>) -> Result<Value, EvaluationError> {
        let sheet = MemorySheet::default();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        call(name, args, &ctx)
    }

    #[test]
    fn test_arity_messages() {
        let spec = lookup("substring").unwrap();
        assert!(spec.check_arity(1).unwrap_err().contains("2 to 3"));
        assert!(spec.check_arity(2).is_ok());
        assert!(lookup("concat").unwrap().check_arity(9).is_ok());
    }

    #[test]
    fn test_predicates_on_range_use_any() {
        let range = Value::Range(CellRange {
            cells: vec![cell(1, 1, "alpha"), cell(2, 1, "beta")],
        });
        assert_eq!(run("contains", vec![range.clone(), text("et")]).unwrap(), Value::Bool(true));
        assert_eq!(run("starts_with", vec![range.clone(), text("be")]).unwrap(), Value::Bool(true));
        assert_eq!(run("ends_with", vec![range, text("x")]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_extraction_rejects_range() {
        let range = Value::Range(CellRange {
            cells: vec![cell(1, 1, "a")],
        });
        assert!(matches!(
            run("substring", vec![range, Value::Number(1.0)]),
            Err(EvaluationError::RangeNotSupported { .. })
        ));
    }

    #[test]
    fn test_substring() {
        assert_eq!(substring("population", 1, Some(3)), "pop");
        assert_eq!(substring("population", -3, None), "ion");
        assert_eq!(substring("abc", 5, None), "");
    }

    #[test]
    fn test_regex_group() {
        let out = run("regex", vec![text("FY 2019-20"), text(r"(\d{4})-(\d{2})"), Value::Number(1.0)]).unwrap();
        assert_eq!(out, text("2019"));
        let whole = run("regex", vec![text("FY 2019-20"), text(r"\d+")]).unwrap();
        assert_eq!(whole, text("2019"));
    }

    #[test]
    fn test_split_index() {
        let out = run("split_index", vec![text("a, b, c"), text(","), Value::Number(2.0)]).unwrap();
        assert_eq!(out, text("b"));
        let last = run("split_index", vec![text("a, b, c"), text(","), Value::Number(-1.0)]).unwrap();
        assert_eq!(last, text("c"));
    }

    #[test]
    fn test_concat_skips_empty_and_flattens_ranges() {
        let range = Value::Range(CellRange {
            cells: vec![cell(1, 1, "2019"), cell(2, 1, ""), cell(3, 1, "04")],
        });
        let out = run("concat", vec![range, text("01"), text("/")]).unwrap();
        assert_eq!(out, text("2019/04/01"));
    }

    #[test]
    fn test_extraction_keeps_provenance() {
        let out = run("upper", vec![Value::Cell(cell(3, 4, "peru"))]).unwrap();
        match out {
            Value::Cell(c) => {
                assert_eq!((c.col, c.row), (3, 4));
                assert_eq!(c.value, "PERU");
            }
            other => panic!("Expected cell, got {:?}", other),
        }
    }

    #[test]
    fn test_make_numeric() {
        assert_eq!(run("make_numeric", vec![text("1,234")]).unwrap(), text("1234"));
        assert_eq!(run("make_numeric", vec![text("n/a")]).unwrap(), Value::Empty);
        assert_eq!(run("make_numeric", vec![text("NaN")]).unwrap(), Value::Empty);
        assert_eq!(run("make_numeric", vec![text("-inf")]).unwrap(), Value::Empty);
    }

    #[test]
    fn test_regex_patterns_are_cached() {
        let sheet = MemorySheet::default();
        let cache = RegexCache::new();
        let ctx = EvaluationContext::new(&sheet, &NoItems).with_regex_cache(&cache);
        for input in ["a1", "b22", "c333"] {
            let out = call("regex", vec![text(input), text(r"\d+")], &ctx).unwrap();
            assert_eq!(out.to_string().len() + 1, input.len());
        }
        let out = call("replace_regex", vec![text("a-b"), text("-"), text("+")], &ctx).unwrap();
        assert_eq!(out, text("a+b"));
        assert_eq!(cache.len(), 2);

        assert!(call("regex", vec![text("x"), text("(")], &ctx).is_err());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_extract_date_format_fallback() {
        let out = run("extract_date", vec![text("2019"), text("%d/%m/%Y"), text("%Y")]).unwrap();
        assert_eq!(out, text("2019-01-01T00:00:00"));
        assert!(run("extract_date", vec![text("soon"), text("%Y")]).is_err());
    }

    #[test]
    fn test_instance_of_requires_relations() {
        assert!(matches!(
            run("instance_of", vec![text("Q30"), text("Q6256")]),
            Err(EvaluationError::NoRelations)
        ));

        let mut table = ItemTable::new();
        table.add_instance("Q30", "Q6256");
        let sheet = MemorySheet::default();
        let ctx = EvaluationContext::new(&sheet, &table).with_relations(&table);
        let range = Value::Range(CellRange {
            cells: vec![cell(1, 1, "Q5"), cell(1, 2, "Q30")],
        });
        assert_eq!(call("instance_of", vec![range, text("Q6256")], &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("new YORK city"), "New York City");
    }
}
