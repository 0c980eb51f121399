//! Expression language through the public API

use t2wml::expr::NoItems;
use t2wml::{compile, EvaluationContext, ItemTable, MemorySheet, Value};

fn sheet() -> MemorySheet {
    MemorySheet::from_rows(
        "s",
        vec![
            vec!["Country", "1990"],
            vec!["Peru", "12"],
            vec!["Chile", "13"],
            vec!["Mars", "14"],
        ],
    )
}

#[test]
fn test_value_reads_user_row() {
    let sheet = sheet();
    let ctx = EvaluationContext::new(&sheet, &NoItems).at(2, 3);
    let out = compile("=value[A, $row]").unwrap().evaluate(&ctx).unwrap();
    assert_eq!(out.as_text().as_deref(), Some("Chile"));
}

#[test]
fn test_instance_of_is_true_if_any_cell_matches() {
    let sheet = sheet();
    let mut items = ItemTable::new();
    items.insert_value("", "Peru", "Q419");
    items.insert_value("", "Mars", "Q111");
    items.add_instance("Q419", "Q6256");
    let ctx = EvaluationContext::new(&sheet, &items).with_relations(&items).at(1, 1);

    let any = compile("=instance_of(item[A, 2:4], \"Q6256\")").unwrap();
    assert_eq!(any.evaluate(&ctx).unwrap(), Value::Bool(true));

    let none = compile("=instance_of(item[A, 3:4], \"Q6256\")").unwrap();
    assert_eq!(none.evaluate(&ctx).unwrap(), Value::Bool(false));
}

#[test]
fn test_literal_fields_are_not_evaluated() {
    let sheet = sheet();
    let ctx = EvaluationContext::new(&sheet, &NoItems);
    assert_eq!(compile("P585").unwrap().evaluate(&ctx).unwrap().to_string(), "P585");
    assert_eq!(compile("/=5").unwrap().evaluate(&ctx).unwrap().to_string(), "=5");
}
