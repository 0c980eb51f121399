//! End-to-end tests: annotation -> template -> statements

use pretty_assertions::assert_eq;

use t2wml::{
    annotate, generate, CalendarPolicy, DictionaryProvider, GenerationConfig, ItemTable, KnowledgeGraph,
    MemorySheet, PropertyType, Session, StatementMapping,
};

fn countries() -> MemorySheet {
    MemorySheet::from_rows(
        "countries",
        vec![
            vec!["Peru", "33,000"],
            vec!["Chile", "19"],
            vec!["Spain", "47"],
        ],
    )
}

fn items() -> ItemTable {
    let mut items = ItemTable::new();
    items.insert_value("", "Peru", "Q419");
    items.insert_value("", "Chile", "Q298");
    items.insert_value("", "Spain", "Q29");
    items
}

fn provider() -> DictionaryProvider {
    DictionaryProvider::new()
        .with_entry("P1082", PropertyType::Quantity)
        .with_entry("P585", PropertyType::Time)
}

const ANNOTATION: &str = r#"[
    {"id": "country", "role": "mainSubject", "type": "wikibaseitem",
     "selection": {"x1": 1, "y1": 1, "x2": 1, "y2": 3}},
    {"id": "population", "role": "dependentVar", "type": "quantity", "property": "P1082",
     "selection": {"x1": 2, "y1": 1, "x2": 2, "y2": 3}}
]"#;

#[test]
fn test_annotation_to_statements() {
    let yaml = annotate(ANNOTATION, &GenerationConfig::default()).expect("Should infer a template");
    assert!(yaml.starts_with("#AUTO-GENERATED YAML"));
    assert!(yaml.contains("subject: =item[A, $row]"));
    assert!(yaml.contains("value: =make_numeric(value[$col, $row])"));
    assert!(!yaml.contains("qualifier"));

    let (sheet, items, provider) = (countries(), items(), provider());
    let session = Session::new(&sheet, &items, &provider);
    let graph = generate(&yaml, &session).expect("Should generate");

    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
    let rows: Vec<(&str, Option<&str>, Option<&str>)> = graph
        .statements
        .iter()
        .map(|(cell, s)| (cell.as_str(), s.subject.as_deref(), s.node.value.as_deref()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("B1", Some("Q419"), Some("33000")),
            ("B2", Some("Q298"), Some("19")),
            ("B3", Some("Q29"), Some("47")),
        ]
    );
    assert!(graph.statements.values().all(|s| s.qualifier.is_empty()));

    let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
    assert_eq!(json["statements"]["B1"]["property"], "P1082");
    assert!(json["statements"]["B1"].get("qualifier").is_none());
}

#[test]
fn test_unknown_subject_is_reported_per_cell() {
    let mut sheet_rows = vec![vec!["Peru", "1"], vec!["Atlantis", "2"]];
    sheet_rows.push(vec!["Spain", "3"]);
    let sheet = MemorySheet::from_rows("s", sheet_rows);
    let (items, provider) = (items(), provider());
    let session = Session::new(&sheet, &items, &provider);

    let yaml = annotate(ANNOTATION, &GenerationConfig::default()).unwrap();
    let graph = generate(&yaml, &session).unwrap();
    assert_eq!(graph.statements.len(), 2);
    assert!(graph.errors["B2"]["subject"].contains("Atlantis"));
}

#[test]
fn test_custom_annotation_key_reaches_statements() {
    let annotation = ANNOTATION.replace(
        r#""property": "P1082","#,
        r#""property": "P1082", "source": "census 2020", "time_zone": 0,"#,
    );
    let yaml = annotate(&annotation, &GenerationConfig::default()).unwrap();
    assert!(yaml.contains("    source: census 2020\n"), "{yaml}");
    assert!(yaml.contains("    time_zone: 0\n"), "{yaml}");

    let (sheet, items, provider) = (countries(), items(), provider());
    let session = Session::new(&sheet, &items, &provider);
    let graph = generate(&yaml, &session).unwrap();
    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
    let fields = &graph.statements["B2"].node.additional_fields;
    assert_eq!(fields.get("source").map(String::as_str), Some("census 2020"));
    assert_eq!(fields.get("time_zone").map(String::as_str), Some("0"));

    let json: serde_json::Value = serde_json::from_str(&graph.to_json().unwrap()).unwrap();
    assert_eq!(json["statements"]["B2"]["source"], "census 2020");
}

fn ethiopian_sheet() -> MemorySheet {
    MemorySheet::from_rows("s", vec![vec!["Peru", "5", "2011-01-01T00:00:00"]])
}

const ETHIOPIAN_QUALIFIER: &str = r#"
statementMapping:
  region:
    range: B1
  template:
    subject: =item[A, $row]
    property: P1082
    value: =value[B, $row]
    qualifier:
      - property: P585
        value: =value[C, $row]
        calendar: Q215271
"#;

fn generate_with_policy(policy: CalendarPolicy, yaml: &str) -> KnowledgeGraph {
    let (sheet, items, provider) = (ethiopian_sheet(), items(), provider());
    let session = Session::new(&sheet, &items, &provider)
        .with_config(GenerationConfig::new().with_calendar_policy(policy));
    let mapping = StatementMapping::from_yaml(yaml).unwrap();
    KnowledgeGraph::generate(&mapping, &session).unwrap()
}

#[test]
fn test_calendar_leave() {
    let graph = generate_with_policy(CalendarPolicy::Leave, ETHIOPIAN_QUALIFIER);
    let qualifiers = &graph.statements["B1"].qualifier;
    assert_eq!(qualifiers.len(), 1);
    assert_eq!(qualifiers[0].value.as_deref(), Some("2011-01-01T00:00:00"));
    assert_eq!(qualifiers[0].calendar.as_deref(), Some("Q215271"));
}

#[test]
fn test_calendar_replace() {
    let graph = generate_with_policy(CalendarPolicy::Replace, ETHIOPIAN_QUALIFIER);
    let qualifiers = &graph.statements["B1"].qualifier;
    assert_eq!(qualifiers.len(), 1);
    assert_eq!(qualifiers[0].value.as_deref(), Some("2018-09-11T00:00:00"));
    assert_eq!(qualifiers[0].calendar.as_deref(), Some("Q1985727"));
}

#[test]
fn test_calendar_add() {
    let graph = generate_with_policy(CalendarPolicy::Add, ETHIOPIAN_QUALIFIER);
    let values: Vec<(Option<&str>, Option<&str>)> = graph.statements["B1"]
        .qualifier
        .iter()
        .map(|q| (q.value.as_deref(), q.calendar.as_deref()))
        .collect();
    assert_eq!(
        values,
        vec![
            (Some("2011-01-01T00:00:00"), Some("Q215271")),
            (Some("2018-09-11T00:00:00"), Some("Q1985727")),
        ]
    );
}

#[test]
fn test_calendar_add_on_statement_value() {
    let yaml = r#"
statementMapping:
  region:
    range: C1
  template:
    subject: =item[A, $row]
    property: P585
    value: =value[C, $row]
    calendar: Q215271
"#;
    let graph = generate_with_policy(CalendarPolicy::Add, yaml);
    let statement = &graph.statements["C1"];
    assert_eq!(statement.node.value.as_deref(), Some("2011-01-01T00:00:00"));
    assert_eq!(statement.qualifier.len(), 1);
    assert_eq!(statement.qualifier[0].property.as_deref(), Some("P585"));
    assert_eq!(statement.qualifier[0].value.as_deref(), Some("2018-09-11T00:00:00"));
}

#[test]
fn test_search_for_section_label() {
    let sheet = MemorySheet::from_rows(
        "s",
        vec![
            vec!["Peru", ""],
            vec!["", "10"],
            vec!["", "20"],
            vec!["Chile", ""],
            vec!["", "30"],
        ],
    );
    let (items, provider) = (items(), provider());
    let session = Session::new(&sheet, &items, &provider);
    let yaml = r#"
statementMapping:
  region:
    left: B
    right: B
    skip_rows: =value[B, $row] == ""
  template:
    subject: =item[A, $row - $n]
    property: P1082
    value: =value[B, $row]
"#;
    let graph = generate(yaml, &session).unwrap();
    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
    let subjects: Vec<_> = graph
        .statements
        .values()
        .map(|s| s.subject.clone().unwrap_or_default())
        .collect();
    assert_eq!(subjects, vec!["Q419", "Q419", "Q298"]);
}
