//! Annotation documents survive save and reload

use pretty_assertions::assert_eq;

use t2wml::annotation::BlockDocument;
use t2wml::{Annotation, GenerationConfig, Role};

const DOCUMENT: &str = r#"[
    {"id": "subject", "role": "mainSubject", "type": "wikibaseitem",
     "selection": {"x1": 1, "y1": 2, "x2": 1, "y2": 6}},
    {"id": "data", "role": "dependentVar", "type": "quantity",
     "selection": {"x1": 2, "y1": 2, "x2": 3, "y2": 6}},
    {"id": "headers", "role": "property",
     "selection": {"x1": 2, "y1": 1, "x2": 3, "y2": 1}},
    {"id": "units", "role": "unit",
     "selection": {"x1": 4, "y1": 2, "x2": 4, "y2": 6}},
    {"id": "year", "role": "qualifier", "type": "time", "property": "P585",
     "selection": {"x1": 5, "y1": 2, "x2": 5, "y2": 6}, "format": ["%Y"]},
    {"id": "notes", "role": "metadata",
     "selection": {"x1": 1, "y1": 8, "x2": 5, "y2": 9}, "title": "footnotes"}
]"#;

fn essentials(docs: &[BlockDocument]) -> Vec<(Option<String>, Option<String>, Option<String>)> {
    docs.iter()
        .map(|d| (d.id.clone(), d.role.clone(), d.value_type.clone()))
        .collect()
}

#[test]
fn test_save_and_reload_preserves_blocks() {
    let config = GenerationConfig::default();
    let mut original = Annotation::from_json(DOCUMENT).expect("Should load");
    let saved = original.save(&config).expect("Should save");

    let mut reloaded = Annotation::from_json(&saved).expect("Should reload");
    let resaved = reloaded.save(&config).expect("Should save again");

    let before: Vec<BlockDocument> = serde_json::from_str(&saved).unwrap();
    let after: Vec<BlockDocument> = serde_json::from_str(&resaved).unwrap();
    assert_eq!(essentials(&before), essentials(&after));
    assert_eq!(before, after);
    assert_eq!(
        original.blocks().iter().map(|b| b.rect).collect::<Vec<_>>(),
        reloaded.blocks().iter().map(|b| b.rect).collect::<Vec<_>>()
    );
}

#[test]
fn test_links_are_written_on_both_sides() {
    let mut annotation = Annotation::from_json(DOCUMENT).unwrap();
    let saved = annotation.save(&GenerationConfig::default()).unwrap();
    let docs: Vec<BlockDocument> = serde_json::from_str(&saved).unwrap();

    let by_id = |id: &str| docs.iter().find(|d| d.id.as_deref() == Some(id)).unwrap();
    assert_eq!(by_id("headers").link.as_deref(), Some("data"));
    assert_eq!(by_id("units").link.as_deref(), Some("data"));
    assert_eq!(by_id("subject").link.as_deref(), Some("data"));

    let data = by_id("data");
    assert_eq!(data.links.get("property").map(String::as_str), Some("headers"));
    assert_eq!(data.links.get("unit").map(String::as_str), Some("units"));
    assert_eq!(data.links.get("mainSubject").map(String::as_str), Some("subject"));
    assert!(by_id("notes").link.is_none());
    assert_eq!(by_id("year").extra["format"], serde_json::json!(["%Y"]));
}

#[test]
fn test_stale_links_are_recomputed() {
    let tampered = DOCUMENT.replace(
        r#"{"id": "units", "role": "unit","#,
        r#"{"id": "units", "role": "unit", "link": "year","#,
    );
    let mut annotation = Annotation::from_json(&tampered).unwrap();
    annotation.initialize(&GenerationConfig::default());
    assert_eq!(annotation.block("units").unwrap().link.as_deref(), Some("data"));
    let year = annotation.block("year").unwrap();
    assert!(!year.matches.contains_key(&Role::Unit));
}

#[test]
fn test_initialize_twice_is_stable() {
    let mut annotation = Annotation::from_json(DOCUMENT).unwrap();
    let config = GenerationConfig::default();
    let first = annotation.save(&config).unwrap();
    let second = annotation.save(&config).unwrap();
    assert_eq!(first, second);
    assert!(annotation.is_initialized());
}
