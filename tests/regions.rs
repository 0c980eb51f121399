//! Region resolution properties

use std::collections::BTreeSet;

use proptest::prelude::*;

use t2wml::expr::NoItems;
use t2wml::region::{Scalar, ScalarList};
use t2wml::sheet::Coordinate;
use t2wml::{EvaluationContext, MemorySheet, RegionError, RegionSpec};

fn sheet() -> MemorySheet {
    MemorySheet::from_rows("s", vec![vec!["1", "2", "3", "4"]; 6])
}

fn cells_only(labels: &[String]) -> RegionSpec {
    RegionSpec {
        cells: Some(ScalarList::Many(labels.iter().cloned().map(Scalar::Text).collect())),
        ..RegionSpec::default()
    }
}

#[test]
fn test_box_with_skips() {
    let sheet = sheet();
    let ctx = EvaluationContext::new(&sheet, &NoItems);
    let spec: RegionSpec = serde_yaml::from_str("range: A1:C3\nskip_columns: B\nskip_row: 2\n").unwrap();
    let region = spec.resolve(&ctx).unwrap();
    let labels: Vec<String> = region.iter().map(|c| c.label()).collect();
    assert_eq!(labels, vec!["A1", "A3", "C1", "C3"]);
}

#[test]
fn test_unknown_region_key_rejected() {
    let err = serde_yaml::from_str::<RegionSpec>("range: A1:C3\nskip_colums: B\n").unwrap_err();
    assert!(err.to_string().contains("skip_colums"));
}

#[test]
fn test_skipping_everything_is_empty() {
    let sheet = sheet();
    let ctx = EvaluationContext::new(&sheet, &NoItems);
    let spec: RegionSpec = serde_yaml::from_str("range: A1:A2\nskip_rows: [1, 2]\n").unwrap();
    assert!(matches!(spec.resolve(&ctx), Err(RegionError::Empty)));
}

proptest! {
    #[test]
    fn cells_only_resolves_to_exactly_those_cells(
        picks in prop::collection::vec((1usize..12, 1usize..30), 1..8),
        reverse in any::<bool>(),
    ) {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let mut labels: Vec<String> = picks.iter().map(|&(c, r)| Coordinate::new(c, r).label()).collect();
        if reverse {
            labels.reverse();
        }
        let region = cells_only(&labels).resolve(&ctx).unwrap();
        let expected: BTreeSet<Coordinate> = picks.iter().map(|&(c, r)| Coordinate::new(c, r)).collect();
        let actual: BTreeSet<Coordinate> = region.iter().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn inverted_bounds_violate_constraints(left in 2i64..6, gap in 1i64..3) {
        let sheet = sheet();
        let ctx = EvaluationContext::new(&sheet, &NoItems);
        let spec = RegionSpec {
            left: Some(Scalar::Int(left)),
            right: Some(Scalar::Int(left - gap)),
            ..RegionSpec::default()
        };
        let err = spec.resolve(&ctx).unwrap_err();
        prop_assert!(err.is_constraint_violation());
    }
}
