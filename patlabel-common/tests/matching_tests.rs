//! Ranking scenarios and usage-count bookkeeping across the public API

use patlabel_common::matching::is_match;
use patlabel_common::{rank, MappingTable, MatchMode, PatternCatalog, Record, TypeRegistry};

fn registry() -> TypeRegistry {
    TypeRegistry::from_types([
        ("cloth-types", vec!["unknown", "cotton", "silk"]),
        ("color", vec!["unknown", "red", "blue"]),
    ])
    .unwrap()
}

fn record(reg: &TypeRegistry, name: &str, cloth: &str, color: &str) -> Record {
    let mut r = Record::new(reg, name);
    r.set_attribute(reg, "cloth-types", cloth).unwrap();
    r.set_attribute(reg, "color", color).unwrap();
    r
}

fn names(ranked: &[patlabel_common::Candidate<'_>]) -> Vec<String> {
    ranked.iter().map(|c| c.pattern.base_name.clone()).collect()
}

#[test]
fn test_usage_count_orders_wildcard_and_exact_matches() {
    let reg = registry();
    let catalog = PatternCatalog::from_records(vec![
        record(&reg, "P1", "cotton", "unknown"),
        record(&reg, "P2", "cotton", "red"),
    ])
    .unwrap();
    let query = record(&reg, "Q", "cotton", "red");

    // P2 used more often
    let mut subjects = vec![
        record(&reg, "s1", "cotton", "red"),
        record(&reg, "s2", "cotton", "red"),
        record(&reg, "s3", "cotton", "red"),
    ];
    let mut table = MappingTable::new(&subjects, &catalog);
    table.reassign(&mut subjects[0], "P2");
    table.reassign(&mut subjects[1], "P2");
    table.reassign(&mut subjects[2], "P1");
    let ranked = rank(&query, &catalog, &table, &MatchMode::FullAttribute);
    assert_eq!(names(&ranked), ["P2", "P1"]);

    // Reverse the counts
    table.reassign(&mut subjects[0], "P1");
    table.reassign(&mut subjects[1], "P1");
    let ranked = rank(&query, &catalog, &table, &MatchMode::FullAttribute);
    assert_eq!(names(&ranked), ["P1", "P2"]);
    assert_eq!(ranked[0].usage, 3);
    assert_eq!(ranked[1].usage, 0);
}

#[test]
fn test_match_is_symmetric() {
    let reg = registry();
    let values = ["unknown", "cotton", "silk"];
    let colors = ["unknown", "red", "blue"];
    let mut records = Vec::new();
    for cloth in values {
        for color in colors {
            records.push(record(&reg, &format!("{}-{}", cloth, color), cloth, color));
        }
    }
    let modes = [
        MatchMode::FullAttribute,
        MatchMode::cloth_types_only(),
        MatchMode::SingleAttribute("color".to_string()),
    ];
    for a in &records {
        for b in &records {
            for mode in &modes {
                assert_eq!(is_match(a, b, mode), is_match(b, a, mode), "{} vs {}", a.base_name, b.base_name);
            }
        }
    }
}

#[test]
fn test_incremental_counts_match_rebuild() {
    let reg = registry();
    let mut catalog = PatternCatalog::from_records(vec![
        record(&reg, "P1", "cotton", "red"),
        record(&reg, "P2", "silk", "blue"),
        record(&reg, "P3", "unknown", "unknown"),
    ])
    .unwrap();
    let mut subjects: Vec<Record> = (0..4)
        .map(|i| record(&reg, &format!("s{}", i), "cotton", "red"))
        .collect();
    let mut table = MappingTable::new(&subjects, &catalog);

    let script = [(0, "P1"), (1, "P1"), (0, "P2"), (2, "P3"), (2, "P3"), (3, "missing"), (1, "P2")];
    for (subject, pattern) in script {
        table.reassign(&mut subjects[subject], pattern);
        assert!(table.is_consistent_with(&subjects, &catalog));
    }
    assert_eq!(table.count_of("P2"), 2);

    // Removing a pattern leaves dangling assignments that no longer count
    catalog.remove("P2");
    table.rebuild(&subjects, &catalog);
    assert!(!table.resolves("P2"));
    assert_eq!(table.count_of("P2"), 0);
    assert!(table.is_consistent_with(&subjects, &catalog));
}
