//! Usage-frequency mapping table
//!
//! Derived index from pattern name to (catalog position, usage count), where
//! the usage count is the number of subjects assigned to that pattern.
//!
//! Two maintenance paths:
//! - `rebuild`: recompute from scratch. Required after any structural catalog
//!   edit (add/remove), since positions and counts cannot be patched safely.
//! - `reassign`: +1/-1 delta when one subject's assignment changes.
//!
//! `is_consistent_with` cross-checks the incremental path against a rebuild.

use crate::catalog::PatternCatalog;
use crate::project::ProjectState;
use crate::record::Record;
use std::collections::HashMap;

/// Table entry for one catalog pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    /// Position of the pattern in the catalog
    pub position: usize,
    /// Number of subjects assigned to the pattern
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: HashMap<String, MappingEntry>,
}

impl MappingTable {
    /// Build a table for `catalog` from the subjects' assignments
    pub fn new(subjects: &[Record], catalog: &PatternCatalog) -> Self {
        let mut table = Self::default();
        table.rebuild(subjects, catalog);
        table
    }

    /// Build a table straight from a loaded document
    pub fn from_state(state: &ProjectState) -> Self {
        let mut table = Self::default();
        table.rebuild_from(&state.subjects, &state.patterns);
        table
    }

    /// Clear and recompute every entry
    pub fn rebuild(&mut self, subjects: &[Record], catalog: &PatternCatalog) {
        self.rebuild_from(subjects, catalog.records());
    }

    fn rebuild_from(&mut self, subjects: &[Record], patterns: &[Record]) {
        self.entries.clear();
        for (position, pattern) in patterns.iter().enumerate() {
            self.entries
                .insert(pattern.base_name.clone(), MappingEntry { position, count: 0 });
        }
        for subject in subjects {
            if let Some(entry) = subject
                .mapped_pattern()
                .and_then(|name| self.entries.get_mut(name))
            {
                entry.count += 1;
            }
        }
    }

    /// Point `subject` at `new_pattern`, adjusting counts
    ///
    /// Repeating the current assignment is a no-op. A prior assignment that no
    /// longer resolves (pattern removed) is not decremented; counts never go
    /// below zero. A new name that does not resolve is stored but not counted.
    /// Returns whether the assignment changed.
    pub fn reassign(&mut self, subject: &mut Record, new_pattern: &str) -> bool {
        if subject.mapped_pattern().unwrap_or_default() == new_pattern {
            return false;
        }

        if let Some(entry) = subject
            .mapped_pattern()
            .and_then(|old| self.entries.get_mut(old))
        {
            entry.count = entry.count.saturating_sub(1);
        }

        subject.set_mapped_pattern(Some(new_pattern));

        if let Some(entry) = self.entries.get_mut(new_pattern) {
            entry.count += 1;
        }
        true
    }

    /// Usage count of a pattern (0 when unknown)
    pub fn count_of(&self, name: &str) -> usize {
        self.entries.get(name).map_or(0, |e| e.count)
    }

    /// Catalog position of a pattern
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.entries.get(name).map(|e| e.position)
    }

    /// Whether a pattern name resolves in the catalog this table was built for
    pub fn resolves(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by usage count descending, then name
    pub fn entries(&self) -> Vec<(&str, MappingEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), *entry))
            .collect();
        entries.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// True when this table equals a fresh rebuild from the same data
    pub fn is_consistent_with(&self, subjects: &[Record], catalog: &PatternCatalog) -> bool {
        *self == Self::new(subjects, catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    fn setup() -> (Vec<Record>, PatternCatalog) {
        let reg = TypeRegistry::from_types([("cloth-types", vec!["unknown", "cotton"])]).unwrap();
        let catalog = PatternCatalog::from_records(vec![
            Record::new(&reg, "P1"),
            Record::new(&reg, "P2"),
        ])
        .unwrap();
        let subjects = (0..4)
            .map(|i| Record::new(&reg, format!("img{}", i)))
            .collect();
        (subjects, catalog)
    }

    #[test]
    fn test_rebuild_counts_resolving_assignments_only() {
        let (mut subjects, catalog) = setup();
        subjects[0].set_mapped_pattern(Some("P1"));
        subjects[1].set_mapped_pattern(Some("P1"));
        subjects[2].set_mapped_pattern(Some("gone"));

        let table = MappingTable::new(&subjects, &catalog);
        assert_eq!(table.count_of("P1"), 2);
        assert_eq!(table.count_of("P2"), 0);
        assert_eq!(table.count_of("gone"), 0);
        assert!(!table.resolves("gone"));
        assert_eq!(table.position_of("P2"), Some(1));
    }

    #[test]
    fn test_reassign_repeat_is_noop() {
        let (mut subjects, catalog) = setup();
        let mut table = MappingTable::new(&subjects, &catalog);

        assert!(table.reassign(&mut subjects[0], "P1"));
        assert!(!table.reassign(&mut subjects[0], "P1"));
        assert_eq!(table.count_of("P1"), 1);
    }

    #[test]
    fn test_reassign_moves_count() {
        let (mut subjects, catalog) = setup();
        let mut table = MappingTable::new(&subjects, &catalog);

        table.reassign(&mut subjects[0], "P1");
        table.reassign(&mut subjects[0], "P2");
        assert_eq!(table.count_of("P1"), 0);
        assert_eq!(table.count_of("P2"), 1);
        assert_eq!(subjects[0].mapped_pattern(), Some("P2"));
    }

    #[test]
    fn test_reassign_after_pattern_removed() {
        let (mut subjects, mut catalog) = setup();
        let mut table = MappingTable::new(&subjects, &catalog);
        table.reassign(&mut subjects[0], "P1");

        catalog.remove("P1");
        table.rebuild(&subjects, &catalog);

        // dangling old assignment: nothing to decrement
        assert!(table.reassign(&mut subjects[0], "P2"));
        assert_eq!(table.count_of("P2"), 1);
        assert!(table.is_consistent_with(&subjects, &catalog));
    }

    #[test]
    fn test_incremental_matches_rebuild() {
        let (mut subjects, catalog) = setup();
        let mut table = MappingTable::new(&subjects, &catalog);

        let script = [(0, "P1"), (1, "P1"), (2, "P2"), (0, "P2"), (1, ""), (3, "nope"), (3, "P1"), (2, "P2")];
        for (subject, pattern) in script {
            table.reassign(&mut subjects[subject], pattern);
            assert!(table.is_consistent_with(&subjects, &catalog));
        }
        assert_eq!(table.count_of("P1"), 1);
        assert_eq!(table.count_of("P2"), 2);
    }

    #[test]
    fn test_entries_sorted_by_count() {
        let (mut subjects, catalog) = setup();
        let mut table = MappingTable::new(&subjects, &catalog);
        table.reassign(&mut subjects[0], "P2");

        let entries = table.entries();
        assert_eq!(entries[0].0, "P2");
        assert_eq!(entries[1].0, "P1");
    }

    #[test]
    fn test_from_state_matches_catalog_build() {
        let (mut subjects, catalog) = setup();
        subjects[0].set_mapped_pattern(Some("P2"));
        subjects[1].set_mapped_pattern(Some("gone"));
        let state = ProjectState::new(subjects.clone(), catalog.records().to_vec());

        let table = MappingTable::from_state(&state);
        assert_eq!(table, MappingTable::new(&subjects, &catalog));
        assert_eq!(table.count_of("P2"), 1);
        assert!(!table.resolves("gone"));
    }
}
