//! Candidate ranking for a query record
//!
//! Matching is rule-based attribute equality with a wildcard: the sentinel
//! value (index 0) on either side matches anything. Candidates are ordered by
//! usage count, with the query's current assignment pinned in front.

use crate::catalog::PatternCatalog;
use crate::mapping::MappingTable;
use crate::record::Record;
use crate::registry::SENTINEL_INDEX;

/// Attribute type compared in single-attribute mode by convention
pub const DEFAULT_MATCH_AXIS: &str = "cloth-types";

/// Which attributes take part in matching
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Every attribute type must agree (or be a wildcard)
    #[default]
    FullAttribute,
    /// Only the named attribute type is compared
    SingleAttribute(String),
}

impl MatchMode {
    /// Single-attribute mode on the conventional cloth-types axis
    pub fn cloth_types_only() -> Self {
        MatchMode::SingleAttribute(DEFAULT_MATCH_AXIS.to_string())
    }
}

fn values_agree(a: usize, b: usize) -> bool {
    a == b || a == SENTINEL_INDEX || b == SENTINEL_INDEX
}

/// Match predicate between two records (symmetric)
///
/// Full mode fails outright if the two attribute maps cover different type
/// sets. Single mode fails if either side lacks the designated type.
pub fn is_match(a: &Record, b: &Record, mode: &MatchMode) -> bool {
    match mode {
        MatchMode::FullAttribute => {
            let (left, right) = (a.attributes(), b.attributes());
            left.len() == right.len()
                && left.iter().zip(right.iter()).all(|((lk, lv), (rk, rv))| {
                    lk == rk && values_agree(*lv, *rv)
                })
        }
        MatchMode::SingleAttribute(type_name) => {
            match (a.attribute_index(type_name), b.attribute_index(type_name)) {
                (Some(lv), Some(rv)) => values_agree(lv, rv),
                _ => false,
            }
        }
    }
}

/// One ranked pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub pattern: &'a Record,
    /// Usage count at ranking time
    pub usage: usize,
    /// The query's current assignment, shown first regardless of matching
    pub pinned: bool,
}

/// Rank catalog patterns for `query`
///
/// The query's resolvable assignment comes first, then every other matching
/// pattern by usage count descending. Equal counts keep catalog order (the
/// sort is stable); that order carries no meaning.
pub fn rank<'a>(
    query: &Record,
    catalog: &'a PatternCatalog,
    table: &MappingTable,
    mode: &MatchMode,
) -> Vec<Candidate<'a>> {
    let pinned = query
        .mapped_pattern()
        .and_then(|name| catalog.get(name))
        .map(|pattern| Candidate {
            pattern,
            usage: table.count_of(&pattern.base_name),
            pinned: true,
        });

    let pinned_name = pinned.map(|c| c.pattern.base_name.as_str());
    let mut ranked: Vec<Candidate<'a>> = catalog
        .iter()
        .filter(|pattern| Some(pattern.base_name.as_str()) != pinned_name)
        .filter(|pattern| is_match(query, pattern, mode))
        .map(|pattern| Candidate {
            pattern,
            usage: table.count_of(&pattern.base_name),
            pinned: false,
        })
        .collect();
    ranked.sort_by(|a, b| b.usage.cmp(&a.usage));

    pinned.into_iter().chain(ranked).collect()
}
