//! Pattern catalog: ordered pattern records, unique by base name

use crate::codec::DocumentCodec;
use crate::record::Record;
use crate::registry::{TypeRegistry, SENTINEL_INDEX};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Catch-all attribute value; patterns carrying it are not collected
pub const OTHER_VALUE: &str = "other";

/// Whether a pattern found by [`PatternCatalog::collect_from_dir`] is kept:
/// it must be labelled (some attribute off the sentinel) and no attribute may
/// hold the catch-all value.
pub fn is_collectable(pattern: &Record, registry: &TypeRegistry) -> bool {
    let labelled = pattern.attributes().values().any(|&i| i != SENTINEL_INDEX);
    let catch_all = pattern.attributes().iter().any(|(type_name, &index)| {
        registry
            .value_at(type_name, index)
            .is_some_and(|v| v.eq_ignore_ascii_case(OTHER_VALUE))
    });
    labelled && !catch_all
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCatalog {
    patterns: Vec<Record>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from loaded records; duplicate names are rejected
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut catalog = Self::new();
        for record in records {
            catalog.add(record)?;
        }
        Ok(catalog)
    }

    /// Append a pattern
    pub fn add(&mut self, pattern: Record) -> Result<()> {
        if self.contains(&pattern.base_name) {
            return Err(Error::InvalidInput(format!(
                "Pattern '{}' already in catalog",
                pattern.base_name
            )));
        }
        self.patterns.push(pattern);
        Ok(())
    }

    /// Remove a pattern by name, returning it
    pub fn remove(&mut self, name: &str) -> Option<Record> {
        let position = self.position(name)?;
        Some(self.patterns.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.patterns.iter().find(|p| p.base_name == name)
    }

    /// Set one attribute of a pattern in place; catalog order is unchanged
    pub fn set_attribute(
        &mut self,
        registry: &TypeRegistry,
        name: &str,
        type_name: &str,
        value: &str,
    ) -> Result<()> {
        self.patterns
            .iter_mut()
            .find(|p| p.base_name == name)
            .ok_or_else(|| Error::NotFound(format!("pattern '{}'", name)))?
            .set_attribute(registry, type_name, value)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.patterns.iter().position(|p| p.base_name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.patterns.iter()
    }

    pub fn records(&self) -> &[Record] {
        &self.patterns
    }

    pub fn into_records(self) -> Vec<Record> {
        self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Add every pattern whose name is not yet present; returns how many were added
    pub fn merge(&mut self, others: impl IntoIterator<Item = Record>) -> usize {
        let mut added = 0;
        for pattern in others {
            if !self.contains(&pattern.base_name) {
                self.patterns.push(pattern);
                added += 1;
            }
        }
        added
    }

    /// Collect the pattern sections of every project document in `dir`
    ///
    /// Image folders are resolved below `dir`. Documents that fail to load
    /// are skipped with a warning; the first occurrence of a name wins.
    /// Unlabelled patterns and those of the catch-all type are left out.
    pub fn collect_from_dir(dir: &Path, registry: Arc<TypeRegistry>) -> Result<Self> {
        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        files.sort();

        let codec = DocumentCodec::new(registry, dir);
        let mut catalog = Self::new();
        for file in files {
            match codec.read(&file) {
                Ok(outcome) => {
                    let (keep, ignored): (Vec<_>, Vec<_>) = outcome
                        .state
                        .patterns
                        .into_iter()
                        .partition(|p| is_collectable(p, codec.registry()));
                    for pattern in &ignored {
                        debug!("Ignoring pattern '{}' from {}", pattern.base_name, file.display());
                    }
                    let added = catalog.merge(keep);
                    info!(
                        "Collected {} patterns from {} ({} ignored)",
                        added,
                        file.display(),
                        ignored.len()
                    );
                }
                Err(e) => warn!("Skipping {}: {}", file.display(), e),
            }
        }
        Ok(catalog)
    }
}

impl<'a> IntoIterator for &'a PatternCatalog {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.patterns.iter()
    }
}
