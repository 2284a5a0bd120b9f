//! Records shared by subject images and patterns
//!
//! A record carries identity fields, image references and an attribute map
//! holding one selected value index per registered attribute type. The map is
//! always complete: construction fills every type with the sentinel.

use crate::registry::TypeRegistry;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One subject image set or one pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Identity; also the image subdirectory name below the project root
    pub base_name: String,

    /// Id in the external catalogue the subject was imported from
    pub external_id: Option<String>,

    /// Title in the external catalogue
    pub external_title: Option<String>,

    pub url: Option<String>,

    /// Absolute image paths, in display order
    pub images: Vec<PathBuf>,

    attributes: BTreeMap<String, usize>,

    /// Pattern this subject is assigned to (subjects only)
    mapped_pattern: Option<String>,
}

impl Record {
    /// New record with every registered type at the sentinel
    pub fn new(registry: &TypeRegistry, base_name: impl Into<String>) -> Self {
        Self {
            base_name: base_name.into(),
            external_id: None,
            external_title: None,
            url: None,
            images: Vec::new(),
            attributes: registry.default_attributes(),
            mapped_pattern: None,
        }
    }

    /// Selected value index per attribute type
    pub fn attributes(&self) -> &BTreeMap<String, usize> {
        &self.attributes
    }

    pub fn attribute_index(&self, type_name: &str) -> Option<usize> {
        self.attributes.get(type_name).copied()
    }

    /// Selected value string of one attribute type
    pub fn attribute<'r>(&self, registry: &'r TypeRegistry, type_name: &str) -> Option<&'r str> {
        let index = self.attributes.get(type_name)?;
        registry.value_at(type_name, *index)
    }

    /// Select `value` for `type_name`
    ///
    /// Fails with `UnknownValue`/`UnknownType` and leaves the record untouched
    /// when the registry does not know the pair.
    pub fn set_attribute(&mut self, registry: &TypeRegistry, type_name: &str, value: &str) -> Result<()> {
        let index = registry.index_of(type_name, value)?;
        self.attributes.insert(type_name.to_string(), index);
        Ok(())
    }

    /// Select a value by index
    pub fn set_attribute_index(&mut self, registry: &TypeRegistry, type_name: &str, index: usize) -> Result<()> {
        let values = registry
            .values_of(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))?;
        if index >= values.len() {
            return Err(Error::UnknownValue {
                type_name: type_name.to_string(),
                value: format!("#{}", index),
            });
        }
        self.attributes.insert(type_name.to_string(), index);
        Ok(())
    }

    /// Put every attribute back to the sentinel
    pub fn reset_attributes(&mut self, registry: &TypeRegistry) {
        self.attributes = registry.default_attributes();
    }

    /// Apply an external attribute through the registry's vocabulary mapping
    ///
    /// Returns `Ok(false)` when the registry has no mapping for the pair.
    pub fn apply_external(
        &mut self,
        registry: &TypeRegistry,
        external_name: &str,
        external_value: &str,
    ) -> Result<bool> {
        match registry.resolve_external(external_name, external_value) {
            Some((local_type, local_value)) => {
                self.set_attribute(registry, local_type, local_value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Assigned pattern name, `None` when unassigned
    pub fn mapped_pattern(&self) -> Option<&str> {
        self.mapped_pattern.as_deref()
    }

    /// Set the assigned pattern; an empty name clears the assignment
    pub fn set_mapped_pattern(&mut self, name: Option<&str>) {
        self.mapped_pattern = name.filter(|n| !n.is_empty()).map(str::to_string);
    }

    /// Stored form of the image references (file names only)
    pub fn image_file_names(&self) -> impl Iterator<Item = String> + '_ {
        self.images.iter().map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Image references re-resolved below `root`
    pub fn image_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.image_file_names()
            .map(|file| self.image_path(root, &file))
            .collect()
    }

    /// Runtime path of a stored image file name: `<root>/<base_name>/<file>`
    pub fn image_path(&self, root: &Path, file_name: &str) -> PathBuf {
        root.join(&self.base_name).join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_types([
            ("cloth-types", vec!["unknown", "cotton", "silk"]),
            ("color", vec!["unknown", "red", "blue"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_record_has_sentinel_everywhere() {
        let reg = registry();
        let record = Record::new(&reg, "img001");
        assert_eq!(record.attributes(), &reg.default_attributes());
        assert_eq!(record.attribute(&reg, "color"), Some("unknown"));
        assert_eq!(record.mapped_pattern(), None);
    }

    #[test]
    fn test_set_attribute_unknown_value_leaves_record_untouched() {
        let reg = registry();
        let mut record = Record::new(&reg, "img001");
        record.set_attribute(&reg, "color", "red").unwrap();

        let err = record.set_attribute(&reg, "color", "green").unwrap_err();
        assert!(matches!(err, Error::UnknownValue { .. }));
        assert_eq!(record.attribute(&reg, "color"), Some("red"));

        assert!(record.set_attribute(&reg, "size", "xl").is_err());
        assert_eq!(record.attributes().len(), 2);
    }

    #[test]
    fn test_set_attribute_index_bounds() {
        let reg = registry();
        let mut record = Record::new(&reg, "img001");
        record.set_attribute_index(&reg, "cloth-types", 2).unwrap();
        assert_eq!(record.attribute(&reg, "cloth-types"), Some("silk"));
        assert!(record.set_attribute_index(&reg, "cloth-types", 3).is_err());
        assert_eq!(record.attribute_index("cloth-types"), Some(2));
    }

    #[test]
    fn test_apply_external_mapping() {
        let mut reg = registry();
        reg.add_external_mapping("fabric", "cloth-types", "100% silk", "silk")
            .unwrap();
        let mut record = Record::new(&reg, "img001");

        assert!(record.apply_external(&reg, "fabric", "100% silk").unwrap());
        assert_eq!(record.attribute(&reg, "cloth-types"), Some("silk"));
        assert!(!record.apply_external(&reg, "fabric", "wool").unwrap());
    }

    #[test]
    fn test_empty_mapped_pattern_means_unassigned() {
        let reg = registry();
        let mut record = Record::new(&reg, "img001");
        record.set_mapped_pattern(Some("P1"));
        assert_eq!(record.mapped_pattern(), Some("P1"));
        record.set_mapped_pattern(Some(""));
        assert_eq!(record.mapped_pattern(), None);
    }

    #[test]
    fn test_image_file_names_strip_directories() {
        let reg = registry();
        let mut record = Record::new(&reg, "img001");
        let root = Path::new("/data/project");
        let front = record.image_path(root, "front.jpg");
        record.images.push(front);
        record.images.push(PathBuf::from("back.png"));

        assert_eq!(record.images[0], PathBuf::from("/data/project/img001/front.jpg"));
        let names: Vec<_> = record.image_file_names().collect();
        assert_eq!(names, vec!["front.jpg", "back.png"]);
    }
}
