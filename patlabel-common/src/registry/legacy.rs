//! Legacy taxonomy document: one top-level element per attribute type
//!
//! ```xml
//! <cloth-types><type>unknown</type><type>cotton</type></cloth-types>
//! <color><type>unknown</type><type>red</type></color>
//! ```
//!
//! Only read, and only so it can be rewritten in canonical form.

use super::{validate, RegistryParts};
use crate::xml;
use crate::Result;
use std::path::Path;

const BACKEND: &str = "legacy";

pub(super) fn read(path: &Path) -> Result<RegistryParts> {
    let text = xml::read_utf8(path, BACKEND)?;
    parse(&text, path)
}

pub(super) fn parse(text: &str, path: &Path) -> Result<RegistryParts> {
    let root = xml::parse_fragment(text, path, BACKEND)?;

    let mut parts = RegistryParts::default();
    for type_element in xml::child_elements(&root) {
        let values = xml::child_elements(type_element)
            .filter(|e| e.name == "type")
            .map(|e| e.get_text().map(|t| t.trim().to_string()).unwrap_or_default())
            .collect();
        parts.types.insert(type_element.name.clone(), values);
    }

    validate(&parts, path, BACKEND)?;
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiple_top_level_types() {
        let doc = "<?xml version=\"1.0\" ?>\n\
                   <cloth-types><type>unknown</type><type>cotton</type></cloth-types>\n\
                   <color><type>unknown</type><type>red</type><note>x</note></color>";
        let parts = parse(doc, Path::new("legacy.xml")).unwrap();
        assert_eq!(parts.types.len(), 2);
        assert_eq!(parts.types["cloth-types"], vec!["unknown", "cotton"]);
        assert_eq!(parts.types["color"], vec!["unknown", "red"]);
        assert!(parts.external.is_empty());
    }

    #[test]
    fn test_malformed_legacy_rejected() {
        let doc = "<cloth-types><type>unknown</type>";
        assert!(parse(doc, Path::new("legacy.xml")).is_err());
    }
}
