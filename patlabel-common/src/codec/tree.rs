//! DOM project document backend (older layout)
//!
//! Each record is an element named after its sanitized base name; every field
//! is a child element carrying a `value` attribute:
//!
//! ```xml
//! <project>
//!   <patterns>
//!     <Floral-Dress--v2->
//!       <baseName value="Floral Dress (v2)"/>
//!       <url value="http://.."/>
//!       <image value="front.jpg"/>
//!       <cloth-types value="cotton"/>
//!     </Floral-Dress--v2->
//!   </patterns>
//! </project>
//! ```
//!
//! The unmodified name lives in `baseName`, so sanitizing is lossless.

use super::CodecBackend;
use crate::project::ProjectState;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::xml;
use crate::{Error, Result};
use std::path::Path;
use tracing::warn;
use xmltree::{Element, EmitterConfig, XMLNode};

const BACKEND: &str = "tree";

const ROOT: &str = "project";
const SUBJECTS: &str = "subjects";
const PATTERNS: &str = "patterns";

/// Characters replaced by `-` when a base name becomes an element name
const RESERVED: &[char] = &[
    ' ', '(', ')', '\'', '"', '&', '#', '%', '@', '!', '*', '$', '^', '+', ',',
];

/// Element-name form of a base name.
///
/// Reserved characters, and anything else an XML name cannot hold, become
/// `-`. A name that would not start with a letter or `_` gets a `_` prefix.
pub fn sanitize_identifier(name: &str) -> String {
    let mut identifier: String = name
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || !is_name_char(c) {
                '-'
            } else {
                c
            }
        })
        .collect();
    if !identifier.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        identifier.insert(0, '_');
    }
    identifier
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// xmltree reader/writer backend
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBackend;

impl CodecBackend for TreeBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn try_load(&self, path: &Path, root: &Path, registry: &TypeRegistry) -> Result<ProjectState> {
        let bytes = std::fs::read(path)?;
        let document = Element::parse(bytes.as_slice()).map_err(|e| Error::parse(path, BACKEND, e))?;
        if document.name != ROOT {
            return Err(Error::parse(
                path,
                BACKEND,
                format!("unexpected root element <{}>", document.name),
            ));
        }

        let mut state = ProjectState::default();
        for section in xml::child_elements(&document) {
            let target = match section.name.as_str() {
                SUBJECTS => &mut state.subjects,
                PATTERNS => &mut state.patterns,
                other => {
                    return Err(Error::parse(
                        path,
                        BACKEND,
                        format!("unexpected section <{}>", other),
                    ))
                }
            };
            for element in xml::child_elements(section) {
                target.push(read_record(element, path, root, registry)?);
            }
        }
        Ok(state)
    }

    fn try_save(&self, path: &Path, state: &ProjectState, registry: &TypeRegistry) -> Result<()> {
        let mut document = Element::new(ROOT);
        for (name, records) in [(SUBJECTS, &state.subjects), (PATTERNS, &state.patterns)] {
            let mut section = Element::new(name);
            for record in records {
                section
                    .children
                    .push(XMLNode::Element(record_element(record, registry)?));
            }
            document.children.push(XMLNode::Element(section));
        }

        let mut bytes = Vec::new();
        document
            .write_with_config(&mut bytes, EmitterConfig::new().perform_indent(true))
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        crate::config::write_atomic(path, &bytes)
    }
}

fn read_record(element: &Element, path: &Path, root: &Path, registry: &TypeRegistry) -> Result<Record> {
    let mut record = Record::new(registry, "");
    let mut has_base_name = false;
    let mut image_names = Vec::new();

    for field in xml::child_elements(element) {
        let value = field.attributes.get("value").cloned().unwrap_or_default();
        match field.name.as_str() {
            "baseName" => {
                record.base_name = value;
                has_base_name = true;
            }
            "url" => record.url = Some(value),
            "image" => image_names.push(value),
            "jdId" => record.external_id = Some(value),
            "jdTitle" => record.external_title = Some(value),
            "mapped-pattern" => record.set_mapped_pattern(Some(&value)),
            type_name if registry.contains_type(type_name) => {
                if let Err(e) = record.set_attribute(registry, type_name, &value) {
                    warn!("{}: record <{}>: {}", path.display(), element.name, e);
                }
            }
            _ => {}
        }
    }

    if !has_base_name {
        return Err(Error::parse(
            path,
            BACKEND,
            format!("record <{}> has no baseName", element.name),
        ));
    }

    record.images = image_names
        .iter()
        .map(|file| record.image_path(root, file))
        .collect();
    Ok(record)
}

fn value_element(name: &str, value: &str) -> XMLNode {
    let mut element = Element::new(name);
    element
        .attributes
        .insert("value".to_string(), value.to_string());
    XMLNode::Element(element)
}

fn record_element(record: &Record, registry: &TypeRegistry) -> Result<Element> {
    let identifier = if record.base_name.is_empty() {
        "pattern".to_string()
    } else {
        sanitize_identifier(&record.base_name)
    };
    let mut element = Element::new(&identifier);
    let children = &mut element.children;

    children.push(value_element("baseName", &record.base_name));
    if let Some(id) = &record.external_id {
        children.push(value_element("jdId", id));
    }
    if let Some(title) = &record.external_title {
        children.push(value_element("jdTitle", title));
    }
    if let Some(mapped) = record.mapped_pattern() {
        children.push(value_element("mapped-pattern", mapped));
    }
    if let Some(url) = &record.url {
        children.push(value_element("url", url));
    }
    for file in record.image_file_names() {
        children.push(value_element("image", &file));
    }
    for (type_name, index) in record.attributes() {
        let value = registry
            .value_at(type_name, *index)
            .ok_or_else(|| Error::UnknownValue {
                type_name: type_name.clone(),
                value: format!("#{}", index),
            })?;
        children.push(value_element(type_name, value));
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_identifier("Floral Dress (v2)"), "Floral-Dress--v2-");
        assert_eq!(sanitize_identifier("a'b\"c&d#e%f@g!h*i$j^k+l,m"), "a-b-c-d-e-f-g-h-i-j-k-l-m");
        assert_eq!(sanitize_identifier("plain_name.v1"), "plain_name.v1");
    }

    #[test]
    fn test_sanitize_yields_valid_element_names() {
        assert_eq!(sanitize_identifier("1002"), "_1002");
        assert_eq!(sanitize_identifier("a/b:c<d"), "a-b-c-d");
        assert_eq!(sanitize_identifier("(v2)"), "_-v2-");
        assert_eq!(sanitize_identifier("-x"), "_-x");
        assert_eq!(sanitize_identifier("_keep"), "_keep");
        assert_eq!(sanitize_identifier(""), "_");
    }

    #[test]
    fn test_awkward_base_names_survive_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("legacy.xml");
        let reg = TypeRegistry::from_types([("color", vec!["unknown", "red"])]).unwrap();
        let subjects = ["1002", "shirts/2024:a<b>", ".hidden"]
            .into_iter()
            .map(|name| Record::new(&reg, name))
            .collect();
        let state = ProjectState::new(subjects, Vec::new());

        TreeBackend.try_save(&path, &state, &reg).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("<_1002>"));

        let loaded = TreeBackend.try_load(&path, dir.path(), &reg).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_record_without_base_name_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("legacy.xml");
        std::fs::write(
            &path,
            "<project><patterns><P1><url value=\"x\"/></P1></patterns></project>",
        )
        .unwrap();
        let reg = TypeRegistry::from_types([("color", vec!["unknown"])]).unwrap();

        let err = TreeBackend.try_load(&path, dir.path(), &reg).unwrap_err();
        assert!(err.is_recoverable_parse());
    }

    #[test]
    fn test_invalid_value_keeps_sentinel() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("legacy.xml");
        std::fs::write(
            &path,
            "<project><patterns><P1><baseName value=\"P1\"/><color value=\"green\"/></P1></patterns></project>",
        )
        .unwrap();
        let reg = TypeRegistry::from_types([("color", vec!["unknown", "red"])]).unwrap();

        let state = TreeBackend.try_load(&path, dir.path(), &reg).unwrap();
        assert_eq!(state.patterns[0].attribute(&reg, "color"), Some("unknown"));
    }
}
