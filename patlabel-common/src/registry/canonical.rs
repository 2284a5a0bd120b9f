//! Canonical taxonomy document, read and written forward-only
//!
//! ```xml
//! <document>
//!   <types value="cloth-types">
//!     <type>unknown</type>
//!     <type>cotton</type>
//!   </types>
//!   <jdtypemap value="fabric" map="cloth-types">
//!     <type value="100% cotton" map="cotton"/>
//!   </jdtypemap>
//! </document>
//! ```

use super::{validate, ExternalMapping, RegistryParts};
use crate::xml;
use crate::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::path::Path;

const BACKEND: &str = "canonical";

/// Which block a `<type>` element belongs to
enum Block {
    None,
    Types(String),
    External(String),
}

pub(super) fn read(path: &Path) -> Result<RegistryParts> {
    let text = xml::read_utf8(path, BACKEND)?;
    parse(&text, path)
}

pub(super) fn parse(text: &str, path: &Path) -> Result<RegistryParts> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut parts = RegistryParts::default();
    let mut block = Block::None;
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| crate::Error::parse(path, BACKEND, e))?;
        match event {
            Event::Start(e) => {
                let name = xml::name_of(&e);
                if name == "type" {
                    match &block {
                        Block::Types(current) => {
                            let value = xml::read_text(&mut reader, path, BACKEND)?;
                            if let Some(values) = parts.types.get_mut(current) {
                                values.push(value);
                            }
                        }
                        Block::External(current) => {
                            add_external_value(&mut parts, current, &e, path)?;
                            // consume up to </type>
                            xml::read_text(&mut reader, path, BACKEND)?;
                        }
                        Block::None => {
                            xml::read_text(&mut reader, path, BACKEND)?;
                        }
                    }
                    continue;
                }
                depth += 1;
                block = open_block(&mut parts, &name, &e, path)?.unwrap_or(block);
            }
            Event::Empty(e) => {
                let name = xml::name_of(&e);
                match (&block, name.as_str()) {
                    (Block::Types(current), "type") => {
                        if let Some(values) = parts.types.get_mut(current) {
                            values.push(String::new());
                        }
                    }
                    (Block::External(current), "type") => {
                        add_external_value(&mut parts, current, &e, path)?;
                    }
                    _ => {
                        // an empty <types value=".."/> still declares the type
                        open_block(&mut parts, &name, &e, path)?;
                    }
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if matches!(e.name().as_ref(), b"types" | b"jdtypemap") {
                    block = Block::None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(crate::Error::parse(path, BACKEND, "unexpected end of document"));
    }
    validate(&parts, path, BACKEND)?;
    Ok(parts)
}

/// Handle `<types>` / `<jdtypemap>` start tags; other elements leave the block unchanged
fn open_block(
    parts: &mut RegistryParts,
    name: &str,
    start: &BytesStart<'_>,
    path: &Path,
) -> Result<Option<Block>> {
    match name {
        "types" => {
            let Some(type_name) = xml::attribute(start, "value", path, BACKEND)? else {
                return Ok(Some(Block::None));
            };
            parts.types.insert(type_name.clone(), Vec::new());
            Ok(Some(Block::Types(type_name)))
        }
        "jdtypemap" => {
            let external = xml::attribute(start, "value", path, BACKEND)?.unwrap_or_default();
            let local = xml::attribute(start, "map", path, BACKEND)?.unwrap_or_default();
            if external.is_empty() {
                return Ok(Some(Block::None));
            }
            parts.external.insert(
                external.clone(),
                ExternalMapping {
                    local_type: local,
                    values: BTreeMap::new(),
                },
            );
            Ok(Some(Block::External(external)))
        }
        _ => Ok(None),
    }
}

fn add_external_value(
    parts: &mut RegistryParts,
    external: &str,
    start: &BytesStart<'_>,
    path: &Path,
) -> Result<()> {
    let value = xml::attribute(start, "value", path, BACKEND)?.unwrap_or_default();
    let map = xml::attribute(start, "map", path, BACKEND)?.unwrap_or_default();
    if value.is_empty() {
        return Ok(());
    }
    if let Some(mapping) = parts.external.get_mut(external) {
        mapping.values.insert(value, map);
    }
    Ok(())
}

pub(super) fn render(
    types: &BTreeMap<String, Vec<String>>,
    external: &BTreeMap<String, ExternalMapping>,
) -> Result<Vec<u8>> {
    let mut writer = xml::writer();
    xml::put(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml::put(&mut writer, Event::Start(BytesStart::new("document")))?;

    for (name, values) in types {
        xml::put(
            &mut writer,
            Event::Start(BytesStart::new("types").with_attributes([("value", name.as_str())])),
        )?;
        for value in values {
            xml::text_element(&mut writer, "type", value)?;
        }
        xml::put(&mut writer, Event::End(BytesEnd::new("types")))?;
    }

    for (name, mapping) in external {
        xml::put(
            &mut writer,
            Event::Start(BytesStart::new("jdtypemap").with_attributes([
                ("value", name.as_str()),
                ("map", mapping.local_type.as_str()),
            ])),
        )?;
        for (value, map) in &mapping.values {
            xml::put(
                &mut writer,
                Event::Empty(
                    BytesStart::new("type")
                        .with_attributes([("value", value.as_str()), ("map", map.as_str())]),
                ),
            )?;
        }
        xml::put(&mut writer, Event::End(BytesEnd::new("jdtypemap")))?;
    }

    xml::put(&mut writer, Event::End(BytesEnd::new("document")))?;
    Ok(writer.into_inner())
}

pub(super) fn write(
    path: &Path,
    types: &BTreeMap<String, Vec<String>>,
    external: &BTreeMap<String, ExternalMapping>,
) -> Result<()> {
    let bytes = render(types, external)?;
    crate::config::write_atomic(path, &bytes)
}
