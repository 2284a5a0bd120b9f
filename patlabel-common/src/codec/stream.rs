//! Forward-only project document backend
//!
//! ```xml
//! <patlabel-project>
//!   <subjects>
//!     <pattern name="img001" jdId="1002" mapped-pattern="P1">
//!       <jdTitle>Summer dress</jdTitle>
//!       <url>http://..</url>
//!       <image>front.jpg</image>
//!       <cloth-types>cotton</cloth-types>
//!       <color>unknown</color>
//!     </pattern>
//!   </subjects>
//!   <patterns>
//!     <pattern name="P1">..</pattern>
//!   </patterns>
//! </patlabel-project>
//! ```
//!
//! Image elements hold file names only; they are resolved to
//! `<root>/<name>/<file>` on load. Child elements that are neither a known
//! field nor a registered attribute type are ignored.

use super::CodecBackend;
use crate::project::ProjectState;
use crate::record::Record;
use crate::registry::TypeRegistry;
use crate::xml;
use crate::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;

const BACKEND: &str = "streaming";

const ROOT: &str = "patlabel-project";
const SUBJECTS: &str = "subjects";
const PATTERNS: &str = "patterns";
const RECORD: &str = "pattern";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Subjects,
    Patterns,
}

/// quick-xml reader/writer backend; the primary format
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingBackend;

impl CodecBackend for StreamingBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn try_load(&self, path: &Path, root: &Path, registry: &TypeRegistry) -> Result<ProjectState> {
        let text = xml::read_utf8(path, BACKEND)?;
        parse(&text, path, root, registry)
    }

    fn try_save(&self, path: &Path, state: &ProjectState, registry: &TypeRegistry) -> Result<()> {
        let bytes = render(state, registry)?;
        crate::config::write_atomic(path, &bytes)
    }
}

fn parse(text: &str, path: &Path, root: &Path, registry: &TypeRegistry) -> Result<ProjectState> {
    // Text is not trimmed: field values keep their whitespace, and the
    // whitespace between elements is skipped by the loops below.
    let mut reader = Reader::from_str(text);

    let mut state = ProjectState::default();
    let mut opened = false;
    let mut closed = false;
    let mut section: Option<Section> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::parse(path, BACKEND, e))?;
        match event {
            Event::Start(e) => {
                let name = xml::name_of(&e);
                match (name.as_str(), opened, section) {
                    (ROOT, false, _) => opened = true,
                    (SUBJECTS, true, None) => section = Some(Section::Subjects),
                    (PATTERNS, true, None) => section = Some(Section::Patterns),
                    (RECORD, true, Some(s)) => {
                        let record = read_record(&mut reader, &e, path, root, registry)?;
                        push(&mut state, s, record);
                    }
                    _ => return Err(unexpected(path, &name)),
                }
            }
            Event::Empty(e) => {
                let name = xml::name_of(&e);
                match (name.as_str(), opened, section) {
                    (ROOT, false, _) => {
                        opened = true;
                        closed = true;
                    }
                    (SUBJECTS | PATTERNS, true, None) => {}
                    (RECORD, true, Some(s)) => {
                        let record = record_from_start(&e, path, registry)?;
                        push(&mut state, s, record);
                    }
                    _ => return Err(unexpected(path, &name)),
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"subjects" | b"patterns" => section = None,
                _ => closed = true,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !opened || !closed {
        return Err(Error::parse(path, BACKEND, "missing or unterminated project element"));
    }
    Ok(state)
}

fn unexpected(path: &Path, name: &str) -> Error {
    Error::parse(path, BACKEND, format!("unexpected element <{}>", name))
}

fn push(state: &mut ProjectState, section: Section, record: Record) {
    match section {
        Section::Subjects => state.subjects.push(record),
        Section::Patterns => state.patterns.push(record),
    }
}

/// Record with identity attributes taken from the start tag
fn record_from_start(start: &BytesStart<'_>, path: &Path, registry: &TypeRegistry) -> Result<Record> {
    let name = xml::attribute(start, "name", path, BACKEND)?.unwrap_or_default();
    let mut record = Record::new(registry, name);
    record.external_id = xml::attribute(start, "jdId", path, BACKEND)?;
    let mapped = xml::attribute(start, "mapped-pattern", path, BACKEND)?;
    record.set_mapped_pattern(mapped.as_deref());
    Ok(record)
}

fn read_record(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    path: &Path,
    root: &Path,
    registry: &TypeRegistry,
) -> Result<Record> {
    let mut record = record_from_start(start, path, registry)?;
    let mut image_names = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::parse(path, BACKEND, e))?;
        let (field, text) = match event {
            Event::Start(e) => (xml::name_of(&e), xml::read_text(reader, path, BACKEND)?),
            Event::Empty(e) => (xml::name_of(&e), String::new()),
            Event::End(_) => break,
            Event::Eof => {
                return Err(Error::parse(
                    path,
                    BACKEND,
                    format!("unterminated record '{}'", record.base_name),
                ))
            }
            _ => continue,
        };

        match field.as_str() {
            "image" => {
                if !text.is_empty() {
                    image_names.push(text);
                }
            }
            "url" => record.url = Some(text),
            "jdId" => record.external_id = Some(text),
            "jdTitle" => record.external_title = Some(text),
            type_name if registry.contains_type(type_name) => {
                record.set_attribute(registry, type_name, &text)?;
            }
            _ => {}
        }
    }

    record.images = image_names
        .iter()
        .map(|file| record.image_path(root, file))
        .collect();
    Ok(record)
}

fn render(state: &ProjectState, registry: &TypeRegistry) -> Result<Vec<u8>> {
    let mut writer = xml::writer();
    xml::put(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml::put(&mut writer, Event::Start(BytesStart::new(ROOT)))?;

    for (section, records) in [(SUBJECTS, &state.subjects), (PATTERNS, &state.patterns)] {
        xml::put(&mut writer, Event::Start(BytesStart::new(section)))?;
        for record in records {
            write_record(&mut writer, record, registry)?;
        }
        xml::put(&mut writer, Event::End(BytesEnd::new(section)))?;
    }

    xml::put(&mut writer, Event::End(BytesEnd::new(ROOT)))?;
    Ok(writer.into_inner())
}

fn write_record(writer: &mut Writer<Vec<u8>>, record: &Record, registry: &TypeRegistry) -> Result<()> {
    let mut start = BytesStart::new(RECORD);
    if !record.base_name.is_empty() {
        start.push_attribute(("name", record.base_name.as_str()));
    }
    if let Some(id) = &record.external_id {
        start.push_attribute(("jdId", id.as_str()));
    }
    if let Some(mapped) = record.mapped_pattern() {
        start.push_attribute(("mapped-pattern", mapped));
    }
    xml::put(writer, Event::Start(start))?;

    if let Some(title) = &record.external_title {
        xml::text_element(writer, "jdTitle", title)?;
    }
    if let Some(url) = &record.url {
        xml::text_element(writer, "url", url)?;
    }
    for file in record.image_file_names() {
        xml::text_element(writer, "image", &file)?;
    }
    for (type_name, index) in record.attributes() {
        let value = registry
            .value_at(type_name, *index)
            .ok_or_else(|| Error::UnknownValue {
                type_name: type_name.clone(),
                value: format!("#{}", index),
            })?;
        xml::text_element(writer, type_name, value)?;
    }

    xml::put(writer, Event::End(BytesEnd::new(RECORD)))
}
