//! Small helpers over quick-xml (forward-only) and xmltree (DOM)

use crate::{Error, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::path::Path;

/// Whole file as UTF-8 text. Undecodable bytes are a parse failure of
/// `backend`, so another backend may still read the file.
pub(crate) fn read_utf8(path: &Path, backend: &'static str) -> Result<String> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| Error::parse(path, backend, e))
}

/// Indented writer over an in-memory buffer
pub(crate) fn writer() -> Writer<Vec<u8>> {
    Writer::new_with_indent(Vec::new(), b' ', 2)
}

/// Emit one event, folding writer errors into `Error::Io`
pub(crate) fn put(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// `<name>text</name>`, or `<name/>` for empty text
///
/// The indenting writer would put a line break between an empty start and
/// end tag, which reads back as text.
pub(crate) fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return put(writer, Event::Empty(BytesStart::new(name)));
    }
    put(writer, Event::Start(BytesStart::new(name)))?;
    put(writer, Event::Text(BytesText::new(text)))?;
    put(writer, Event::End(BytesEnd::new(name)))
}

/// Element name as an owned string
pub(crate) fn name_of(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Look up one attribute value (unescaped)
pub(crate) fn attribute(
    start: &BytesStart<'_>,
    key: &str,
    path: &Path,
    backend: &'static str,
) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::parse(path, backend, e))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| Error::parse(path, backend, e))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Read the text content of the element whose start tag was just consumed,
/// up to and including its end tag. Nested elements are a structural error.
pub(crate) fn read_text(
    reader: &mut Reader<&[u8]>,
    path: &Path,
    backend: &'static str,
) -> Result<String> {
    let mut text = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                let chunk = t.unescape().map_err(|e| Error::parse(path, backend, e))?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(c)) => text.push_str(&String::from_utf8_lossy(&c)),
            Ok(Event::End(_)) => return Ok(text),
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Err(Error::parse(
                    path,
                    backend,
                    format!("unexpected element <{}> inside text element", name_of(&e)),
                ))
            }
            Ok(Event::Eof) => {
                return Err(Error::parse(path, backend, "unexpected end of document"))
            }
            Ok(_) => {}
            Err(e) => return Err(Error::parse(path, backend, e)),
        }
    }
}

/// Parse a document that may hold several top-level elements
///
/// Older files were written without a single root. The prolog is dropped and
/// the body wrapped in a synthetic root so the DOM parser accepts it.
pub(crate) fn parse_fragment(
    text: &str,
    path: &Path,
    backend: &'static str,
) -> Result<xmltree::Element> {
    let mut body = text.trim_start_matches('\u{feff}').trim_start();
    if body.starts_with("<?xml") {
        match body.find("?>") {
            Some(end) => body = &body[end + 2..],
            None => return Err(Error::parse(path, backend, "unterminated XML declaration")),
        }
    }
    let wrapped = format!("<fragment-root>{}</fragment-root>", body);
    xmltree::Element::parse(wrapped.as_bytes()).map_err(|e| Error::parse(path, backend, e))
}

/// Child elements of a DOM node, skipping text and comments
pub(crate) fn child_elements(element: &xmltree::Element) -> impl Iterator<Item = &xmltree::Element> {
    element.children.iter().filter_map(|node| match node {
        xmltree::XMLNode::Element(e) => Some(e),
        _ => None,
    })
}
