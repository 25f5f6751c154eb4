//! XML document reading.
//!
//! The model builders consume an owned element tree; this module produces one
//! from a PMML document on disk, read either directly or out of a
//! single-entry ZIP archive. Built on the `quick-xml` event stream.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Error types for document reading.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// IO error while reading the document
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed XML
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Malformed attribute
    #[error("xml attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    /// Malformed ZIP container
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// ZIP archive without a regular file as its first entry
    #[error("zip archive does not contain a model document")]
    EmptyArchive,
    /// Document with no root element
    #[error("document has no root element")]
    NoRoot,
}

/// One element of the parsed document: name, attributes, text content and
/// child elements, all owned.
#[derive(Debug, Clone, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    /// Parse a document string into its root element.
    pub fn parse(xml: &str) -> Result<Element, DocumentError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.text.push_str(&text.unescape()?);
                    }
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or(DocumentError::NoRoot)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or(DocumentError::NoRoot)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text content, with surrounding whitespace trimmed by the reader.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute parsed as `f64`, `None` if absent or unparsable.
    pub fn double_attribute(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(|value| value.parse().ok())
    }

    /// Attribute read as a boolean: `true`/`1` (case-insensitive) are true.
    pub fn bool_attribute(&self, name: &str) -> Option<bool> {
        self.attribute(name)
            .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// All direct children with the given element name, in document order.
    pub fn children<'e>(&'e self, name: &'e str) -> impl Iterator<Item = &'e Element> + 'e {
        self.children
            .iter()
            .filter(move |child| child.name == name)
    }

    /// All direct children, in document order.
    pub fn all_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter()
    }

    /// First direct child whose name is in `names`.
    pub fn child_in(&self, names: &[&str]) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| names.contains(&child.name.as_str()))
    }

    /// Direct children with the given name and attribute value.
    pub fn children_by_attribute<'a>(
        &'a self,
        name: &'a str,
        attribute: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children(name)
            .filter(move |child| child.attribute(attribute) == Some(value))
    }
}

fn element_from_start(
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<Element, DocumentError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).into_owned(),
            attribute.unescape_value()?.into_owned(),
        ));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    }
}

/// Read a model document from disk into its root element. With `zipped`, the
/// document is inflated from the first entry of a ZIP archive; the entry must
/// be a regular file.
pub fn read_document(path: &Path, zipped: bool) -> Result<Element, DocumentError> {
    let mut xml = String::new();
    if zipped {
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        if archive.is_empty() {
            return Err(DocumentError::EmptyArchive);
        }
        let mut entry = archive.by_index(0)?;
        if !entry.is_file() {
            return Err(DocumentError::EmptyArchive);
        }
        entry.read_to_string(&mut xml)?;
    } else {
        File::open(path)?.read_to_string(&mut xml)?;
    }

    Element::parse(&xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let root = Element::parse(
            r#"<PMML version="4.4"><DataDictionary numberOfFields="1">
                 <DataField name="x" dataType="double" optype="continuous"/>
               </DataDictionary></PMML>"#,
        )
        .unwrap();

        assert_eq!(root.name(), "PMML");
        assert_eq!(root.attribute("version"), Some("4.4"));
        let dictionary = root.child("DataDictionary").unwrap();
        assert_eq!(dictionary.double_attribute("numberOfFields"), Some(1.0));
        let field = dictionary.children("DataField").next().unwrap();
        assert_eq!(field.attribute("name"), Some("x"));
        assert!(!field.has_attribute("missing"));
    }

    #[test]
    fn collects_text_content() {
        let root = Element::parse("<row><input>A</input><output>hit</output></row>").unwrap();
        assert_eq!(root.child("input").unwrap().text(), "A");
        assert_eq!(root.child("output").unwrap().text(), "hit");
    }

    #[test]
    fn child_in_respects_document_order() {
        let root =
            Element::parse("<Node><True/><Node score=\"a\"><False/></Node></Node>").unwrap();
        let first = root.child_in(&["True", "False", "SimplePredicate"]).unwrap();
        assert_eq!(first.name(), "True");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(Element::parse("<PMML><unclosed></PMML>").is_err());
        assert!(Element::parse("").is_err());
    }
}
