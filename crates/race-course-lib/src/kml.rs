//! KML document model
//!
//! A [`KmlDocument`] is an owned element tree of a KML file. It keeps every
//! element, attribute, text node, CDATA section and comment, so a document
//! can be copied structurally and written back without losing styles, schemas
//! or anything else the course model does not look at.
//!
//! Element lookups match on the local name, so `kml:Folder` and `Folder` are
//! treated alike; the qualified name is kept for writing.

use crate::{CourseError, Result};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A node in the element tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Unescaped character data
    Text(String),
    CData(String),
    /// Raw comment content
    Comment(String),
}

/// An XML element with its attributes and children, in document order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Builder-style child appender
    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Qualified name as written in the source, e.g. `kml:Folder`
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without namespace prefix
    #[inline]
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    #[inline]
    pub fn is(&self, local_name: &str) -> bool {
        self.local_name() == local_name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child elements, skipping text and comments
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Child elements with the given local name
    pub fn elements_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |element| element.is(local_name))
    }

    /// First child element with the given local name
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|element| element.is(local_name))
    }

    /// Concatenated text and CDATA content of this element (not descendants)
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of the first child element with the given local name
    pub fn child_text(&self, local_name: &str) -> Option<String> {
        self.child(local_name).map(Element::text)
    }

    /// Copy of this element with the same name and attributes but no children
    pub fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_to(writer)?,
                Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
                Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data)))?,
                Node::Comment(comment) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// A parsed KML file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KmlDocument {
    root: Element,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl KmlDocument {
    /// Wrap an element tree; the root must be a `<kml>` element
    pub fn new(root: Element) -> Result<Self> {
        if !root.is("kml") {
            return Err(CourseError::UnsupportedDocumentShape(format!(
                "root element is <{}>, expected <kml>",
                root.name()
            )));
        }
        Ok(Self { root })
    }

    /// Parse KML text
    pub fn parse(xml: &str) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("kml::parse");

        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    // quick-xml already checks that end tags match their start tags
                    let element = stack.pop().ok_or_else(|| {
                        CourseError::UnsupportedDocumentShape("unbalanced end tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.push(Node::Text(text.unescape()?.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.push(Node::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.push(Node::Comment(String::from_utf8_lossy(&comment).into_owned()));
                    }
                }
                Event::Eof => break,
                // Declaration, processing instructions and doctype are regenerated on write
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(CourseError::UnsupportedDocumentShape(format!(
                "unclosed element <{}>",
                open.name()
            )));
        }

        let root = root.ok_or_else(|| {
            CourseError::UnsupportedDocumentShape("document has no root element".to_string())
        })?;
        Self::new(root)
    }

    /// Read and parse a KML file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut content = String::new();
        {
            let file = File::open(path).map_err(|e| CourseError::from(e).in_file(path))?;
            BufReader::new(file)
                .read_to_string(&mut content)
                .map_err(|e| CourseError::from(e).in_file(path))?;
        }
        Self::parse(&content).map_err(|e| e.in_file(path))
    }

    /// Serialize to KML text with an XML declaration and two-space indentation
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.root.write_to(&mut writer)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        // Everything written came from `String`s, so this cannot fail
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Serialize and write to a file
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = self.to_xml_string()?;
        std::fs::write(path, xml).map_err(|e| CourseError::from(e).in_file(path))
    }

    /// The `<kml>` root element
    #[inline]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The single top-level `<Document>` container
    pub fn container(&self) -> Result<&Element> {
        self.root.child("Document").ok_or_else(|| {
            CourseError::UnsupportedDocumentShape(
                "no top-level <Document> container under <kml>".to_string(),
            )
        })
    }

    /// Name of the top-level container, if it has one
    pub fn name(&self) -> Option<String> {
        self.container().ok()?.child_text("name")
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(CourseError::UnsupportedDocumentShape(format!(
            "more than one root element, found extra <{}>",
            element.name()
        )));
    }
    *root = Some(element);
    Ok(())
}
