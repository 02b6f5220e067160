//! A small owned XML tree.
//!
//! Parsing drops comments, processing instructions and indentation (text that
//! is only whitespace and spans a line break). Other whitespace-only text,
//! like the space in `<b>a</b> <i>b</i>`, is content and is kept. Attribute
//! order is kept as written.

use std::fmt;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};

/// A node inside an element.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Parse a document, returning its root element.
    pub fn parse(text: &str) -> Result<Element> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| Error::Xml {
                position,
                message: e.to_string(),
            })?;
            match event {
                Event::Start(start) => stack.push(element_from_start(&start, position)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start, position)?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| Error::Xml {
                        position,
                        message: "unbalanced closing tag".to_string(),
                    })?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| Error::Xml {
                        position,
                        message: e.to_string(),
                    })?;
                    push_text(&mut stack, &text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    push_text(&mut stack, &text);
                }
                Event::Eof => break,
                // Comments, declarations, doctypes and processing
                // instructions carry no content.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::Xml {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element <{}>", stack[stack.len() - 1].tag),
            });
        }
        root.ok_or_else(|| Error::Xml {
            position: 0,
            message: "document has no root element".to_string(),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|(key, _)| key == name)?;
        Some(self.attributes.remove(index).1)
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Direct child elements, in order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    pub fn has_elements(&self) -> bool {
        self.elements().next().is_some()
    }

    /// True if any direct text child has non-whitespace content.
    pub fn has_text(&self) -> bool {
        self.children
            .iter()
            .any(|node| matches!(node, XmlNode::Text(text) if !text.trim().is_empty()))
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Remove the first direct child element with the given tag.
    pub fn take_child(&mut self, tag: &str) -> Option<Element> {
        let index = self
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(e) if e.tag == tag))?;
        match self.children.remove(index) {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        }
    }

    /// Serialize without added whitespace.
    pub fn to_compact_string(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        into_string(writer.into_inner())
    }

    /// Serialize with two-space indentation.
    ///
    /// Indentation is only added between elements; text is written as is.
    pub fn to_pretty_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_to(&mut writer)?;
        let mut out = into_string(writer.into_inner())?;
        out.push('\n');
        Ok(out)
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let start = BytesStart::new(self.tag.as_str()).with_attributes(
            self.attributes
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        if self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(write_error);
        }

        writer.write_event(Event::Start(start)).map_err(write_error)?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_to(writer)?,
                XmlNode::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(write_error)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.tag.as_str())))
            .map_err(write_error)
    }

    /// A copy with attributes sorted and text trimmed, for comparing trees
    /// modulo formatting.
    pub fn canonical(&self) -> Element {
        let mut attributes = self.attributes.clone();
        attributes.sort();
        let children = self
            .children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Element(element) => Some(XmlNode::Element(element.canonical())),
                XmlNode::Text(text) => {
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then(|| XmlNode::Text(trimmed.to_string()))
                }
            })
            .collect();
        Element {
            tag: self.tag.clone(),
            attributes,
            children,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_compact_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| Error::Xml {
            position,
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|e| Error::Xml {
            position,
            message: e.to_string(),
        })?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_child(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(Error::Xml {
            position,
            message: "document has more than one root element".to_string(),
        }),
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    if is_indentation(text) {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match parent.children.last_mut() {
            Some(XmlNode::Text(previous)) => previous.push_str(text),
            _ => parent.push_text(text),
        }
    }
}

/// The pretty writer only ever adds whitespace of this shape.
fn is_indentation(text: &str) -> bool {
    text.trim().is_empty() && (text.contains('\n') || text.is_empty())
}

fn write_error(e: impl fmt::Display) -> Error {
    Error::XmlWrite {
        message: e.to_string(),
    }
}

fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(write_error)
}
