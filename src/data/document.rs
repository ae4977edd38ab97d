//! Owned XML element tree for a whole .osm document.
//!
//! The repair works on the raw document rather than on the parsed model, so
//! everything we do not understand (bounds, node tags, relation tags, comments)
//! survives the round trip.

use std::io::{BufRead, Write};
use std::str;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::errors::{Error, ErrorKind, Result};

const INDENT_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            ..Element::default()
        }
    }

    fn from_start(el: &BytesStart) -> Result<Element> {
        let mut element = Element::new(str::from_utf8(el.name().as_ref())?);
        for attribute_res in el.attributes() {
            let attribute = attribute_res?;
            let key = str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.to_string();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|child| match child {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |el| el.name == name)
    }

    pub fn children_named_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Element> {
        self.child_elements_mut().filter(move |el| el.name == name)
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
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
                XmlNode::Element(el) => el.write_to(writer)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
                XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
                XmlNode::Comment(text) => writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmDocument {
    /// XML version from the declaration, if the source had one.
    pub declaration: Option<String>,
    pub root: Element,
}

impl OsmDocument {
    pub fn from_reader<R: BufRead>(input: R) -> Result<OsmDocument> {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut declaration = None;
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    return Err(Error::from(e).context(format!("at byte {}", reader.buffer_position())))
                },
            };
            match event {
                Event::Eof => break,
                Event::Decl(e) => {
                    declaration = Some(str::from_utf8(&e.version()?)?.to_string());
                },
                Event::Start(e) => {
                    stack.push(Element::from_start(&e)?);
                },
                Event::Empty(e) => {
                    let el = Element::from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                },
                Event::End(_e) => {
                    let el = stack.pop().ok_or("Closing tag without an open element")?;
                    attach(&mut stack, &mut root, el)?;
                },
                Event::Text(e) => {
                    let text = e.unescape()?.to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(text));
                    }
                },
                Event::CData(e) => {
                    let text = str::from_utf8(&e.into_inner())?.to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(text));
                    }
                },
                Event::Comment(e) => {
                    let text = str::from_utf8(&e.into_inner())?.to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Comment(text));
                    }
                },
                // Processing instructions and doctypes are not part of the OSM format.
                Event::PI(_) | Event::DocType(_) => (),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::new(ErrorKind::Parse, format!("Unclosed element <{}>", stack[stack.len() - 1].name)));
        }
        let root = root.ok_or_else(|| Error::new(ErrorKind::Parse, "Document has no root element"))?;
        Ok(OsmDocument {
            declaration,
            root,
        })
    }

    #[cfg(test)]
    pub fn parse_str(xml: &str) -> Result<OsmDocument> {
        OsmDocument::from_reader(xml.as_bytes())
    }

    pub fn write<W: Write>(&self, output: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(output, b' ', INDENT_SIZE);
        if let Some(version) = &self.declaration {
            writer.write_event(Event::Decl(BytesDecl::new(version, Some("UTF-8"), None)))?;
        }
        self.root.write_to(&mut writer)?;
        let mut output = writer.into_inner();
        output.write_all(b"\n")?;
        output.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn to_xml_string(&self) -> Result<String> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(String::from_utf8(bytes).map_err(|e| e.utf8_error())?)
    }

    /// Top-level elements with the given name (`node`, `way`, `relation`).
    pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.root.children_named(name)
    }

    pub fn elements_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Element> {
        self.root.children_named_mut(name)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None => {
            if root.is_some() {
                return Err(Error::new(ErrorKind::Parse, format!("Second root element <{}>", el.name)));
            }
            *root = Some(el);
        },
    }
    Ok(())
}
