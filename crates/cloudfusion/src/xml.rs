//! Generic XML document tree for service responses.
//!
//! Service schemas are not modelled; callers navigate the tree with
//! [`XmlElement::child`], [`XmlElement::children`] and [`XmlElement::path`].

use crate::error::{SdkError, SdkResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    /// Local name, without namespace prefix.
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Concatenated text and CDATA content.
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children named `name`.
    pub fn children(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        let name = name.to_string();
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a `/`-separated chain of child names.
    pub fn path(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |el, name| el.child(name))
    }

    /// Text of the child at `path`.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.path(path).map(|e| e.text.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Parse a document into its root element.
pub fn parse(xml: &str) -> SdkResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(element_from(e)?),
            Ok(Event::Empty(ref e)) => {
                let el = element_from(e)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                if let Some(el) = stack.pop() {
                    attach(&mut stack, &mut root, el);
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| SdkError::parse(format!("Invalid XML text: {e}")))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SdkError::parse(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SdkError::parse("Unexpected end of XML document"));
    }
    root.ok_or_else(|| SdkError::parse("XML document has no root element"))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => *root = Some(el),
    }
}

fn element_from(e: &BytesStart) -> SdkResult<XmlElement> {
    let local = e.local_name();
    let name = str::from_utf8(local.as_ref())
        .map_err(|_| SdkError::parse("Invalid UTF-8 in tag name"))?
        .to_string();

    let mut attributes = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SdkError::parse(e.to_string()))?;
        let key = str::from_utf8(attr.key.as_ref()).unwrap_or("").to_string();
        let val = attr
            .unescape_value()
            .map_err(|e| SdkError::parse(e.to_string()))?;
        attributes.insert(key, val.to_string());
    }

    Ok(XmlElement {
        name,
        attributes,
        text: String::new(),
        children: Vec::new(),
    })
}
