//! Document Parsing Port
//!
//! The codec works on a small element tree; turning text into that tree is a
//! pluggable collaborator.

use crate::error::XmlParseError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Element of a parsed document. Attributes are not kept: XML-RPC has none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub children: Vec<XmlNode>,
    /// Concatenated character data directly inside this element
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// First child element named `name`
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// The only child element, if there is exactly one
    pub fn single_child(&self) -> Option<&XmlNode> {
        match self.children.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Text to element tree
///
/// Implementations:
/// - QuickXmlParser: quick-xml pull parser (production)
pub trait DocumentParser: Send + Sync {
    /// Parse a complete document and return its root element
    ///
    /// # Errors
    /// - XmlParseError if the text is not a well-formed document
    fn parse(&self, text: &str) -> Result<XmlNode, XmlParseError>;
}

/// quick-xml backed parser
#[derive(Debug, Clone, Default)]
pub struct QuickXmlParser;

impl DocumentParser for QuickXmlParser {
    fn parse(&self, text: &str) -> Result<XmlNode, XmlParseError> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(XmlParseError::TrailingContent);
                    }
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    stack.push(XmlNode::new(name));
                }
                Event::Empty(empty) => {
                    let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                    attach(&mut stack, &mut root, XmlNode::new(name))?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| XmlParseError::Malformed("unmatched end tag".into()))?;
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(content) => {
                    let content = content.unescape()?;
                    match stack.last_mut() {
                        Some(node) => node.text.push_str(&content),
                        None if content.trim().is_empty() => {}
                        None if root.is_some() => return Err(XmlParseError::TrailingContent),
                        None => {
                            return Err(XmlParseError::Malformed(
                                "text outside of the root element".into(),
                            ))
                        }
                    }
                }
                Event::CData(data) => {
                    let content = data.into_inner();
                    match stack.last_mut() {
                        Some(node) => node.text.push_str(&String::from_utf8_lossy(&content)),
                        None => return Err(XmlParseError::TrailingContent),
                    }
                }
                Event::Eof => break,
                // Declaration, comments, processing instructions, doctype
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlParseError::Malformed("unclosed element".into()));
        }
        root.ok_or(XmlParseError::MissingRoot)
    }
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_some() => return Err(XmlParseError::TrailingContent),
        None => *root = Some(node),
    }
    Ok(())
}
