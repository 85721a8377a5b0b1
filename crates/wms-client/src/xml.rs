//! Owned XML element tree built from quick-xml events.
//!
//! Capability documents are small and walked in arbitrary order (a layer's
//! children are visited after its own metadata), so they are read into a tree
//! once instead of being handled as a stream. Names are stored without their
//! namespace prefix and looked up case-insensitively.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("XML parsing error at position {position}: {message}")]
pub struct XmlError {
    pub position: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a complete document and return its root element.
    pub fn parse(bytes: &[u8]) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => stack.push(start_element(&e, position)?),
                Ok(Event::Empty(e)) => {
                    let element = start_element(&e, position)?;
                    close_element(element, &mut stack, &mut root);
                }
                Ok(Event::End(_)) => {
                    let element = stack.pop().ok_or_else(|| XmlError {
                        position,
                        message: "unexpected closing tag".to_string(),
                    })?;
                    close_element(element, &mut stack, &mut root);
                }
                Ok(Event::Text(t)) => {
                    if let Some(current) = stack.last_mut() {
                        let text = t.unescape().map_err(|e| XmlError {
                            position,
                            message: e.to_string(),
                        })?;
                        current.text.push_str(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(XmlError {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XmlError {
                position: reader.buffer_position(),
                message: format!("unclosed element <{}>", stack[stack.len() - 1].name),
            });
        }
        root.ok_or_else(|| XmlError {
            position: 0,
            message: "document has no root element".to_string(),
        })
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(name))
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// Follow a chain of child names, e.g. `["Request", "GetMap", "Format"]`.
    pub fn find(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter().try_fold(self, |element, name| element.child(name))
    }

    /// Trimmed text of this element, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        Some(self.text.trim()).filter(|t| !t.is_empty())
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlElement::text)
    }

    /// Non-empty texts of every child with the given name.
    pub fn child_texts(&self, name: &str) -> Vec<String> {
        self.children(name)
            .filter_map(XmlElement::text)
            .map(str::to_string)
            .collect()
    }
}

fn start_element(start: &BytesStart<'_>, position: usize) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError {
            position,
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| XmlError {
            position,
            message: e.to_string(),
        })?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn close_element(element: XmlElement, stack: &mut [XmlElement], root: &mut Option<XmlElement>) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let xml = br#"<?xml version="1.0"?>
            <WMS_Capabilities version="1.3.0" xmlns:xlink="http://www.w3.org/1999/xlink">
                <Service>
                    <Title>Test &amp; Demo</Title>
                    <Abstract/>
                    <OnlineResource xlink:href="http://example.com/"/>
                </Service>
                <Capability>
                    <Request><GetMap><Format>image/png</Format><Format>image/jpeg</Format></GetMap></Request>
                </Capability>
            </WMS_Capabilities>"#;

        let root = XmlElement::parse(xml).unwrap();
        assert!(root.is("wms_capabilities"));
        assert_eq!(root.attr("version"), Some("1.3.0"));

        let service = root.child("Service").unwrap();
        assert_eq!(service.child_text("Title"), Some("Test & Demo"));
        assert!(service.child("Abstract").is_some());
        assert_eq!(service.child_text("Abstract"), None);
        assert_eq!(
            service.child("OnlineResource").and_then(|e| e.attr("href")),
            Some("http://example.com/")
        );

        let formats = root
            .find(&["Capability", "Request", "GetMap"])
            .unwrap()
            .child_texts("Format");
        assert_eq!(formats, vec!["image/png", "image/jpeg"]);
    }

    #[test]
    fn test_cdata() {
        let root = XmlElement::parse(b"<Abstract><![CDATA[<b>bold</b>]]></Abstract>").unwrap();
        assert_eq!(root.text(), Some("<b>bold</b>"));
    }

    #[test]
    fn test_malformed() {
        assert!(XmlElement::parse(b"").is_err());
        assert!(XmlElement::parse(b"<a><b></a>").is_err());
        assert!(XmlElement::parse(b"<a>").is_err());
        assert!(XmlElement::parse(b"{\"json\": true}").is_err());
    }
}
