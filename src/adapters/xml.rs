use crate::utils::error::{Result, WranglerError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A parsed element. Names are local names: namespace prefixes are kept
/// in `prefix` but ignored by every lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub prefix: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    text: String,
}

fn split_qname(raw: &[u8]) -> (Option<String>, String) {
    let qname = String::from_utf8_lossy(raw);
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.into_owned()),
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement> {
    let (prefix, name) = split_qname(start.name().as_ref());
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let (_, key) = split_qname(attr.key.as_ref());
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        prefix,
        attributes,
        ..Default::default()
    })
}

impl XmlElement {
    /// Parse a whole document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(open_element(&e)?),
                Event::Empty(e) => {
                    let element = open_element(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = root.or(Some(element)),
                    }
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| WranglerError::parse("XML", "unbalanced end tag"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = root.or(Some(element)),
                    }
                }
                Event::Text(t) => {
                    if let Some(current) = stack.last_mut() {
                        let text = match t.unescape() {
                            Ok(s) => s.into_owned(),
                            Err(_) => String::from_utf8_lossy(&t).into_owned(),
                        };
                        current.text.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(WranglerError::parse("XML", "document ended inside an element"));
        }
        root.ok_or_else(|| WranglerError::parse("XML", "document has no root element"))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Every element below this one with the given name, depth first.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants(name));
        }
        found
    }

    /// Direct text, trimmed. `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let t = self.text.trim();
        (!t.is_empty()).then_some(t)
    }

    /// Text of this element and everything below it.
    pub fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            let inner = child.text_content();
            if !inner.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(&inner);
            }
        }
        out.trim().to_string()
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.text())
    }

    /// Follow a path of child names, e.g. `["titles", "work", "title"]`
    /// returns every match at the end of the path.
    pub fn path<'a>(&'a self, names: &[&str]) -> Vec<&'a XmlElement> {
        let mut current = vec![self];
        for name in names {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(|c| c.name == *name))
                .collect();
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_namespaced_document() {
        let doc = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom" xmlns:simplified="http://librarysimplified.org/terms/">
              <title>Open &amp; free</title>
              <link rel="next" href="http://example.com/2"/>
              <entry>
                <author><name>Austen, Jane</name><simplified:sort_name>Austen, Jane</simplified:sort_name></author>
                <summary><![CDATA[<p>Hi</p>]]></summary>
              </entry>
            </feed>"#;

        let root = XmlElement::parse(doc).unwrap();

        assert_eq!(root.name, "feed");
        assert_eq!(root.child_text("title"), Some("Open & free"));
        assert_eq!(root.child("link").unwrap().attr("href"), Some("http://example.com/2"));
        let entry = root.child("entry").unwrap();
        let sort_name = entry.path(&["author", "sort_name"]);
        assert_eq!(sort_name[0].prefix.as_deref(), Some("simplified"));
        assert_eq!(entry.child_text("summary"), Some("<p>Hi</p>"));
        assert_eq!(root.descendants("name").len(), 1);
    }

    #[test]
    fn test_malformed_documents_are_errors() {
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("<a><b>").is_err());
    }
}
