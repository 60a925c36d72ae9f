use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Namespace-agnostic element tree. Camera firmwares disagree on prefixes, so lookups go by
/// local name only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = vec![XmlNode::default()];
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => stack.push(Self::open(&e)),
                Ok(Event::Empty(e)) => {
                    let node = Self::open(&e);
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(node);
                    }
                }
                Ok(Event::End(_)) => {
                    if stack.len() < 2 {
                        return Err("unbalanced closing tag".to_string());
                    }
                    if let Some(node) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|e| format!("XML text error: {}", e))?;
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(format!("XML parsing error: {}", e)),
                _ => {}
            }
            buf.clear();
        }

        if stack.len() != 1 {
            return Err("unexpected end of document".to_string());
        }
        let mut root = stack.pop().unwrap_or_default();
        match root.children.len() {
            0 => Err("empty document".to_string()),
            _ => Ok(root.children.swap_remove(0)),
        }
    }

    fn open(e: &BytesStart<'_>) -> XmlNode {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
        let attributes = e
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
                let value = attr
                    .unescape_value()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
                (key, value)
            })
            .collect();
        XmlNode {
            name,
            attributes,
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child with this local name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Depth-first search over descendants, not including `self`.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlNode> {
        let mut out = Vec::new();
        self.collect(name, &mut out);
        out
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlNode>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.collect(name, out);
        }
    }

    /// Trimmed text of the first descendant with this name, if non-empty.
    pub fn text_of(&self, name: &str) -> Option<&str> {
        self.find(name)
            .map(|n| n.text.trim())
            .filter(|t| !t.is_empty())
    }

    /// Text of a nested path of direct children, e.g. `["Device", "XAddr"]`.
    pub fn path_text(&self, path: &[&str]) -> Option<&str> {
        let mut node = self;
        for segment in path {
            node = node.child(segment)?;
        }
        let text = node.text.trim();
        (!text.is_empty()).then_some(text)
    }

    pub fn bool_of(&self, name: &str) -> Option<bool> {
        self.text_of(name).map(|t| t.eq_ignore_ascii_case("true") || t == "1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_ignored() {
        let xml = r#"<a:Root xmlns:a="urn:a" xmlns:b="urn:b">
            <b:Item b:token="one">first</b:Item>
            <Item token="two"><Inner>deep &amp; escaped</Inner></Item>
            <b:Empty/>
        </a:Root>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.name, "Root");
        let items: Vec<_> = root.children_named("Item").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attr("token"), Some("one"));
        assert_eq!(root.text_of("Inner"), Some("deep & escaped"));
        assert!(root.child("Empty").is_some());
        assert_eq!(root.path_text(&["Item"]), Some("first"));
    }

    #[test]
    fn test_find_all_is_depth_first() {
        let xml = "<r><x>1</x><y><x>2</x></y><x>3</x></r>";
        let root = XmlNode::parse(xml).unwrap();
        let texts: Vec<_> = root.find_all("x").iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_truncated_document_is_rejected() {
        assert!(XmlNode::parse("<r><x>1</x>").is_err());
        assert!(XmlNode::parse("").is_err());
    }
}
