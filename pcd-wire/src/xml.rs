//! Small owned element tree over `quick-xml`, enough for query results and PCD-01 messages.

use pcd_core::{PcdError, PcdResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Attribute value, or an empty string when the attribute is absent.
    pub fn attribute_or_empty(&self, key: &str) -> &str {
        self.attribute(key).unwrap_or_default()
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Follow a chain of child names, taking the first match at each level.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// All elements named `name` in document order, this element included.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect_named(name, found);
        }
    }

    /// Text of this element followed by the text of every descendant.
    pub fn text_content(&self) -> String {
        let mut content = self.text.clone();
        for child in &self.children {
            content.push_str(&child.text_content());
        }
        content
    }

    pub fn parse(xml: &str) -> PcdResult<Element> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => stack.push(element_from_start(&start)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| PcdError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(xml_error)?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    let bytes = data.into_inner();
                    let text = std::str::from_utf8(&bytes).map_err(xml_error)?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(PcdError::Xml("unexpected end of document".to_string()));
        }

        root.ok_or_else(|| PcdError::Xml("document has no root element".to_string()))
    }

    /// Serialize with an XML declaration, UTF-8 encoded.
    pub fn to_xml_string(&self) -> PcdResult<String> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_error)?;
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(xml_error)
    }

    fn write_to<W: std::io::Write>(&self, writer: &mut Writer<W>) -> PcdResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_empty() && self.children.is_empty() {
            return writer.write_event(Event::Empty(start)).map_err(xml_error);
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(xml_error)?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)
    }
}

fn element_from_start(start: &BytesStart) -> PcdResult<Element> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);

    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(xml_error)?;
        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> PcdResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(PcdError::Xml("multiple root elements".to_string()));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn xml_error(err: impl std::fmt::Display) -> PcdError {
    PcdError::Xml(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_attributes_and_text() {
        let root = Element::parse(
            r#"<trend>
                <point uid="a" time="t1"/>
                <group><point uid="b">x &amp; y</point></group>
            </trend>"#,
        )
        .unwrap();

        assert_eq!(root.name, "trend");
        let points = root.descendants("point");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].attribute("uid"), Some("a"));
        assert_eq!(points[1].text, "x & y");
        assert_eq!(points[0].attribute_or_empty("sampleRate"), "");
    }

    #[test]
    fn rejects_unbalanced_documents() {
        assert!(matches!(
            Element::parse("<trend><point></trend>"),
            Err(PcdError::Xml(_))
        ));
        assert!(matches!(Element::parse("<a/><b/>"), Err(PcdError::Xml(_))));
        assert!(matches!(Element::parse(""), Err(PcdError::Xml(_))));
    }

    #[test]
    fn written_document_parses_back() {
        let element = Element::new("Root")
            .with_attribute("id", "1 < 2")
            .with_child(Element::new("Empty").with_attribute("idLocal", ""))
            .with_child(Element::new("Leaf").with_text("a & b"));

        let xml = element.to_xml_string().unwrap();
        assert!(xml.starts_with("<?xml"));

        let parsed = Element::parse(&xml).unwrap();
        assert_eq!(parsed, element);
        assert_eq!(parsed.find(&["Leaf"]).map(|leaf| leaf.text.as_str()), Some("a & b"));
    }
}
