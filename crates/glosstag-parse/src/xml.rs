//! Owned XML tree with a tolerant reader.
//!
//! The corpus validator needs a best-effort tree even for malformed markup,
//! so reading never aborts: every recoverable defect (implicitly closed
//! elements, stray end tags, bad character references, junk outside the
//! root) is recorded with its position and parsing continues. A document
//! counts as well-formed only when the defect list comes back empty.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Parsing stops recording after this many defects; a file this broken is
/// rejected wholesale anyway.
const MAX_DEFECTS: usize = 256;

/// One element of the parsed tree, attributes in document order.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// Parsed document: the root element plus the DOCTYPE system id, if any.
#[derive(Clone, Debug)]
pub struct Document {
    pub root: Element,
    pub doctype_system: Option<String>,
}

/// A recoverable problem found while reading markup.
#[derive(Clone, Debug)]
pub struct Defect {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl Element {
    /// First value of the named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct element children.
    pub fn children_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children_elements().find(|e| e.name == name)
    }

    /// Direct children with the given name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children_elements().filter(move |e| e.name == name)
    }

    /// All element descendants in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&Element> = self.children_elements().collect();
        stack.reverse();
        Descendants { stack }
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Whether any direct text child is more than whitespace.
    pub fn has_non_whitespace_text(&self) -> bool {
        self.children
            .iter()
            .any(|n| matches!(n, Node::Text(t) if !t.trim().is_empty()))
    }
}

/// Document-order depth-first traversal.
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let el = self.stack.pop()?;
        let children: Vec<&Element> = el.children_elements().collect();
        for child in children.into_iter().rev() {
            self.stack.push(child);
        }
        Some(el)
    }
}

/// Parse `text`, recovering from malformed markup.
///
/// Returns the tree (if any root element could be built) together with the
/// defects encountered; an empty defect list means the document was
/// well-formed.
pub fn parse_tolerant(text: &str) -> (Option<Document>, Vec<Defect>) {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let lines = LineIndex::new(text);
    let mut defects: Vec<Defect> = Vec::new();
    let mut doctype_system: Option<String> = None;
    let mut root: Option<Element> = None;
    let mut stack: Vec<Element> = Vec::new();

    loop {
        if defects.len() > MAX_DEFECTS {
            break;
        }
        let pos = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(start_element(&e, &lines, pos, &mut defects));
            }
            Ok(Event::Empty(e)) => {
                let el = start_element(&e, &lines, pos, &mut defects);
                attach(el, &mut stack, &mut root, &mut defects);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let (line, column) = lines.locate(pos);
                if let Some(idx) = stack.iter().rposition(|el| el.name == name) {
                    while stack.len() > idx + 1 {
                        if let Some(unclosed) = stack.pop() {
                            defects.push(Defect {
                                line,
                                column,
                                message: format!(
                                    "element '{}' implicitly closed by </{}>",
                                    unclosed.name, name
                                ),
                            });
                            attach(unclosed, &mut stack, &mut root, &mut defects);
                        }
                    }
                    if let Some(el) = stack.pop() {
                        attach(el, &mut stack, &mut root, &mut defects);
                    }
                } else {
                    defects.push(Defect {
                        line,
                        column,
                        message: format!("closing tag </{name}> matches no open element"),
                    });
                }
            }
            Ok(Event::Text(t)) => {
                let content = match t.unescape() {
                    Ok(c) => c.into_owned(),
                    Err(err) => {
                        let (line, column) = lines.locate(pos);
                        defects.push(Defect {
                            line,
                            column,
                            message: format!("bad character reference: {err}"),
                        });
                        String::from_utf8_lossy(&t).into_owned()
                    }
                };
                push_text(content, &mut stack, &lines, pos, &mut defects);
            }
            Ok(Event::CData(t)) => {
                let content = String::from_utf8_lossy(&t.into_inner()).into_owned();
                push_text(content, &mut stack, &lines, pos, &mut defects);
            }
            Ok(Event::DocType(t)) => {
                let raw = String::from_utf8_lossy(&t).into_owned();
                doctype_system = doctype_system_id(&raw);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                let (line, column) = lines.locate(pos);
                defects.push(Defect {
                    line,
                    column,
                    message: err.to_string(),
                });
                if reader.buffer_position() as usize == pos {
                    break;
                }
            }
        }
    }

    while let Some(el) = stack.pop() {
        defects.push(Defect {
            line: el.line,
            column: el.column,
            message: format!("unclosed element '{}'", el.name),
        });
        attach(el, &mut stack, &mut root, &mut defects);
    }

    let document = root.map(|root| Document {
        root,
        doctype_system,
    });
    (document, defects)
}

fn start_element(
    e: &BytesStart,
    lines: &LineIndex,
    pos: usize,
    defects: &mut Vec<Defect>,
) -> Element {
    let (line, column) = lines.locate(pos);
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().with_checks(false) {
        match attr {
            Ok(a) => {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                let value = match a.unescape_value() {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
                };
                attrs.push((key, value));
            }
            Err(err) => {
                defects.push(Defect {
                    line,
                    column,
                    message: format!("malformed attribute list on '{name}': {err}"),
                });
                break;
            }
        }
    }
    Element {
        name,
        attrs,
        children: Vec::new(),
        line,
        column,
    }
}

fn attach(el: Element, stack: &mut Vec<Element>, root: &mut Option<Element>, defects: &mut Vec<Defect>) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
    } else if root.is_none() {
        *root = Some(el);
    } else {
        defects.push(Defect {
            line: el.line,
            column: el.column,
            message: format!("extra root element '{}' ignored", el.name),
        });
    }
}

fn push_text(
    content: String,
    stack: &mut Vec<Element>,
    lines: &LineIndex,
    pos: usize,
    defects: &mut Vec<Defect>,
) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(content));
    } else if !content.trim().is_empty() {
        let (line, column) = lines.locate(pos);
        defects.push(Defect {
            line,
            column,
            message: "character data outside the root element".to_string(),
        });
    }
}

fn doctype_system_id(raw: &str) -> Option<String> {
    let idx = raw.find("SYSTEM")?;
    let rest = &raw[idx + "SYSTEM".len()..];
    let quote_idx = rest.find(['"', '\''])?;
    let quote = rest.as_bytes()[quote_idx] as char;
    let after = &rest[quote_idx + 1..];
    let end = after.find(quote)?;
    Some(after[..end].to_string())
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        LineIndex { starts }
    }

    fn locate(&self, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|&s| s <= offset);
        let start = self.starts[line.saturating_sub(1)];
        (line as u32, offset.saturating_sub(start) as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_clean(text: &str) -> Document {
        let (doc, defects) = parse_tolerant(text);
        assert!(defects.is_empty(), "unexpected defects: {defects:?}");
        doc.expect("document")
    }

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = parse_clean(
            "<synset id=\"n00001740\" pos=\"n\">\n  <terms><term>entity</term></terms>\n</synset>",
        );
        assert_eq!(doc.root.name, "synset");
        assert_eq!(doc.root.attr("id"), Some("n00001740"));
        assert_eq!(doc.root.attr("pos"), Some("n"));
        assert_eq!(doc.root.attr("missing"), None);
        let term = doc.root.find("terms").and_then(|t| t.find("term")).expect("term");
        assert_eq!(term.text(), "entity");
    }

    #[test]
    fn unescapes_text_and_attribute_values() {
        let doc = parse_clean("<a note=\"x &amp; y\">1 &lt; 2</a>");
        assert_eq!(doc.root.attr("note"), Some("x & y"));
        assert_eq!(doc.root.text(), "1 < 2");
    }

    #[test]
    fn empty_elements_become_leaves() {
        let doc = parse_clean("<wf><id id=\"i1\" sk=\"entity%1:03:00::\"/>entity</wf>");
        assert_eq!(doc.root.text(), "entity");
        let id = doc.root.find("id").expect("id child");
        assert_eq!(id.attr("sk"), Some("entity%1:03:00::"));
    }

    #[test]
    fn extracts_doctype_system_id() {
        let doc = parse_clean(
            "<?xml version=\"1.0\"?>\n<!DOCTYPE wordnetgloss SYSTEM \"glosstag.dtd\">\n<wordnetgloss/>",
        );
        assert_eq!(doc.doctype_system.as_deref(), Some("glosstag.dtd"));
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let doc = parse_clean("<d><wf>a</wf><q><wf>b</wf><cf>c</cf></q><wf>d</wf></d>");
        let texts: Vec<String> = doc
            .root
            .descendants()
            .filter(|e| e.name == "wf" || e.name == "cf")
            .map(|e| e.text())
            .collect();
        assert_eq!(texts, ["a", "b", "c", "d"]);
    }

    #[test]
    fn recovers_from_unclosed_elements() {
        let (doc, defects) = parse_tolerant("<root><a><b>text</root>");
        let doc = doc.expect("recovered document");
        assert_eq!(doc.root.name, "root");
        assert!(!defects.is_empty());
        let a = doc.root.find("a").expect("a kept despite missing end tag");
        assert_eq!(a.find("b").map(|b| b.text()), Some("text".to_string()));
    }

    #[test]
    fn recovers_from_truncated_document() {
        let (doc, defects) = parse_tolerant("<root><a>text");
        let doc = doc.expect("recovered document");
        assert_eq!(doc.root.name, "root");
        assert_eq!(defects.len(), 2);
        assert!(defects[0].message.contains("unclosed"));
    }

    #[test]
    fn ignores_stray_closing_tag() {
        let (doc, defects) = parse_tolerant("<root></b><a/></root>");
        let doc = doc.expect("document");
        assert!(doc.root.find("a").is_some());
        assert_eq!(defects.len(), 1);
        assert!(defects[0].message.contains("</b>"));
    }

    #[test]
    fn keeps_first_of_multiple_roots() {
        let (doc, defects) = parse_tolerant("<one/><two/>");
        assert_eq!(doc.expect("document").root.name, "one");
        assert_eq!(defects.len(), 1);
        assert!(defects[0].message.contains("two"));
    }

    #[test]
    fn plain_text_yields_no_document() {
        let (doc, defects) = parse_tolerant("this is not xml");
        assert!(doc.is_none());
        assert!(!defects.is_empty());
    }

    #[test]
    fn empty_input_yields_no_document_and_no_defects() {
        let (doc, defects) = parse_tolerant("");
        assert!(doc.is_none());
        assert!(defects.is_empty());
    }

    #[test]
    fn unknown_entity_is_kept_raw() {
        let (doc, defects) = parse_tolerant("<a>x&nope;y</a>");
        assert_eq!(doc.expect("document").root.text(), "x&nope;y");
        assert_eq!(defects.len(), 1);
        assert!(defects[0].message.contains("character reference"));
    }

    #[test]
    fn defect_positions_point_at_the_problem() {
        let (_, defects) = parse_tolerant("<root>\n  <a>\n</root>");
        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].line, 3);
    }
}
