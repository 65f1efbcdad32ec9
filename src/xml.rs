use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// Attribute injected into outbound fragments to disambiguate inline siblings
/// that could otherwise be confused on reinsertion.
pub const ID_KEY: &str = "id";

/// Attribute carried on the outermost opening tag of the first fragment of an
/// extraction, recording the character length of the original text.
pub const DATA_ORIGIN_LEN_KEY: &str = "data-origin-len";

/// Handle into a [`Document`] arena. Handles stay valid across mutations;
/// detached nodes simply become unreachable from the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug, Default)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    tail: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena element tree. A node owns a tag, ordered attributes, optional
/// leading text, ordered children and the text trailing each child ("tail"),
/// plus a parent back-reference. Exactly one owner mutates a tree at a time;
/// the borrow checker enforces that here.
#[derive(Clone, Debug, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_string(),
            ..Node::default()
        });
        id
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn attrs(&self, node: NodeId) -> &[(String, String)] {
        &self.nodes[node.0].attrs
    }

    pub fn attr(&self, node: NodeId, key: &str) -> Option<&str> {
        self.nodes[node.0]
            .attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, node: NodeId, key: &str, value: &str) {
        let attrs = &mut self.nodes[node.0].attrs;
        for (k, v) in attrs.iter_mut() {
            if k == key {
                *v = value.to_string();
                return;
            }
        }
        attrs.push((key.to_string(), value.to_string()));
    }

    pub fn remove_attr(&mut self, node: NodeId, key: &str) -> Option<String> {
        let attrs = &mut self.nodes[node.0].attrs;
        let pos = attrs.iter().position(|(k, _)| k == key)?;
        Some(attrs.remove(pos).1)
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].text.as_deref()
    }

    pub fn set_text(&mut self, node: NodeId, text: Option<String>) {
        self.nodes[node.0].text = text;
    }

    pub fn tail(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].tail.as_deref()
    }

    pub fn set_tail(&mut self, node: NodeId, tail: Option<String>) {
        self.nodes[node.0].tail = tail;
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.0].children.iter().position(|&c| c == child)
    }

    /// Containment check, reflexive: a node includes itself.
    pub fn includes(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Detaches `child` from its parent and re-inserts it at `index` in
    /// `parent`'s child list. `index` is clamped to the list length.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.nodes[parent.0].children.len();
        self.insert_child(parent, len, child);
    }

    /// Removes `node` from its parent's child list. The node keeps its own
    /// content and stays addressable through its handle.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(p) = self.nodes[node.0].parent.take() {
            self.nodes[p.0].children.retain(|&c| c != node);
        }
    }

    /// Deep-copies a subtree from another arena into this one. The copy is
    /// detached; its tail is preserved.
    pub fn import(&mut self, other: &Document, node: NodeId) -> NodeId {
        let src = &other.nodes[node.0];
        let copy = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: src.tag.clone(),
            attrs: src.attrs.clone(),
            text: src.text.clone(),
            tail: src.tail.clone(),
            parent: None,
            children: Vec::new(),
        });
        for &child in &other.nodes[node.0].children {
            let c = self.import(other, child);
            self.nodes[c.0].parent = Some(copy);
            self.nodes[copy.0].children.push(c);
        }
        copy
    }

    /// Deep-copies a subtree within this arena. The copy is detached.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let (tag, attrs, text, tail, children) = {
            let n = &self.nodes[node.0];
            (
                n.tag.clone(),
                n.attrs.clone(),
                n.text.clone(),
                n.tail.clone(),
                n.children.clone(),
            )
        };
        let copy = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag,
            attrs,
            text,
            tail,
            parent: None,
            children: Vec::new(),
        });
        for child in children {
            let c = self.clone_subtree(child);
            self.nodes[c.0].parent = Some(copy);
            self.nodes[copy.0].children.push(c);
        }
        copy
    }

    /// Finite pre-order walk over a subtree, root included.
    pub fn walk(&self, root: NodeId) -> Walk<'_> {
        Walk {
            doc: self,
            stack: vec![root],
        }
    }
}

pub struct Walk<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let node = self.stack.pop()?;
        for &child in self.doc.children(node).iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Whether a tag formats text without breaking reading flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagClass {
    Inline,
    Block,
}

impl TagClass {
    pub fn of(tag: &str) -> TagClass {
        match local_name(tag) {
            "a" | "abbr" | "b" | "bdi" | "bdo" | "big" | "br" | "cite" | "code" | "dfn" | "em"
            | "i" | "kbd" | "mark" | "q" | "rp" | "rt" | "ruby" | "s" | "samp" | "small"
            | "span" | "strong" | "sub" | "sup" | "tt" | "u" | "var" | "wbr" => TagClass::Inline,
            _ => TagClass::Block,
        }
    }
}

pub fn is_inline_tag(tag: &str) -> bool {
    TagClass::of(tag) == TagClass::Inline
}

pub fn is_inline_element(doc: &Document, node: NodeId) -> bool {
    is_inline_tag(doc.tag(node))
}

/// Strips `{uri}` and `ns:` prefixes from a tag name.
pub fn local_name(tag: &str) -> &str {
    let tag = tag.rsplit_once('}').map_or(tag, |(_, t)| t);
    tag.rsplit_once(':').map_or(tag, |(_, t)| t)
}

/// Parses a standalone XML fragment into a fresh arena.
pub fn parse(xml: &str) -> anyhow::Result<(Document, NodeId)> {
    let mut doc = Document::new();
    let root = parse_fragment(&mut doc, xml)?;
    Ok((doc, root))
}

/// Parses a standalone XML fragment into an existing arena and returns its
/// root. The fragment must have exactly one root element.
pub fn parse_fragment(doc: &mut Document, xml: &str) -> anyhow::Result<NodeId> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<NodeId> = Vec::new();
    let mut root: Option<NodeId> = None;
    loop {
        match reader.read_event().context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) => {
                let el = open_element(doc, &s)?;
                attach_parsed(doc, &stack, &mut root, el)?;
                stack.push(el);
            }
            Event::Empty(s) => {
                let el = open_element(doc, &s)?;
                attach_parsed(doc, &stack, &mut root, el)?;
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(t) => {
                let text = t.unescape().context("unescape text")?;
                append_parsed_text(doc, &stack, &text)?;
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                append_parsed_text(doc, &stack, &text)?;
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(anyhow!("unclosed element in fragment"));
    }
    root.ok_or_else(|| anyhow!("no root element in fragment"))
}

fn open_element(doc: &mut Document, start: &BytesStart<'_>) -> anyhow::Result<NodeId> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let el = doc.create_element(&tag);
    for a in start.attributes() {
        let a = a.context("attr")?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let value = a.unescape_value().context("attr value")?.into_owned();
        doc.set_attr(el, &key, &value);
    }
    Ok(el)
}

fn attach_parsed(
    doc: &mut Document,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    el: NodeId,
) -> anyhow::Result<()> {
    match stack.last() {
        Some(&parent) => doc.append_child(parent, el),
        None => {
            if root.is_some() {
                return Err(anyhow!("multiple root elements in fragment"));
            }
            *root = Some(el);
        }
    }
    Ok(())
}

fn append_parsed_text(doc: &mut Document, stack: &[NodeId], text: &str) -> anyhow::Result<()> {
    let Some(&top) = stack.last() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(anyhow!("text outside of root element"));
    };
    match doc.children(top).last().copied() {
        Some(last) => {
            let mut t = doc.tail(last).unwrap_or_default().to_string();
            t.push_str(text);
            doc.set_tail(last, Some(t));
        }
        None => {
            let mut t = doc.text(top).unwrap_or_default().to_string();
            t.push_str(text);
            doc.set_text(top, Some(t));
        }
    }
    Ok(())
}

/// Serializes a subtree. The root's own tail is not rendered; it belongs to
/// the enclosing context.
pub fn render(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    render_into(doc, node, &mut out);
    out
}

fn render_into(doc: &Document, node: NodeId, out: &mut String) {
    out.push('<');
    out.push_str(doc.tag(node));
    for (k, v) in doc.attrs(node) {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        push_escaped_attr(out, v);
        out.push('"');
    }
    let children = doc.children(node);
    if doc.text(node).map_or(true, str::is_empty) && children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if let Some(text) = doc.text(node) {
        push_escaped_text(out, text);
    }
    for &child in children {
        render_into(doc, child, out);
        if let Some(tail) = doc.tail(child) {
            push_escaped_text(out, tail);
        }
    }
    out.push_str("</");
    out.push_str(doc.tag(node));
    out.push('>');
}

fn push_escaped_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn push_escaped_attr(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// Signature of a subtree's shape: tags and attributes, no text. Two sibling
/// elements with equal shape hashes cannot be told apart on reinsertion
/// except by position.
pub fn shape_hash(doc: &Document, node: NodeId) -> String {
    let mut hasher = Sha256::new();
    hash_subtree(doc, node, &mut hasher, false);
    hex::encode(hasher.finalize())
}

/// Signature of a subtree including text and tails. Callers that persist a
/// tree between a translation pass and submission can compare hashes to
/// detect mutation in between.
pub fn structure_hash(doc: &Document, node: NodeId) -> String {
    let mut hasher = Sha256::new();
    hash_subtree(doc, node, &mut hasher, true);
    hex::encode(hasher.finalize())
}

fn hash_subtree(doc: &Document, node: NodeId, hasher: &mut Sha256, with_text: bool) {
    hasher.update(b"S:");
    hasher.update(doc.tag(node).as_bytes());
    hasher.update(b"|");
    let mut map: BTreeMap<&str, &str> = BTreeMap::new();
    for (k, v) in doc.attrs(node) {
        map.insert(k.as_str(), v.as_str());
    }
    for (k, v) in map {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
    if with_text {
        if let Some(text) = doc.text(node) {
            hasher.update(b"T:");
            hasher.update(text.as_bytes());
            hasher.update(b"\n");
        }
    }
    for &child in doc.children(node) {
        hash_subtree(doc, child, hasher, with_text);
        if with_text {
            if let Some(tail) = doc.tail(child) {
                hasher.update(b"L:");
                hasher.update(tail.as_bytes());
                hasher.update(b"\n");
            }
        }
    }
    hasher.update(b"E:");
    hasher.update(doc.tag(node).as_bytes());
    hasher.update(b"\n");
}

#[cfg(test)]
mod tests {
    use super::{is_inline_tag, parse, render, shape_hash, structure_hash, Document};

    #[test]
    fn parse_assigns_text_and_tails() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        assert_eq!(doc.tag(root), "p");
        assert_eq!(doc.text(root), Some("X"));
        let children = doc.children(root).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(doc.text(children[0]), Some("A"));
        assert_eq!(doc.tail(children[0]), Some("Y"));
        assert_eq!(doc.tail(children[1]), Some("Z"));
    }

    #[test]
    fn render_round_trips_special_characters() {
        let (doc, root) = parse(r#"<field tag="a&amp;b">1 &lt; 2 &amp; "3"</field>"#).expect("parse");
        assert_eq!(doc.attr(root, "tag"), Some("a&b"));
        assert_eq!(doc.text(root), Some("1 < 2 & \"3\""));

        let rendered = render(&doc, root);
        let (doc2, root2) = parse(&rendered).expect("reparse");
        assert_eq!(doc2.attr(root2, "tag"), Some("a&b"));
        assert_eq!(doc2.text(root2), Some("1 < 2 & \"3\""));
    }

    #[test]
    fn multiple_roots_rejected() {
        assert!(parse("<a/><b/>").is_err());
    }

    #[test]
    fn unclosed_fragment_rejected() {
        assert!(parse("<p>broken").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn includes_is_reflexive_and_deep() {
        let (doc, root) = parse("<div><p><em>x</em></p><p>y</p></div>").expect("parse");
        let p = doc.children(root)[0];
        let em = doc.children(p)[0];
        assert!(doc.includes(root, em));
        assert!(doc.includes(p, p));
        assert!(!doc.includes(doc.children(root)[1], em));
    }

    #[test]
    fn insert_child_moves_between_parents() {
        let (mut doc, root) = parse("<div><p>a</p><p>b</p></div>").expect("parse");
        let first = doc.children(root)[0];
        let second = doc.children(root)[1];
        doc.insert_child(second, 0, first);
        assert_eq!(doc.children(root), &[second]);
        assert_eq!(doc.children(second), &[first]);
        assert_eq!(doc.parent(first), Some(second));
    }

    #[test]
    fn import_copies_across_arenas() {
        let (src, root) = parse("<p a=\"1\">x<em>y</em></p>").expect("parse");
        let mut dst = Document::new();
        let copy = dst.import(&src, root);
        assert_eq!(render(&dst, copy), render(&src, root));
    }

    #[test]
    fn shape_hash_ignores_text_structure_hash_does_not() {
        let (a, ra) = parse("<p><em>x</em></p>").expect("parse");
        let (b, rb) = parse("<p><em>different</em></p>").expect("parse");
        let (c, rc) = parse("<p><em class=\"q\">x</em></p>").expect("parse");
        assert_eq!(shape_hash(&a, ra), shape_hash(&b, rb));
        assert_ne!(shape_hash(&a, ra), shape_hash(&c, rc));
        assert_ne!(structure_hash(&a, ra), structure_hash(&b, rb));
    }

    #[test]
    fn tag_classification() {
        assert!(is_inline_tag("em"));
        assert!(is_inline_tag("ns:span"));
        assert!(!is_inline_tag("p"));
        assert!(!is_inline_tag("unknown-tag"));
    }
}
