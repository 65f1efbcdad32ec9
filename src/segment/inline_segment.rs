use std::collections::HashMap;

use thiserror::Error;

use crate::xml::{is_inline_element, shape_hash, Document, NodeId, DATA_ORIGIN_LEN_KEY, ID_KEY};

use super::text_segment::TextSegment;

/// Structural mismatch between an inline segment and a transformed fragment.
/// Reported as values, never raised; a non-empty list means the transform
/// result must be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InlineError {
    #[error("expected {expected} <{tag}> children, found {found}")]
    WrongTagCount {
        tag: String,
        expected: usize,
        found: usize,
    },
    #[error("unexpected id \"{value}\" on <{tag}>")]
    UnexpectedId { tag: String, value: String },
}

#[derive(Clone, Debug)]
pub enum InlineNode {
    Inline(InlineSegment),
    Text(TextSegment),
}

/// One maximal run of text and inline formatting inside a block element,
/// cut by non-inline children. Owns the id assignment for its inline
/// children and the validation of transformed fragments against its shape.
#[derive(Clone, Debug)]
pub struct InlineSegment {
    /// Element this segment's content sits in: the block element for a
    /// top-level segment, the inline element for a nested one.
    pub parent: NodeId,
    pub tag: String,
    pub id: Option<u32>,
    pub children: Vec<InlineNode>,
}

/// Collects the inline segments of a subtree in document order. Flattening
/// every segment's text leaves reproduces `search_text_segments` output.
pub fn search_inline_segments(doc: &Document, root: NodeId) -> Vec<InlineSegment> {
    let mut out = Vec::new();
    collect_block(doc, root, &mut out);
    out
}

fn collect_block(doc: &Document, block: NodeId, out: &mut Vec<InlineSegment>) {
    let mut run: Vec<InlineNode> = Vec::new();
    if let Some(text) = doc.text(block) {
        if !text.trim().is_empty() {
            run.push(InlineNode::Text(TextSegment::new(text, block)));
        }
    }
    for &child in doc.children(block) {
        if is_inline_element(doc, child) {
            run.push(InlineNode::Inline(build_inline(doc, child, block)));
        } else {
            flush_run(doc, block, &mut run, out);
            collect_block(doc, child, out);
        }
        if let Some(tail) = doc.tail(child) {
            if !tail.trim().is_empty() {
                run.push(InlineNode::Text(TextSegment::new(tail, block)));
            }
        }
    }
    flush_run(doc, block, &mut run, out);
}

fn build_inline(doc: &Document, element: NodeId, block: NodeId) -> InlineSegment {
    let mut children: Vec<InlineNode> = Vec::new();
    if let Some(text) = doc.text(element) {
        if !text.trim().is_empty() {
            children.push(InlineNode::Text(TextSegment::new(text, block)));
        }
    }
    for &child in doc.children(element) {
        children.push(InlineNode::Inline(build_inline(doc, child, block)));
        if let Some(tail) = doc.tail(child) {
            if !tail.trim().is_empty() {
                children.push(InlineNode::Text(TextSegment::new(tail, block)));
            }
        }
    }
    InlineSegment {
        parent: element,
        tag: doc.tag(element).to_string(),
        id: None,
        children,
    }
}

fn flush_run(doc: &Document, block: NodeId, run: &mut Vec<InlineNode>, out: &mut Vec<InlineSegment>) {
    if run.is_empty() {
        return;
    }
    let mut segment = InlineSegment {
        parent: block,
        tag: doc.tag(block).to_string(),
        id: None,
        children: std::mem::take(run),
    };
    if !segment.has_text() {
        return;
    }
    assign_child_ids(doc, &mut segment);
    out.push(segment);
}

/// Same-tag sibling groups whose members are structurally indistinguishable
/// need no ids: order alone identifies them on reinsertion. A group with
/// distinguishable members gets small integer ids, unique within the direct
/// children set, which the transformed markup must carry unchanged.
fn assign_child_ids(doc: &Document, segment: &mut InlineSegment) {
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, child) in segment.children.iter().enumerate() {
        if let InlineNode::Inline(seg) = child {
            match groups.iter_mut().find(|(tag, _)| *tag == seg.tag) {
                Some((_, members)) => members.push(i),
                None => groups.push((seg.tag.clone(), vec![i])),
            }
        }
    }

    let mut next_id: u32 = 1;
    for (_, members) in &groups {
        if members.len() < 2 {
            continue;
        }
        let shapes: Vec<String> = members
            .iter()
            .map(|&i| match &segment.children[i] {
                InlineNode::Inline(seg) => shape_hash(doc, seg.parent),
                InlineNode::Text(_) => unreachable!(),
            })
            .collect();
        if shapes.iter().all(|s| *s == shapes[0]) {
            continue;
        }
        for &i in members {
            if let InlineNode::Inline(seg) = &mut segment.children[i] {
                seg.id = Some(next_id);
                next_id += 1;
            }
        }
    }

    for child in &mut segment.children {
        if let InlineNode::Inline(seg) = child {
            assign_child_ids(doc, seg);
        }
    }
}

impl InlineSegment {
    pub fn has_text(&self) -> bool {
        self.children.iter().any(|c| match c {
            InlineNode::Text(_) => true,
            InlineNode::Inline(seg) => seg.has_text(),
        })
    }

    /// Text leaves in document order.
    pub fn text_segments(&self) -> Vec<&TextSegment> {
        let mut out = Vec::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a TextSegment>) {
        for child in &self.children {
            match child {
                InlineNode::Text(t) => out.push(t),
                InlineNode::Inline(seg) => seg.collect_text(out),
            }
        }
    }

    /// Concatenated original text of the whole segment.
    pub fn full_text(&self) -> String {
        self.text_segments()
            .iter()
            .map(|t| t.text.as_str())
            .collect()
    }

    fn inline_children(&self) -> Vec<&InlineSegment> {
        self.children
            .iter()
            .filter_map(|c| match c {
                InlineNode::Inline(seg) => Some(seg),
                InlineNode::Text(_) => None,
            })
            .collect()
    }

    /// Builds the detached structural skeleton sent out for transformation:
    /// tags, nesting, and text only. Attributes are not copied, to keep the
    /// outbound token cost down; only assigned ids are injected.
    pub fn create_element(&self, out: &mut Document) -> NodeId {
        let el = out.create_element(&self.tag);
        if let Some(id) = self.id {
            out.set_attr(el, ID_KEY, &id.to_string());
        }
        for child in &self.children {
            match child {
                InlineNode::Text(t) => append_text_content(out, el, &t.text),
                InlineNode::Inline(seg) => {
                    let c = seg.create_element(out);
                    out.append_child(el, c);
                }
            }
        }
        el
    }

    /// Walks this segment and a transformed fragment in parallel and reports
    /// every structural mismatch. An empty result means the fragment is a
    /// valid skeleton match and can be merged.
    pub fn validate(&self, tdoc: &Document, template: NodeId) -> Vec<InlineError> {
        let mut errors = Vec::new();
        if tdoc.tag(template) != self.tag {
            errors.push(InlineError::WrongTagCount {
                tag: self.tag.clone(),
                expected: 1,
                found: 0,
            });
            return errors;
        }
        self.validate_into(tdoc, template, &mut errors);
        errors
    }

    fn validate_into(&self, tdoc: &Document, template: NodeId, errors: &mut Vec<InlineError>) {
        if let Some(value) = tdoc.attr(template, ID_KEY) {
            let wanted = value.parse::<u32>().ok();
            if self.id.is_none() || self.id != wanted {
                errors.push(InlineError::UnexpectedId {
                    tag: self.tag.clone(),
                    value: value.to_string(),
                });
            }
        }

        let own = self.inline_children();
        let mut tags: Vec<&str> = Vec::new();
        for child in &own {
            if !tags.contains(&child.tag.as_str()) {
                tags.push(&child.tag);
            }
        }
        for &t_child in tdoc.children(template) {
            let tag = tdoc.tag(t_child);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        for tag in tags {
            let expected = own.iter().filter(|c| c.tag == tag).count();
            let found = tdoc
                .children(template)
                .iter()
                .filter(|&&c| tdoc.tag(c) == tag)
                .count();
            if expected != found {
                errors.push(InlineError::WrongTagCount {
                    tag: tag.to_string(),
                    expected,
                    found,
                });
            }
        }

        let (matches, id_errors) = self.match_children(tdoc, template);
        errors.extend(id_errors);
        for (child, t_child) in matches {
            child.validate_into(tdoc, t_child, errors);
        }
    }

    /// Pairs template children with this segment's inline children:
    /// positional within a tag when ids are absent, id-keyed when present.
    /// An id-keyed lookup must resolve to exactly one unused candidate.
    fn match_children<'s>(
        &'s self,
        tdoc: &Document,
        template: NodeId,
    ) -> (Vec<(&'s InlineSegment, NodeId)>, Vec<InlineError>) {
        let own = self.inline_children();
        let mut used = vec![false; own.len()];
        let mut matches = Vec::new();
        let mut errors = Vec::new();

        for &t_child in tdoc.children(template) {
            let t_tag = tdoc.tag(t_child);
            if let Some(value) = tdoc.attr(t_child, ID_KEY) {
                let wanted = value.parse::<u32>().ok();
                let found = (0..own.len()).find(|&i| {
                    !used[i] && own[i].tag == t_tag && wanted.is_some() && own[i].id == wanted
                });
                match found {
                    Some(i) => {
                        used[i] = true;
                        matches.push((own[i], t_child));
                    }
                    None => errors.push(InlineError::UnexpectedId {
                        tag: t_tag.to_string(),
                        value: value.to_string(),
                    }),
                }
            } else if let Some(i) = (0..own.len()).find(|&i| !used[i] && own[i].tag == t_tag) {
                used[i] = true;
                matches.push((own[i], t_child));
            }
        }
        (matches, errors)
    }

    /// Produces an element that keeps the original element's tag and
    /// attributes but adopts the template's text and children. Run only
    /// after `validate` passes, so the protocol attributes the transform
    /// round-tripped never leak into the final document.
    pub fn assign_attributes(
        &self,
        source: &Document,
        tdoc: &Document,
        template: NodeId,
        out: &mut Document,
    ) -> NodeId {
        let el = out.create_element(&self.tag);
        for (k, v) in source.attrs(self.parent) {
            out.set_attr(el, k, v);
        }
        out.set_text(el, tdoc.text(template).map(str::to_string));

        let (matches, _) = self.match_children(tdoc, template);
        let by_template: HashMap<NodeId, &InlineSegment> =
            matches.into_iter().map(|(seg, t)| (t, seg)).collect();

        for &t_child in tdoc.children(template) {
            let child_el = match by_template.get(&t_child) {
                Some(seg) => seg.assign_attributes(source, tdoc, t_child, out),
                None => {
                    let c = out.import(tdoc, t_child);
                    strip_protocol_attrs(out, c);
                    c
                }
            };
            out.set_tail(child_el, tdoc.tail(t_child).map(str::to_string));
            out.append_child(el, child_el);
        }
        el
    }
}

fn append_text_content(doc: &mut Document, el: NodeId, text: &str) {
    match doc.children(el).last().copied() {
        Some(last) => {
            let mut t = doc.tail(last).unwrap_or_default().to_string();
            t.push_str(text);
            doc.set_tail(last, Some(t));
        }
        None => {
            let mut t = doc.text(el).unwrap_or_default().to_string();
            t.push_str(text);
            doc.set_text(el, Some(t));
        }
    }
}

fn strip_protocol_attrs(doc: &mut Document, root: NodeId) {
    let nodes: Vec<NodeId> = doc.walk(root).collect();
    for node in nodes {
        doc.remove_attr(node, ID_KEY);
        doc.remove_attr(node, DATA_ORIGIN_LEN_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::{search_inline_segments, InlineError, InlineNode};
    use crate::xml::{parse, parse_fragment, render, Document, ID_KEY};

    #[test]
    fn collects_simple_inline() {
        let (doc, root) = parse("<p>Hello <em>world</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text_segments().len(), 2);
    }

    #[test]
    fn collects_nested_inline() {
        let (doc, root) = parse("<p>A<span>B<em>C</em>D</span>E</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        assert_eq!(segments.len(), 1);
        let texts: Vec<&str> = segments[0]
            .text_segments()
            .iter()
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(texts, ["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn separated_same_tags_stay_siblings() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].children.len(), 5);
    }

    #[test]
    fn identical_siblings_get_no_id() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let ems: Vec<_> = segments[0]
            .children
            .iter()
            .filter_map(|c| match c {
                InlineNode::Inline(seg) => Some(seg),
                InlineNode::Text(_) => None,
            })
            .collect();
        assert_eq!(ems.len(), 2);
        assert_eq!(ems[0].id, None);
        assert_eq!(ems[1].id, None);
    }

    #[test]
    fn different_tags_get_no_id() {
        let (doc, root) = parse("<p><strong>A</strong><em>B</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        for child in &segments[0].children {
            if let InlineNode::Inline(seg) = child {
                assert_eq!(seg.id, None);
            }
        }
    }

    #[test]
    fn distinguishable_siblings_get_unique_ids() {
        let (doc, root) =
            parse("<p><em class=\"a\">A</em>mid<em>B</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let ids: Vec<Option<u32>> = segments[0]
            .children
            .iter()
            .filter_map(|c| match c {
                InlineNode::Inline(seg) => Some(seg.id),
                InlineNode::Text(_) => None,
            })
            .collect();
        assert_eq!(ids, [Some(1), Some(2)]);
    }

    #[test]
    fn create_element_keeps_structure_and_text() {
        let (doc, root) = parse("<p>Hello <em>world</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let mut out = Document::new();
        let el = segments[0].create_element(&mut out);
        assert_eq!(render(&out, el), "<p>Hello <em>world</em></p>");
    }

    #[test]
    fn create_element_copies_no_attributes() {
        let (doc, root) =
            parse("<p class=\"text\" id=\"p1\">Hello <em class=\"x\">w</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let mut out = Document::new();
        let el = segments[0].create_element(&mut out);
        for node in out.walk(el).collect::<Vec<_>>() {
            assert!(out.attrs(node).is_empty());
        }
    }

    #[test]
    fn create_element_deep_nesting() {
        let (doc, root) = parse("<p><span><em><strong>Deep</strong></em></span></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let mut out = Document::new();
        let el = segments[0].create_element(&mut out);
        assert_eq!(render(&out, el), "<p><span><em><strong>Deep</strong></em></span></p>");
    }

    #[test]
    fn empty_block_yields_no_segments() {
        let (doc, root) = parse("<p></p>").expect("parse");
        assert!(search_inline_segments(&doc, root).is_empty());
    }

    #[test]
    fn single_text_run() {
        let (doc, root) = parse("<p>Hello</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text_segments().len(), 1);
    }

    #[test]
    fn block_children_cut_the_run() {
        let (doc, root) =
            parse("<body>The main text begins:<p>Paragraph text</p><div>Division text</div></body>")
                .expect("parse");
        let segments = search_inline_segments(&doc, root);

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].tag, "body");
        assert_eq!(segments[0].full_text(), "The main text begins:");
        assert_eq!(segments[1].tag, "p");
        assert_eq!(segments[1].full_text(), "Paragraph text");
        assert_eq!(segments[2].tag, "div");
        assert_eq!(segments[2].full_text(), "Division text");
    }

    #[test]
    fn validate_accepts_matching_structure() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let (tdoc, template) =
            parse("<p>trans-X<em>trans-A</em>trans-Y<em>trans-B</em>trans-Z</p>").expect("parse");
        assert!(segments[0].validate(&tdoc, template).is_empty());
    }

    #[test]
    fn validate_round_trips_own_skeleton() {
        let (doc, root) = parse("<p>A<span>B<em>C</em>D</span>E</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let mut out = Document::new();
        let el = segments[0].create_element(&mut out);
        assert!(segments[0].validate(&out, el).is_empty());
    }

    #[test]
    fn validate_reports_wrong_tag_count() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let (tdoc, template) = parse("<p>trans-X<em>trans-A</em>trans-YZ</p>").expect("parse");
        let errors = segments[0].validate(&tdoc, template);
        assert!(errors
            .iter()
            .any(|e| matches!(e, InlineError::WrongTagCount { tag, expected: 2, found: 1 } if tag == "em")));
    }

    #[test]
    fn validate_reports_unexpected_id() {
        let (doc, root) = parse("<p>X<em>A</em>Y<em>B</em>Z</p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let markup = format!(
            "<p>trans-X<em {ID_KEY}=\"999\">trans-A</em>trans-Y<em>trans-B</em>trans-Z</p>"
        );
        let (tdoc, template) = parse(&markup).expect("parse");
        let errors = segments[0].validate(&tdoc, template);
        assert!(errors
            .iter()
            .any(|e| matches!(e, InlineError::UnexpectedId { value, .. } if value == "999")));
    }

    #[test]
    fn assign_attributes_keeps_originals() {
        let (doc, root) =
            parse("<p class=\"original\">Hello <em data-k=\"v\">world</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let (tdoc, template) =
            parse("<p class=\"translated\">trans-Hello <em>trans-world</em></p>").expect("parse");
        let mut out = Document::new();
        let el = segments[0].assign_attributes(&doc, &tdoc, template, &mut out);

        assert_eq!(out.attr(el, "class"), Some("original"));
        assert_eq!(out.tag(el), "p");
        assert_eq!(out.text(el), Some("trans-Hello "));
        let em = out.children(el)[0];
        assert_eq!(out.attr(em, "data-k"), Some("v"));
        assert_eq!(out.text(em), Some("trans-world"));
    }

    #[test]
    fn assign_attributes_strips_round_tripped_ids() {
        let (doc, root) =
            parse("<p><em class=\"a\">A</em>mid<em>B</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        // The transform echoes the injected ids; the merged element must not.
        let mut out = Document::new();
        let mut tdoc = Document::new();
        let template = parse_fragment(
            &mut tdoc,
            "<p><em id=\"1\">tA</em>tmid<em id=\"2\">tB</em></p>",
        )
        .expect("parse");
        assert!(segments[0].validate(&tdoc, template).is_empty());
        let el = segments[0].assign_attributes(&doc, &tdoc, template, &mut out);
        let rendered = render(&out, el);
        assert!(!rendered.contains("id="));
        assert!(rendered.contains("class=\"a\""));
    }

    #[test]
    fn id_keyed_match_follows_ids_not_order() {
        let (doc, root) =
            parse("<p><em class=\"a\">A</em>mid<em>B</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        // Swapped order in the template; ids resolve the pairing.
        let (tdoc, template) =
            parse("<p><em id=\"2\">tB</em>tmid<em id=\"1\">tA</em></p>").expect("parse");
        assert!(segments[0].validate(&tdoc, template).is_empty());

        let mut out = Document::new();
        let el = segments[0].assign_attributes(&doc, &tdoc, template, &mut out);
        // First template child matched the id=2 original (no class attr),
        // second matched the class="a" original.
        let children = out.children(el).to_vec();
        assert_eq!(out.attr(children[0], "class"), None);
        assert_eq!(out.attr(children[1], "class"), Some("a"));
    }

    #[test]
    fn duplicate_template_id_is_rejected() {
        let (doc, root) =
            parse("<p><em class=\"a\">A</em>mid<em>B</em></p>").expect("parse");
        let segments = search_inline_segments(&doc, root);

        let (tdoc, template) =
            parse("<p><em id=\"1\">tA</em>tmid<em id=\"1\">tB</em></p>").expect("parse");
        let errors = segments[0].validate(&tdoc, template);
        assert!(errors
            .iter()
            .any(|e| matches!(e, InlineError::UnexpectedId { value, .. } if value == "1")));
    }
}
