use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::segment::{combine_text_segments, TextSegment};
use crate::xml::{is_inline_element, Document, NodeId};

/// How translated content augments the original block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitKind {
    /// Substitute the translated content for the original in place.
    #[default]
    Replace,
    /// Splice the translated text after the original text, element by
    /// element.
    AppendText,
    /// Insert the translated content as a new sibling after the original
    /// block, which is left untouched.
    AppendBlock,
}

/// One block element of the original tree paired with its translated
/// segments. The segments reference elements in a separate fragment arena.
#[derive(Clone, Debug)]
pub struct SegmentMapping {
    pub block: NodeId,
    pub segments: Vec<TextSegment>,
}

/// Applies translated mappings back into the original tree, preserving every
/// non-translated sibling, attribute, and tail exactly. Mappings must arrive
/// in document order. Returns the new root when the top-level block was
/// wholly replaced, otherwise the given root.
pub fn submit(
    doc: &mut Document,
    fragments: &Document,
    root: NodeId,
    kind: SubmitKind,
    mappings: Vec<SegmentMapping>,
) -> NodeId {
    let nodes = nest_nodes(doc, mappings);
    let mut submitter = Submitter {
        doc,
        fragments,
        kind,
    };
    let mut replaced_root = None;
    for node in &nodes {
        let submitted = submitter.submit_node(node);
        if replaced_root.is_none() {
            replaced_root = submitted;
        }
    }
    replaced_root.unwrap_or(root)
}

/// A mapping nested back into tree shape. `items` is empty for a peak
/// structure; a platform structure lists its nested children, each preceded
/// by the text that reads before it.
struct SubmitNode {
    raw_element: NodeId,
    items: Vec<(Vec<TextSegment>, SubmitNode)>,
    tail_text_segments: Vec<TextSegment>,
}

/// Rebuilds the nesting implied by document-ordered mappings with a stack
/// over three transitions: continue the same open block, descend into a
/// contained one, or pop entries whose containment ended before retrying.
fn nest_nodes(doc: &Document, mappings: Vec<SegmentMapping>) -> Vec<SubmitNode> {
    let mut roots: Vec<SubmitNode> = Vec::new();
    let mut stack: Vec<SubmitNode> = Vec::new();

    for SegmentMapping { block, segments } in mappings {
        let mut keep_depth = 0usize;
        let mut upwards = false;
        for i in (0..stack.len()).rev() {
            if stack[i].raw_element == block {
                keep_depth = i + 1;
                upwards = true;
                break;
            }
        }
        if !upwards {
            for i in (0..stack.len()).rev() {
                if doc.includes(stack[i].raw_element, block) {
                    keep_depth = i + 1;
                    break;
                }
            }
        }

        while stack.len() > keep_depth {
            if let Some(folded) = fold_top_of_stack(&mut stack) {
                if !upwards {
                    roots.push(folded);
                }
            }
        }

        if upwards {
            stack[keep_depth - 1].tail_text_segments.extend(segments);
        } else {
            stack.push(SubmitNode {
                raw_element: block,
                items: Vec::new(),
                tail_text_segments: segments,
            });
        }
    }

    while !stack.is_empty() {
        if let Some(folded) = fold_top_of_stack(&mut stack) {
            roots.push(folded);
        }
    }
    roots
}

fn fold_top_of_stack(stack: &mut Vec<SubmitNode>) -> Option<SubmitNode> {
    let child = stack.pop()?;
    match stack.last_mut() {
        None => Some(child),
        Some(parent) => {
            let preceding = std::mem::take(&mut parent.tail_text_segments);
            parent.items.push((preceding, child));
            None
        }
    }
}

fn find_anchor_in_parent(doc: &Document, parent: NodeId, descendant: NodeId) -> Option<NodeId> {
    for &child in doc.children(parent) {
        if child == descendant {
            return Some(descendant);
        }
    }
    for &child in doc.children(parent) {
        if doc.includes(child, descendant) {
            return Some(child);
        }
    }
    None
}

struct Submitter<'d> {
    doc: &'d mut Document,
    fragments: &'d Document,
    kind: SubmitKind,
}

impl Submitter<'_> {
    fn submit_node(&mut self, node: &SubmitNode) -> Option<NodeId> {
        if !node.items.is_empty() || self.kind == SubmitKind::AppendText {
            self.submit_by_text(node)
        } else {
            self.submit_by_block(node)
        }
    }

    fn combine(&mut self, segments: &[TextSegment]) -> Option<NodeId> {
        combine_text_segments(self.fragments, self.doc, segments)
    }

    /// Peak structure: one atomic operation against the block's parent.
    fn submit_by_block(&mut self, node: &SubmitNode) -> Option<NodeId> {
        let raw = node.raw_element;
        let parent = match self.doc.parent(raw) {
            Some(p) => p,
            None => return self.submit_root_block(node),
        };

        let mut preserved: Vec<NodeId> = Vec::new();
        if self.kind == SubmitKind::Replace {
            for child in self.doc.children(raw).to_vec() {
                if !is_inline_element(self.doc, child) {
                    self.doc.set_tail(child, None);
                    preserved.push(child);
                }
            }
        }

        let mut index = self.doc.index_of(parent, raw).unwrap_or(0);
        let combined = self.combine(&node.tail_text_segments);
        if let Some(c) = combined {
            self.space_before_inline_block(c);
            self.doc.insert_child(parent, index + 1, c);
            index += 1;
        }
        for &elem in &preserved {
            self.doc.insert_child(parent, index + 1, elem);
            index += 1;
        }

        if combined.is_some() || !preserved.is_empty() {
            let raw_tail = self.doc.tail(raw).map(str::to_string);
            if let Some(&last) = preserved.last() {
                self.doc.set_tail(last, raw_tail);
            } else if let Some(c) = combined {
                self.doc.set_tail(c, raw_tail);
            }
            self.doc.set_tail(raw, None);
            if self.kind == SubmitKind::Replace {
                self.doc.detach(raw);
            }
        }
        None
    }

    /// A mapped block with no parent is the subtree root itself. Under
    /// Replace the combined element becomes the new root; otherwise the
    /// translated content is appended inside the untouched root.
    fn submit_root_block(&mut self, node: &SubmitNode) -> Option<NodeId> {
        let raw = node.raw_element;
        let combined = self.combine(&node.tail_text_segments)?;
        if self.kind == SubmitKind::Replace {
            for child in self.doc.children(raw).to_vec() {
                if !is_inline_element(self.doc, child) {
                    self.doc.set_tail(child, None);
                    self.doc.append_child(combined, child);
                }
            }
            Some(combined)
        } else {
            self.space_before_inline_block(combined);
            self.doc.append_child(raw, combined);
            None
        }
    }

    /// In AppendBlock mode an inline-rooted fragment runs on from the
    /// preceding content, so its leading text gets a separating space.
    fn space_before_inline_block(&mut self, combined: NodeId) {
        if self.kind != SubmitKind::AppendBlock || !is_inline_element(self.doc, combined) {
            return;
        }
        if let Some(text) = self.doc.text(combined) {
            if !text.is_empty() {
                let text = format!(" {text}");
                self.doc.set_text(combined, Some(text));
            }
        }
    }

    /// Platform structure: the block is cut by nested mappings, so translated
    /// text is spliced element by element around each nested child.
    fn submit_by_text(&mut self, node: &SubmitNode) -> Option<NodeId> {
        let raw = node.raw_element;
        let mut replaced_root: Option<NodeId> = None;

        let child_raws: HashSet<NodeId> =
            node.items.iter().map(|(_, n)| n.raw_element).collect();
        let mut tail_elements: HashMap<NodeId, NodeId> = HashMap::new();
        let mut last_anchor: Option<NodeId> = None;
        for &child in self.doc.children(raw) {
            if child_raws.contains(&child) {
                if let Some(prev) = last_anchor {
                    tail_elements.insert(child, prev);
                }
                last_anchor = Some(child);
            }
        }

        for (text_segments, child_node) in &node.items {
            let anchor = match find_anchor_in_parent(self.doc, raw, child_node.raw_element) {
                Some(a) => a,
                // The nesting pass verified containment; an unlocatable
                // anchor is skipped rather than corrupting the tree.
                None => continue,
            };
            let tail_element = tail_elements.get(&anchor).copied();

            let mut preserved: Vec<NodeId> = Vec::new();
            if self.kind == SubmitKind::Replace {
                if let Some(end_index) = self.doc.index_of(raw, anchor) {
                    preserved = self.remove_elements_after_tail(raw, tail_element, Some(end_index));
                }
            }

            self.append_combined_after_tail(raw, text_segments, tail_element, Some(anchor), false);

            if !preserved.is_empty() {
                if let Some(pos) = self.doc.index_of(raw, anchor) {
                    for (i, &elem) in preserved.iter().enumerate() {
                        self.doc.insert_child(raw, pos + i, elem);
                    }
                }
            }
        }

        for (_, child_node) in &node.items {
            let submitted = self.submit_node(child_node);
            if replaced_root.is_none() {
                replaced_root = submitted;
            }
        }

        let last_element = self.doc.children(raw).last().copied();
        let mut tail_preserved: Vec<NodeId> = Vec::new();
        if self.kind == SubmitKind::Replace {
            tail_preserved = self.remove_elements_after_tail(raw, last_element, None);
        }
        self.append_combined_after_tail(raw, &node.tail_text_segments, last_element, None, true);
        for &elem in &tail_preserved {
            self.doc.append_child(raw, elem);
        }

        replaced_root
    }

    /// Strips replaced content between a previous anchor's position and
    /// `end_index`, severing the boundary tail, and hands back the
    /// non-inline elements that must survive the replacement.
    fn remove_elements_after_tail(
        &mut self,
        raw: NodeId,
        tail_element: Option<NodeId>,
        end_index: Option<usize>,
    ) -> Vec<NodeId> {
        let start_index = match tail_element {
            None => {
                self.doc.set_text(raw, None);
                0
            }
            Some(t) => {
                self.doc.set_tail(t, None);
                match self.doc.index_of(raw, t) {
                    Some(i) => i + 1,
                    None => return Vec::new(),
                }
            }
        };
        let end_index = end_index
            .unwrap_or_else(|| self.doc.children(raw).len())
            .max(start_index);

        let doomed: Vec<NodeId> = self.doc.children(raw)[start_index..end_index].to_vec();
        let mut preserved: Vec<NodeId> = Vec::new();
        for &elem in &doomed {
            if !is_inline_element(self.doc, elem) {
                self.doc.set_tail(elem, None);
                preserved.push(elem);
            }
        }
        for &elem in doomed.iter().rev() {
            self.doc.detach(elem);
        }
        preserved
    }

    /// Splices combined translated content in after `tail_element`, or
    /// before `anchor`, or at the start or end of the node. Leading text
    /// merges onto the nearest preceding text position; the combined
    /// element's children move in as siblings.
    fn append_combined_after_tail(
        &mut self,
        raw: NodeId,
        segments: &[TextSegment],
        tail_element: Option<NodeId>,
        anchor: Option<NodeId>,
        append_to_end: bool,
    ) {
        let Some(combined) = self.combine(segments) else {
            return;
        };

        if let Some(text) = self.doc.text(combined).map(str::to_string) {
            if !text.is_empty() {
                let inject = self.kind == SubmitKind::AppendText
                    || (self.kind == SubmitKind::AppendBlock
                        && is_inline_element(self.doc, combined));
                if let Some(t) = tail_element {
                    let merged = append_text_onto(self.doc.tail(t), &text, inject);
                    self.doc.set_tail(t, Some(merged));
                } else if let Some(anchor) = anchor {
                    let ref_index = self.doc.index_of(raw, anchor).unwrap_or(0);
                    if ref_index > 0 {
                        let prev = self.doc.children(raw)[ref_index - 1];
                        let merged = append_text_onto(self.doc.tail(prev), &text, inject);
                        self.doc.set_tail(prev, Some(merged));
                    } else {
                        let merged = append_text_onto(self.doc.text(raw), &text, inject);
                        self.doc.set_text(raw, Some(merged));
                    }
                } else {
                    let merged = append_text_onto(self.doc.text(raw), &text, inject);
                    self.doc.set_text(raw, Some(merged));
                }
            }
        }

        let insert_position = if let Some(t) = tail_element {
            self.doc.index_of(raw, t).map(|i| i + 1).unwrap_or(0)
        } else if append_to_end {
            self.doc.children(raw).len()
        } else if let Some(anchor) = anchor {
            self.doc.index_of(raw, anchor).unwrap_or(0)
        } else {
            0
        };
        for (i, child) in self.doc.children(combined).to_vec().into_iter().enumerate() {
            self.doc.insert_child(raw, insert_position + i, child);
        }
    }
}

fn append_text_onto(origin: Option<&str>, append: &str, inject_space: bool) -> String {
    match origin {
        None => append.to_string(),
        Some(origin) if inject_space => {
            format!("{} {}", origin.trim_end(), append.trim_start())
        }
        Some(origin) => format!("{origin}{append}"),
    }
}
