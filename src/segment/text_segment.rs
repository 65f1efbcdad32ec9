use crate::xml::{is_inline_element, Document, NodeId};

/// An indivisible translatable text run plus its nearest block-level
/// ancestor. Derived read-only view over a tree; never mutated in place
/// except by clone-and-edit during truncation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub block_parent: NodeId,
}

impl TextSegment {
    pub fn new(text: impl Into<String>, block_parent: NodeId) -> Self {
        let text = text.into();
        debug_assert!(!text.is_empty());
        Self { text, block_parent }
    }
}

/// Extracts every non-blank text run under `root` in document order. A run
/// inside inline formatting is attributed to the nearest non-inline
/// ancestor; the subtree root falls back to itself.
pub fn search_text_segments(doc: &Document, root: NodeId) -> Vec<TextSegment> {
    let mut out = Vec::new();
    collect(doc, root, root, &mut out);
    out
}

fn collect(doc: &Document, node: NodeId, enclosing_block: NodeId, out: &mut Vec<TextSegment>) {
    let block = if is_inline_element(doc, node) {
        enclosing_block
    } else {
        node
    };
    if let Some(text) = doc.text(node) {
        if !text.trim().is_empty() {
            out.push(TextSegment::new(text, block));
        }
    }
    for &child in doc.children(node) {
        collect(doc, child, block, out);
        if let Some(tail) = doc.tail(child) {
            if !tail.trim().is_empty() {
                out.push(TextSegment::new(tail, block));
            }
        }
    }
}

/// Merges the translated segments of one mapping into a single element in
/// the target arena. Segments are grouped by the fragment element they were
/// collected from; when a block's translation was split across several
/// transform windows, the later fragments' content is spliced onto the
/// first. Returns `None` for an empty segment list.
pub fn combine_text_segments(
    fragments: &Document,
    target: &mut Document,
    segments: &[TextSegment],
) -> Option<NodeId> {
    let mut wrappers: Vec<NodeId> = Vec::new();
    for seg in segments {
        if wrappers.last() != Some(&seg.block_parent) {
            wrappers.push(seg.block_parent);
        }
    }
    let first = *wrappers.first()?;
    let base = target.import(fragments, first);
    target.set_tail(base, None);

    for &wrapper in &wrappers[1..] {
        let extra = target.import(fragments, wrapper);
        if let Some(text) = target.text(extra).map(str::to_string) {
            match target.children(base).last().copied() {
                Some(last) => {
                    let mut t = target.tail(last).unwrap_or_default().to_string();
                    t.push_str(&text);
                    target.set_tail(last, Some(t));
                }
                None => {
                    let mut t = target.text(base).unwrap_or_default().to_string();
                    t.push_str(&text);
                    target.set_text(base, Some(t));
                }
            }
        }
        for child in target.children(extra).to_vec() {
            target.append_child(base, child);
        }
    }
    Some(base)
}
