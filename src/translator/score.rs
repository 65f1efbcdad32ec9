use crate::segment::{InlineNode, InlineSegment, TextSegment};
use crate::tokenizer::Tokenizer;
use crate::xml::{DATA_ORIGIN_LEN_KEY, ID_KEY};

/// Flat weight added per id-carrying ancestor: carrying an id means the
/// transform result has to be checked against it, which is worth avoiding
/// when the budget is tight.
const ID_WEIGHT: usize = 80;

const ELLIPSIS: &str = "...";

/// One text run of an inline segment together with the ancestor chain needed
/// to render it as a standalone fragment. `score` is the token cost of that
/// rendering plus the id weights.
#[derive(Clone, Debug)]
pub struct ScoreSegment<'a> {
    pub text_segment: TextSegment,
    pub left_parents: Vec<&'a InlineSegment>,
    pub right_parents: Vec<&'a InlineSegment>,
    pub text_tokens: Vec<u32>,
    pub score: usize,
}

enum ExpandItem<'a> {
    Open(&'a InlineSegment),
    Close(&'a InlineSegment),
    Text(&'a TextSegment),
}

/// Expands an inline segment into scored text runs: a finite, single-pass
/// sequence. A new run starts whenever two text leaves are separated by any
/// inline boundary. The first run's rendering reserves space for the
/// origin-length marker on its outermost opening tag.
pub fn expand_to_score_segments<'a, T: Tokenizer>(
    tokenizer: &'a T,
    inline_segment: &'a InlineSegment,
) -> ScoreExpansion<'a, T> {
    let mut events = Vec::new();
    expand_as_wrapped(inline_segment, &mut events);
    ScoreExpansion {
        tokenizer,
        events: events.into_iter(),
        pending: None,
        left: Vec::new(),
        right: Vec::new(),
        emitted: 0,
    }
}

fn expand_as_wrapped<'a>(segment: &'a InlineSegment, out: &mut Vec<ExpandItem<'a>>) {
    out.push(ExpandItem::Open(segment));
    for child in &segment.children {
        match child {
            InlineNode::Inline(seg) => expand_as_wrapped(seg, out),
            InlineNode::Text(text) => out.push(ExpandItem::Text(text)),
        }
    }
    out.push(ExpandItem::Close(segment));
}

pub struct ScoreExpansion<'a, T> {
    tokenizer: &'a T,
    events: std::vec::IntoIter<ExpandItem<'a>>,
    pending: Option<TextSegment>,
    left: Vec<&'a InlineSegment>,
    right: Vec<&'a InlineSegment>,
    emitted: usize,
}

impl<'a, T: Tokenizer> ScoreExpansion<'a, T> {
    fn finish(&mut self, text_segment: TextSegment) -> ScoreSegment<'a> {
        let mut segment = ScoreSegment {
            text_segment,
            left_parents: std::mem::take(&mut self.left),
            right_parents: std::mem::take(&mut self.right),
            text_tokens: Vec::new(),
            score: 0,
        };
        let rendered = render_for_scoring(&segment, self.emitted == 0);
        segment.text_tokens = self.tokenizer.encode(&segment.text_segment.text);
        segment.score = self.tokenizer.encode(&rendered).len()
            + ID_WEIGHT
                * segment
                    .left_parents
                    .iter()
                    .filter(|p| p.id.is_some())
                    .count();
        self.emitted += 1;
        segment
    }
}

impl<'a, T: Tokenizer> Iterator for ScoreExpansion<'a, T> {
    type Item = ScoreSegment<'a>;

    fn next(&mut self) -> Option<ScoreSegment<'a>> {
        loop {
            match self.events.next() {
                Some(ExpandItem::Text(text)) => {
                    if let Some(prev) = self.pending.replace(text.clone()) {
                        return Some(self.finish(prev));
                    }
                }
                Some(ExpandItem::Open(segment)) => {
                    if let Some(prev) = self.pending.take() {
                        let done = self.finish(prev);
                        self.left.push(segment);
                        return Some(done);
                    }
                    self.left.push(segment);
                }
                Some(ExpandItem::Close(segment)) => {
                    if self.pending.is_none() {
                        // No text inside: the wrapper contributes nothing to
                        // any run's rendering cost.
                        self.left.clear();
                    } else {
                        self.right.push(segment);
                    }
                }
                None => return self.pending.take().map(|t| self.finish(t)),
            }
        }
    }
}

// Placeholder rendering used only for cost measurement; the id value and
// the origin-length field are stand-ins sized like real ones.
fn render_for_scoring(segment: &ScoreSegment<'_>, is_first: bool) -> String {
    let mut out = String::new();
    for (i, parent) in segment.left_parents.iter().enumerate() {
        out.push('<');
        out.push_str(&parent.tag);
        if parent.id.is_some() {
            out.push_str(" id=\"99\"");
        }
        if is_first && i == 0 {
            out.push(' ');
            out.push_str(DATA_ORIGIN_LEN_KEY);
            out.push_str("=\"9999\"");
        }
        out.push('>');
    }
    out.push_str(&segment.text_segment.text);
    for parent in &segment.right_parents {
        out.push_str("</");
        out.push_str(&parent.tag);
        out.push('>');
    }
    out
}

/// Renders a score segment as real outbound markup, with actual id values
/// and, when `origin_len` is given on the first segment, the actual
/// origin-length marker. Close tags come innermost first, so concatenating
/// one inline segment's runs yields the full fragment markup.
pub fn render_outbound(segment: &ScoreSegment<'_>, is_first: bool, origin_len: Option<usize>) -> String {
    let mut out = String::new();
    for (i, parent) in segment.left_parents.iter().enumerate() {
        out.push('<');
        out.push_str(&parent.tag);
        if let Some(id) = parent.id {
            out.push_str(&format!(" {ID_KEY}=\"{id}\""));
        }
        if is_first && i == 0 {
            if let Some(len) = origin_len {
                out.push_str(&format!(" {DATA_ORIGIN_LEN_KEY}=\"{len}\""));
            }
        }
        out.push('>');
    }
    push_escaped(&mut out, &segment.text_segment.text);
    for parent in &segment.right_parents {
        out.push_str("</");
        out.push_str(&parent.tag);
        out.push('>');
    }
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Shrinks a score segment so its total score fits `remain_score`. Returns
/// `None` when even deleting all the text cannot reach the budget, or when
/// only whitespace would survive. The ellipsis marker appended on the cut
/// side is deliberately not re-measured against the budget; the overshoot
/// is small and bounded, and the arithmetic stays deterministic.
pub fn truncate_score_segment<'a, T: Tokenizer>(
    tokenizer: &T,
    segment: &ScoreSegment<'a>,
    remain_head: bool,
    remain_score: usize,
) -> Option<ScoreSegment<'a>> {
    let fixed_score = segment.score.saturating_sub(segment.text_tokens.len());
    if remain_score <= fixed_score {
        return None;
    }
    let remain_text_tokens = remain_score - fixed_score;

    let kept = if remain_head {
        &segment.text_tokens[..remain_text_tokens.min(segment.text_tokens.len())]
    } else {
        &segment.text_tokens[segment.text_tokens.len().saturating_sub(remain_text_tokens)..]
    };
    let remain_text = tokenizer.decode(kept);
    if remain_text.trim().is_empty() {
        return None;
    }

    let remain_text = if remain_head {
        format!("{remain_text} {ELLIPSIS}")
    } else {
        format!("{ELLIPSIS} {remain_text}")
    };

    let mut text_segment = segment.text_segment.clone();
    text_segment.text = remain_text.clone();

    Some(ScoreSegment {
        text_segment,
        left_parents: segment.left_parents.clone(),
        right_parents: segment.right_parents.clone(),
        text_tokens: tokenizer.encode(&remain_text),
        score: remain_text_tokens + fixed_score,
    })
}
