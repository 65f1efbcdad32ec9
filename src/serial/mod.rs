mod chunk;

pub use chunk::{split_into_chunks, Chunk, Chunks};

use anyhow::anyhow;

/// Capability contract for anything that can flow through the chunk engine.
///
/// `from_text` is prototype-style: an existing segment builds its
/// replacement from transformed text, keeping whatever tokenizer or
/// bookkeeping it carries. Truncation returns `None` when nothing useful
/// would survive at the requested budget.
pub trait Segment {
    type Payload;

    fn payload(&self) -> &Self::Payload;
    fn tokens(&self) -> usize;
    fn from_text(&self, text: String) -> Self
    where
        Self: Sized;
    fn truncate_after_head(&self, remain_tokens: usize) -> Option<Self>
    where
        Self: Sized;
    fn truncate_before_tail(&self, remain_tokens: usize) -> Option<Self>
    where
        Self: Sized;
}

/// Windows `segments` under the token ceiling, drives `transform` over each
/// window, and stitches the kept body slices back into one flat sequence of
/// the same length and order as the input.
///
/// The body slice of each transform result is identified by position and
/// count, not by value: a transform that alters the tail context's item
/// count still maps correctly, but a result too short to cover the body is
/// a contract violation and aborts the run.
pub fn split<S, F>(
    segments: Vec<S>,
    mut transform: F,
    max_group_tokens: usize,
) -> anyhow::Result<Vec<S>>
where
    S: Segment + Clone,
    F: FnMut(Vec<S>) -> anyhow::Result<Vec<S>>,
{
    let mut out: Vec<S> = Vec::with_capacity(segments.len());
    for chunk in split_into_chunks(&segments, max_group_tokens) {
        let head_len = chunk.head.len();
        let body_len = chunk.body.len();

        let mut window = Vec::with_capacity(head_len + body_len + chunk.tail.len());
        window.extend(chunk.head);
        window.extend(chunk.body);
        window.extend(chunk.tail);

        let result = transform(window)?;
        if result.len() < head_len + body_len {
            return Err(anyhow!(
                "transform dropped body items: got {} for head={} body={}",
                result.len(),
                head_len,
                body_len
            ));
        }
        out.extend(result.into_iter().skip(head_len).take(body_len));
    }
    Ok(out)
}
