use super::Segment;

/// A bounded window over a scored segment sequence. `body` is authoritative:
/// its transformed output is kept. `head` and `tail` are read-only context
/// carried into the transform call; their transformed output is discarded.
#[derive(Clone, Debug)]
pub struct Chunk<S> {
    pub head: Vec<S>,
    pub body: Vec<S>,
    pub tail: Vec<S>,
    /// Context budget left unused on the head side.
    pub head_remain_tokens: usize,
    /// Context budget left unused on the tail side.
    pub tail_remain_tokens: usize,
}

/// Lazily windows `segments` so that every chunk's `head + body + tail`
/// token sum stays within `max_group_tokens`, except when a single segment
/// alone exceeds the ceiling; that segment becomes its own chunk, unsplit.
/// Bodies partition the input exactly once, in order. A quarter of the
/// budget is reserved on each side for context; the boundary context
/// segment is truncated to fit whatever is left.
pub fn split_into_chunks<S: Segment + Clone>(
    segments: &[S],
    max_group_tokens: usize,
) -> Chunks<'_, S> {
    Chunks {
        segments,
        max_group_tokens,
        next: 0,
    }
}

pub struct Chunks<'a, S> {
    segments: &'a [S],
    max_group_tokens: usize,
    next: usize,
}

impl<S: Segment + Clone> Iterator for Chunks<'_, S> {
    type Item = Chunk<S>;

    fn next(&mut self) -> Option<Chunk<S>> {
        if self.next >= self.segments.len() {
            return None;
        }
        let max = self.max_group_tokens;
        let context_budget = max / 4;
        let body_budget = max.saturating_sub(context_budget * 2).max(1);

        // The first segment is always taken, over budget or not: scoring
        // units are never split here.
        let start = self.next;
        let mut end = start + 1;
        let mut body_tokens = self.segments[start].tokens();
        while end < self.segments.len() {
            let tokens = self.segments[end].tokens();
            if body_tokens + tokens > body_budget {
                break;
            }
            body_tokens += tokens;
            end += 1;
        }
        self.next = end;

        let leftover = max.saturating_sub(body_tokens);
        let head_budget = leftover / 2;
        let tail_budget = leftover - head_budget;

        let (head, head_remain_tokens) = fill_head(self.segments, start, head_budget);
        let (tail, tail_remain_tokens) = fill_tail(self.segments, end, tail_budget);

        Some(Chunk {
            head,
            body: self.segments[start..end].to_vec(),
            tail,
            head_remain_tokens,
            tail_remain_tokens,
        })
    }
}

fn fill_head<S: Segment + Clone>(segments: &[S], start: usize, budget: usize) -> (Vec<S>, usize) {
    let mut head: Vec<S> = Vec::new();
    let mut remain = budget;
    let mut i = start;
    while i > 0 && remain > 0 {
        i -= 1;
        let seg = &segments[i];
        if seg.tokens() <= remain {
            remain -= seg.tokens();
            head.push(seg.clone());
        } else {
            // Keep the end of the preceding text so the window reads on
            // from something, then stop.
            if let Some(truncated) = seg.truncate_before_tail(remain) {
                remain = remain.saturating_sub(truncated.tokens());
                head.push(truncated);
            }
            break;
        }
    }
    head.reverse();
    (head, remain)
}

fn fill_tail<S: Segment + Clone>(segments: &[S], end: usize, budget: usize) -> (Vec<S>, usize) {
    let mut tail: Vec<S> = Vec::new();
    let mut remain = budget;
    let mut i = end;
    while i < segments.len() && remain > 0 {
        let seg = &segments[i];
        if seg.tokens() <= remain {
            remain -= seg.tokens();
            tail.push(seg.clone());
        } else {
            if let Some(truncated) = seg.truncate_after_head(remain) {
                remain = remain.saturating_sub(truncated.tokens());
                tail.push(truncated);
            }
            break;
        }
        i += 1;
    }
    (tail, remain)
}
