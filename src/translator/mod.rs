mod score;
mod submitter;

pub use score::{
    expand_to_score_segments, render_outbound, truncate_score_segment, ScoreExpansion,
    ScoreSegment,
};
pub use submitter::{submit, SegmentMapping, SubmitKind};

use anyhow::anyhow;
use serde::Serialize;

use crate::config::TranslatorConfig;
use crate::progress::ConsoleProgress;
use crate::segment::{search_inline_segments, search_text_segments};
use crate::serial::{self, Segment};
use crate::textutil::{cleanup_reply_text, has_letters};
use crate::tokenizer::Tokenizer;
use crate::trace::TraceWriter;
use crate::xml::{parse_fragment, render, Document, NodeId, DATA_ORIGIN_LEN_KEY};

/// Drives the whole pipeline over one tree: extract inline segments, score
/// them, window them under the token ceiling, hand each window's fragment
/// markup to the transform, validate what comes back, and submit the
/// survivors into the tree. A block whose reply fails to parse or validate
/// is simply omitted from submission, leaving its original text in place;
/// retry policy belongs to the caller.
pub struct XmlTranslator<T, F> {
    tokenizer: T,
    transform: F,
    config: TranslatorConfig,
    progress: ConsoleProgress,
    trace: TraceWriter,
}

#[derive(Serialize)]
struct RunSummary {
    fragments: usize,
    translated: usize,
    skipped_no_letters: usize,
    failed: usize,
}

impl<T, F> XmlTranslator<T, F>
where
    T: Tokenizer,
    F: FnMut(Vec<String>) -> anyhow::Result<Vec<String>>,
{
    pub fn new(tokenizer: T, transform: F, config: TranslatorConfig) -> anyhow::Result<Self> {
        let progress = ConsoleProgress::new(config.progress);
        let trace = TraceWriter::new(config.trace_dir.clone(), config.trace_fragments)?;
        Ok(Self {
            tokenizer,
            transform,
            config,
            progress,
            trace,
        })
    }

    /// Translates the subtree at `root` in place. Returns the root of the
    /// resulting tree, which differs from `root` only when the top-level
    /// block itself was replaced.
    pub fn translate(&mut self, doc: &mut Document, root: NodeId) -> anyhow::Result<NodeId> {
        let tokenizer = &self.tokenizer;
        let transform = &mut self.transform;
        let progress = &self.progress;
        let trace = &self.trace;

        let inline_segments = search_inline_segments(doc, root);
        progress.info(format!("Extracted {} inline segments", inline_segments.len()));

        let mut skipped_no_letters = 0usize;
        let mut items: Vec<FragmentSegment<'_, T>> = Vec::new();
        for (index, segment) in inline_segments.iter().enumerate() {
            let full_text = segment.full_text();
            if !has_letters(&full_text) {
                skipped_no_letters += 1;
                continue;
            }
            let score_segments: Vec<ScoreSegment<'_>> =
                expand_to_score_segments(tokenizer, segment).collect();
            let tokens = score_segments.iter().map(|s| s.score).sum();

            let mut fragment_doc = Document::new();
            let el = segment.create_element(&mut fragment_doc);
            fragment_doc.set_attr(
                el,
                DATA_ORIGIN_LEN_KEY,
                &full_text.chars().count().to_string(),
            );
            let payload = render(&fragment_doc, el);
            let _ = trace.write_fragment(index, "outbound", &payload);

            items.push(FragmentSegment {
                tokenizer,
                index,
                score_segments,
                payload,
                tokens,
            });
        }

        let sent = items.len();
        let outputs = serial::split(
            items,
            |window| {
                let texts: Vec<String> = window.iter().map(|s| s.payload.clone()).collect();
                let replies = transform(texts)?;
                if replies.len() != window.len() {
                    return Err(anyhow!(
                        "transform window length mismatch: sent {} got {}",
                        window.len(),
                        replies.len()
                    ));
                }
                Ok(window
                    .iter()
                    .zip(replies)
                    .map(|(seg, reply)| seg.from_text(reply))
                    .collect())
            },
            self.config.max_group_tokens,
        )?;

        let mut fragments = Document::new();
        let mut mappings: Vec<SegmentMapping> = Vec::new();
        let mut failed = 0usize;
        for (done, output) in outputs.iter().enumerate() {
            let segment = &inline_segments[output.index];
            let cleaned = cleanup_reply_text(&output.payload);
            let _ = trace.write_fragment(output.index, "reply", &cleaned);

            let mut reply_doc = Document::new();
            let template = match parse_fragment(&mut reply_doc, &cleaned) {
                Ok(t) => t,
                Err(err) => {
                    failed += 1;
                    let _ = trace.write_fragment(output.index, "parse-error", &err.to_string());
                    continue;
                }
            };
            let errors = segment.validate(&reply_doc, template);
            if !errors.is_empty() {
                failed += 1;
                let report: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                let _ = trace.write_fragment(output.index, "validate-error", &report.join("\n"));
                continue;
            }

            let translated = segment.assign_attributes(doc, &reply_doc, template, &mut fragments);
            let segments = search_text_segments(&fragments, translated);
            if segments.is_empty() {
                continue;
            }
            mappings.push(SegmentMapping {
                block: segment.parent,
                segments,
            });
            progress.stage("merge", done + 1, outputs.len());
        }

        let translated = mappings.len();
        let new_root = submit(doc, &fragments, root, self.config.submit_kind, mappings);

        progress.info(format!(
            "Translated {translated}/{sent} fragments ({failed} rejected, {skipped_no_letters} without letters)"
        ));
        let _ = trace.write_summary(&RunSummary {
            fragments: inline_segments.len(),
            translated,
            skipped_no_letters,
            failed,
        });
        Ok(new_root)
    }
}

/// One inline segment's rendered fragment flowing through the chunk engine.
/// Truncation for boundary context drops or shrinks whole score segments;
/// replies built with `from_text` carry only the returned markup.
struct FragmentSegment<'a, T> {
    tokenizer: &'a T,
    index: usize,
    score_segments: Vec<ScoreSegment<'a>>,
    payload: String,
    tokens: usize,
}

impl<T> Clone for FragmentSegment<'_, T> {
    fn clone(&self) -> Self {
        Self {
            tokenizer: self.tokenizer,
            index: self.index,
            score_segments: self.score_segments.clone(),
            payload: self.payload.clone(),
            tokens: self.tokens,
        }
    }
}

impl<'a, T: Tokenizer> FragmentSegment<'a, T> {
    fn truncate(&self, remain_tokens: usize, from_head: bool) -> Option<Self> {
        let mut kept: Vec<ScoreSegment<'a>> = Vec::new();
        let mut used = 0usize;
        let ordered: Vec<&ScoreSegment<'a>> = if from_head {
            self.score_segments.iter().collect()
        } else {
            self.score_segments.iter().rev().collect()
        };
        for segment in ordered {
            if used + segment.score <= remain_tokens {
                used += segment.score;
                kept.push(segment.clone());
            } else {
                if let Some(truncated) =
                    truncate_score_segment(self.tokenizer, segment, from_head, remain_tokens - used)
                {
                    used += truncated.score;
                    kept.push(truncated);
                }
                break;
            }
        }
        if kept.is_empty() {
            return None;
        }
        if !from_head {
            kept.reverse();
        }
        let payload: String = kept
            .iter()
            .map(|s| render_outbound(s, false, None))
            .collect();
        Some(Self {
            tokenizer: self.tokenizer,
            index: self.index,
            score_segments: kept,
            payload,
            tokens: used,
        })
    }
}

impl<'a, T: Tokenizer> Segment for FragmentSegment<'a, T> {
    type Payload = String;

    fn payload(&self) -> &String {
        &self.payload
    }

    fn tokens(&self) -> usize {
        self.tokens
    }

    fn from_text(&self, text: String) -> Self {
        let tokens = self.tokenizer.encode(&text).len();
        Self {
            tokenizer: self.tokenizer,
            index: self.index,
            score_segments: Vec::new(),
            payload: text,
            tokens,
        }
    }

    fn truncate_after_head(&self, remain_tokens: usize) -> Option<Self> {
        self.truncate(remain_tokens, true)
    }

    fn truncate_before_tail(&self, remain_tokens: usize) -> Option<Self> {
        self.truncate(remain_tokens, false)
    }
}
