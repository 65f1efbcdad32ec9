mod inline_segment;
mod text_segment;

pub use inline_segment::{search_inline_segments, InlineError, InlineNode, InlineSegment};
pub use text_segment::{combine_text_segments, search_text_segments, TextSegment};
