//! Extracts translatable text from XHTML-like element trees, windows it
//! under a token ceiling for a size-limited external transform, and merges
//! the transformed text back without disturbing structure, attributes, or
//! untranslated siblings.

pub mod config;
pub mod epub;
pub mod math;
pub mod progress;
pub mod segment;
pub mod serial;
pub mod textutil;
pub mod tokenizer;
pub mod trace;
pub mod translator;
pub mod xml;

pub use config::{load_config, TranslatorConfig};
pub use segment::{InlineError, InlineSegment, TextSegment};
pub use tokenizer::{CharTokenizer, Tokenizer};
pub use translator::{submit, SegmentMapping, SubmitKind, XmlTranslator};
pub use xml::{Document, NodeId};
