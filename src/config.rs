use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::translator::SubmitKind;

/// Knobs for one translation run. Everything defaults so a TOML file only
/// names what it changes.
#[derive(Clone, Debug, Deserialize)]
pub struct TranslatorConfig {
    /// Token ceiling for one transform window (head + body + tail).
    #[serde(default = "default_max_group_tokens")]
    pub max_group_tokens: usize,

    /// How translated content augments the original blocks.
    #[serde(default)]
    pub submit_kind: SubmitKind,

    /// Elapsed-stamped progress lines on stderr.
    #[serde(default = "default_true")]
    pub progress: bool,

    /// Directory for per-fragment dumps; only used when `trace_fragments`
    /// is set.
    #[serde(default)]
    pub trace_dir: Option<PathBuf>,

    #[serde(default)]
    pub trace_fragments: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            max_group_tokens: default_max_group_tokens(),
            submit_kind: SubmitKind::default(),
            progress: true,
            trace_dir: None,
            trace_fragments: false,
        }
    }
}

fn default_max_group_tokens() -> usize {
    1200
}

fn default_true() -> bool {
    true
}

pub fn load_config(path: &Path) -> anyhow::Result<TranslatorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: TranslatorConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::TranslatorConfig;
    use crate::translator::SubmitKind;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: TranslatorConfig = toml::from_str("").expect("parse");
        assert_eq!(cfg.max_group_tokens, 1200);
        assert_eq!(cfg.submit_kind, SubmitKind::Replace);
        assert!(cfg.progress);
        assert!(!cfg.trace_fragments);
    }

    #[test]
    fn fields_override_defaults() {
        let cfg: TranslatorConfig = toml::from_str(
            "max_group_tokens = 800\nsubmit_kind = \"append-block\"\nprogress = false\n",
        )
        .expect("parse");
        assert_eq!(cfg.max_group_tokens, 800);
        assert_eq!(cfg.submit_kind, SubmitKind::AppendBlock);
        assert!(!cfg.progress);
    }
}
