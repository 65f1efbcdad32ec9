use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

/// Opt-in directory of per-fragment dumps: outbound markup, transform
/// replies, and validation failures, plus a JSON run summary. Disabled
/// instances write nothing.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: Option<PathBuf>, enabled: bool) -> anyhow::Result<Self> {
        let dir = dir.unwrap_or_else(|| PathBuf::from("trace"));
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    pub fn write_fragment(&self, index: usize, kind: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("fragment_{index:06}.{kind}.txt");
        self.write_named_text(&name, text)
    }

    pub fn write_summary<S: Serialize>(&self, summary: &S) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(summary).context("serialize trace summary")?;
        self.write_named_text("summary.json", &text)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
