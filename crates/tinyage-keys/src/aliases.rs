//! Alias file: `label: key1 key2 …`
//!
//! Values may be key strings, key files or other labels. Repeated labels
//! accumulate.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aliases {
    entries: HashMap<String, Vec<String>>,
}

impl Aliases {
    pub fn parse(content: &str) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (label, values) = line.split_once(':').unwrap_or((line, ""));
            entries
                .entry(label.trim().to_owned())
                .or_default()
                .extend(values.split_whitespace().map(str::to_owned));
        }
        Self { entries }
    }

    /// Load an alias file. A missing file yields no aliases.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("alias file {} not found", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading alias file: {}", path.display()))?;
        Ok(Self::parse(&content))
    }

    pub fn get(&self, label: &str) -> Option<&[String]> {
        self.entries.get(label).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
