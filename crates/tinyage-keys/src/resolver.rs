//! Recipient resolution
//!
//! A recipient argument is tried, in order, as:
//!   1. an alias label (values resolved recursively)
//!   2. a file holding one key per line (no aliases inside)
//!   3. an inline key string: `age1…`, `ssh-rsa …` or `ssh-ed25519 …`
//!
//! Remote key sources (`https://…`, `github:user`) are refused.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tinyage_crypto::Recipient;

use crate::age;
use crate::aliases::Aliases;
use crate::ssh;

/// Turns a user-supplied recipient argument into recipients.
pub trait RecipientResolver {
    fn resolve(&self, key: &str) -> Result<Vec<Recipient>>;
}

/// Resolves aliases, key files and inline key strings.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    aliases: Aliases,
}

impl KeyResolver {
    pub fn new(aliases: Aliases) -> Self {
        Self { aliases }
    }

    fn resolve_with(&self, key: &str, chain: &mut Vec<String>) -> Result<Vec<Recipient>> {
        let key = key.trim();

        if let Some(values) = self.aliases.get(key) {
            if chain.iter().any(|seen| seen == key) {
                bail!("alias cycle: {} -> {key}", chain.join(" -> "));
            }
            chain.push(key.to_owned());
            let mut resolved = Vec::new();
            for value in values {
                let found = self
                    .resolve_with(value, chain)
                    .with_context(|| format!("resolving alias {key:?}"))?;
                if found.is_empty() {
                    bail!("alias {key:?} entry {value:?} does not name a key");
                }
                resolved.extend(found);
            }
            chain.pop();
            return Ok(resolved);
        }

        if key.starts_with("github:") || key.starts_with("http://") || key.starts_with("https://")
        {
            bail!("fetching recipients from {key:?} is not supported; download the keys to a file");
        }

        let path = Path::new(key);
        if path.is_file() {
            return resolve_key_file(path);
        }

        parse_key_string(key)
    }
}

impl RecipientResolver for KeyResolver {
    fn resolve(&self, key: &str) -> Result<Vec<Recipient>> {
        let recipients = self.resolve_with(key, &mut Vec::new())?;
        tracing::debug!(key, count = recipients.len(), "resolved recipient argument");
        Ok(recipients)
    }
}

/// Parse a single inline key. Unrecognized strings yield no recipients.
pub fn parse_key_string(key: &str) -> Result<Vec<Recipient>> {
    let key = key.trim();
    if key.starts_with(age::PUBLIC_KEY_PREFIX) {
        return Ok(vec![Recipient::from(age::parse_recipient(key)?)]);
    }
    if ssh::is_ssh_key_line(key) {
        return Ok(vec![ssh::parse_recipient(key)?]);
    }
    tracing::debug!(key, "not a recognized key string");
    Ok(Vec::new())
}

fn resolve_key_file(path: &Path) -> Result<Vec<Recipient>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading recipients file: {}", path.display()))?;
    let mut recipients = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let found = parse_key_string(line)
            .with_context(|| format!("{}:{}", path.display(), number + 1))?;
        recipients.extend(found);
    }
    Ok(recipients)
}
