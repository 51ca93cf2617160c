//! Identity discovery chain

use std::path::PathBuf;

use anyhow::{Context, Result};
use tinyage_core::config::{expand_tilde, KeysConfig};
use tinyage_crypto::Identity;

use crate::keyfile;
use crate::ssh;

/// Environment variable naming an identity file that overrides the config.
pub const KEY_FILE_ENV: &str = "TINYAGE_KEY_FILE";

/// Fallback identity file location.
pub const DEFAULT_KEY_FILE: &str = "~/.config/age/keys.txt";

/// Something that can produce decryption identities.
pub trait IdentitySource {
    fn load(&self) -> Result<Vec<Identity>>;
}

/// A single identity file. Missing files are an error.
#[derive(Debug, Clone)]
pub struct KeyFile(pub PathBuf);

impl IdentitySource for KeyFile {
    fn load(&self) -> Result<Vec<Identity>> {
        keyfile::load_identity_file(&expand_tilde(&self.0))
    }
}

/// Discover identity files using the priority chain:
///   1. $TINYAGE_KEY_FILE (explicit path env var)
///   2. `[keys] identity_files` from tinyage.toml (every existing file)
///   3. ~/.config/age/keys.txt (default location)
///
/// The first level that yields an existing file wins. SSH private keys from
/// `[keys] ssh_dir` are added on top of whichever level won.
#[derive(Debug, Clone)]
pub struct DiscoveryChain {
    env_key_file: Option<PathBuf>,
    configured: Vec<PathBuf>,
    ssh_dir: Option<PathBuf>,
}

/// Identities found by the chain and the files they came from.
pub struct Discovered {
    pub identities: Vec<Identity>,
    pub sources: Vec<PathBuf>,
}

impl DiscoveryChain {
    pub fn new(env_key_file: Option<PathBuf>, configured: Vec<PathBuf>) -> Self {
        Self {
            env_key_file,
            configured,
            ssh_dir: None,
        }
    }

    /// Also load `id_*` SSH private keys from `dir`.
    pub fn with_ssh_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.ssh_dir = dir;
        self
    }

    /// Build the chain from the process environment and config.
    pub fn from_env(config: &KeysConfig) -> Self {
        let env_key_file = std::env::var_os(KEY_FILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(env_key_file, config.identity_files.clone())
            .with_ssh_dir(config.ssh_dir.clone())
    }

    /// Candidate files grouped by precedence level.
    fn levels(&self) -> Vec<(&'static str, Vec<PathBuf>)> {
        let mut levels = Vec::with_capacity(3);
        if let Some(path) = &self.env_key_file {
            levels.push((KEY_FILE_ENV, vec![expand_tilde(path)]));
        }
        levels.push((
            "config",
            self.configured.iter().map(|p| expand_tilde(p)).collect(),
        ));
        levels.push((
            "default",
            vec![expand_tilde(&PathBuf::from(DEFAULT_KEY_FILE))],
        ));
        levels
    }

    pub fn discover(&self) -> Result<Discovered> {
        let mut tried = Vec::new();
        let mut found = Discovered {
            identities: Vec::new(),
            sources: Vec::new(),
        };

        for (level, paths) in self.levels() {
            let existing: Vec<PathBuf> = paths.into_iter().filter(|p| p.is_file()).collect();
            if existing.is_empty() {
                tried.push(level);
                continue;
            }

            for path in &existing {
                found.identities.extend(
                    keyfile::load_identity_file(path)
                        .with_context(|| format!("loading {level} identity file"))?,
                );
            }
            tracing::debug!(
                level,
                files = existing.len(),
                identities = found.identities.len(),
                "identities discovered"
            );
            found.sources = existing;
            break;
        }

        if let Some(dir) = &self.ssh_dir {
            let keys = ssh::load_key_dir(&expand_tilde(dir));
            if keys.is_empty() {
                tried.push("ssh");
            }
            for (path, identity) in keys {
                tracing::debug!(path = %path.display(), "SSH identity discovered");
                found.identities.push(identity);
                found.sources.push(path);
            }
        }

        if found.sources.is_empty() {
            anyhow::bail!(
                "no identity file found. Tried: {}. Run: tinyage keygen -o {DEFAULT_KEY_FILE}",
                tried.join(", ")
            );
        }
        Ok(found)
    }
}

impl IdentitySource for DiscoveryChain {
    fn load(&self) -> Result<Vec<Identity>> {
        Ok(self.discover()?.identities)
    }
}
