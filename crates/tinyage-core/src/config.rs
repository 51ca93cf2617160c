use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AgeError, AgeResult};

/// Lowest accepted scrypt work factor (log2 of N)
pub const SCRYPT_MIN_LOG_COST: u8 = 0;

/// Highest accepted scrypt work factor (log2 of N)
pub const SCRYPT_MAX_LOG_COST: u8 = 22;

/// Top-level configuration (loaded from tinyage.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TinyageConfig {
    pub keys: KeysConfig,
    pub scrypt: ScryptConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Identity files tried when decrypting (default: ~/.config/age/keys.txt)
    pub identity_files: Vec<PathBuf>,
    /// Alias file mapping labels to recipient keys (default: ~/.config/age/aliases.txt)
    pub aliases_file: Option<PathBuf>,
    /// Directory scanned for `id_*` SSH private keys when decrypting (default: ~/.ssh)
    pub ssh_dir: Option<PathBuf>,
}

/// Passphrase recipient parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScryptConfig {
    /// Work factor as log2(N) (default: 18)
    pub log_cost: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level / EnvFilter directive (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            identity_files: vec![PathBuf::from("~/.config/age/keys.txt")],
            aliases_file: Some(PathBuf::from("~/.config/age/aliases.txt")),
            ssh_dir: Some(PathBuf::from("~/.ssh")),
        }
    }
}

impl Default for ScryptConfig {
    fn default() -> Self {
        Self { log_cost: 18 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl TinyageConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> AgeResult<Self> {
        if !path.exists() {
            tracing::debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: TinyageConfig = toml::from_str(&content)
            .map_err(|e| AgeError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgeResult<()> {
        validate_scrypt_log_cost(self.scrypt.log_cost)?;
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(AgeError::Config(format!(
                "unknown log format {other:?} (expected \"json\" or \"text\")"
            ))),
        }
    }
}

/// Check a scrypt work factor against the accepted range.
pub fn validate_scrypt_log_cost(log_cost: u8) -> AgeResult<()> {
    if !(SCRYPT_MIN_LOG_COST..=SCRYPT_MAX_LOG_COST).contains(&log_cost) {
        return Err(AgeError::Validation(format!(
            "scrypt work factor {log_cost} outside [{SCRYPT_MIN_LOG_COST}, {SCRYPT_MAX_LOG_COST}]"
        )));
    }
    Ok(())
}

/// Expand a leading `~/` against $HOME.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
