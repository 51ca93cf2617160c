//! tinyage-keys: key strings, key files and recipient/identity lookup
//!
//! Identity discovery chain (in order of precedence):
//!   1. $TINYAGE_KEY_FILE env var (path to key file)
//!   2. `[keys] identity_files` in tinyage.toml
//!   3. ~/.config/age/keys.txt (default fallback)
//!
//! plus any unencrypted `~/.ssh/id_*` private keys.
//!
//! Recipient arguments resolve through the alias file, then key files, then
//! inline `age1…` / `ssh-…` strings.

pub mod age;
pub mod aliases;
pub mod identity;
pub mod keyfile;
pub mod resolver;
pub mod ssh;

pub use aliases::Aliases;
pub use identity::{DiscoveryChain, IdentitySource, KeyFile};
pub use resolver::{KeyResolver, RecipientResolver};
