//! tinyage-crypto: the age v1 file format
//!
//! Architecture: one random file key per file, wrapped once per recipient,
//! authenticating the header and keying a chunked STREAM payload.
//!
//! Layout:
//! ```text
//! File Key (128-bit, random per file)
//!   ├── Stanzas: one per recipient (X25519 | scrypt | ssh-rsa | ssh-ed25519)
//!   │   └── each wraps the file key with ChaCha20-Poly1305 or RSA-OAEP
//!   ├── Header MAC key: HKDF(file key, salt="", info="header") → HMAC-SHA256 over the header
//!   └── Payload key: HKDF(file key, salt=nonce[16], info="payload")
//!       └── Chunks: ChaCha20-Poly1305, 64 KiB, nonce = counter[11] || last-flag
//! ```
//!
//! Encryption: [`Encryptor`] → [`StreamWriter`] → `finish()`.
//! Decryption: [`Decryptor::new`] parses, [`Decryptor::decrypt`] unlocks and
//! authenticates, [`StreamReader`] yields plaintext.

pub mod armor;
pub mod format;
pub mod header;
pub mod keys;
pub mod primitives;
pub mod protocol;
pub mod recipients;
pub mod ssh;
pub mod stream;

pub use format::{Header, Stanza};
pub use keys::FileKey;
pub use protocol::{decrypt, encrypt, Decryptor, Encryptor};
pub use recipients::{
    Identity, Recipient, RecipientStanza, ScryptIdentity, ScryptRecipient, SshEd25519Identity,
    SshEd25519Recipient, SshRsaIdentity, SshRsaRecipient, UnwrapError, X25519Identity,
    X25519Recipient,
};
pub use ssh::SshPublicKey;
pub use stream::{StreamReader, StreamWriter};

/// Size of a derived symmetric key (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-file key (128-bit)
pub const FILE_KEY_SIZE: usize = 16;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// A file key sealed with ChaCha20-Poly1305
pub const WRAPPED_KEY_SIZE: usize = FILE_KEY_SIZE + TAG_SIZE;

/// Size of the header HMAC-SHA256 tag
pub const MAC_SIZE: usize = 32;

/// Size of the payload nonce written after the header
pub const PAYLOAD_NONCE_SIZE: usize = 16;

/// Plaintext bytes per payload chunk
pub const CHUNK_SIZE: usize = 64 * 1024;
