//! SSH public-key wire encoding (RFC 4253 §6.6) and fingerprints
//!
//! ```text
//! ssh-rsa:     string "ssh-rsa"     || mpint e || mpint n
//! ssh-ed25519: string "ssh-ed25519" || string pk[32]
//! string = u32 BE length || bytes
//! ```
//!
//! The 4-byte stanza fingerprint is the SHA-256 of this encoding, truncated.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use ed25519_dalek::VerifyingKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use tinyage_core::{AgeError, AgeResult};

use crate::primitives;

pub const SSH_RSA: &str = "ssh-rsa";
pub const SSH_ED25519: &str = "ssh-ed25519";

/// Length of the stanza fingerprint tag
pub const FINGERPRINT_SIZE: usize = 4;

/// A decoded SSH public key
#[derive(Debug, Clone, PartialEq)]
pub enum SshPublicKey {
    Rsa(RsaPublicKey),
    Ed25519(VerifyingKey),
}

impl SshPublicKey {
    pub fn key_type(&self) -> &'static str {
        match self {
            SshPublicKey::Rsa(_) => SSH_RSA,
            SshPublicKey::Ed25519(_) => SSH_ED25519,
        }
    }

    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            SshPublicKey::Rsa(key) => rsa_wire(key),
            SshPublicKey::Ed25519(key) => ed25519_wire(key),
        }
    }

    /// `SHA256:<base64>` as printed by `ssh-keygen -l`.
    pub fn fingerprint_display(&self) -> String {
        format!(
            "SHA256:{}",
            STANDARD_NO_PAD.encode(primitives::sha256(&self.to_wire()))
        )
    }

    /// Decode a wire blob, rejecting unknown key types and trailing bytes.
    pub fn from_wire(blob: &[u8]) -> AgeResult<Self> {
        let mut reader = WireReader::new(blob);
        let key_type = reader.string()?;
        let key = match key_type {
            t if t == SSH_RSA.as_bytes() => {
                let e = BigUint::from_bytes_be(reader.mpint()?);
                let n = BigUint::from_bytes_be(reader.mpint()?);
                let key = RsaPublicKey::new(n, e)
                    .map_err(|e| AgeError::Parse(format!("invalid ssh-rsa key: {e}")))?;
                SshPublicKey::Rsa(key)
            }
            t if t == SSH_ED25519.as_bytes() => {
                let pk: [u8; 32] = reader
                    .string()?
                    .try_into()
                    .map_err(|_| AgeError::Parse("ssh-ed25519 key must be 32 bytes".into()))?;
                let key = VerifyingKey::from_bytes(&pk)
                    .map_err(|e| AgeError::Parse(format!("invalid ssh-ed25519 key: {e}")))?;
                SshPublicKey::Ed25519(key)
            }
            other => {
                return Err(AgeError::UnknownRecipient(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };
        if !reader.is_empty() {
            return Err(AgeError::Parse("trailing bytes after SSH public key".into()));
        }
        Ok(key)
    }
}

pub fn rsa_wire(key: &RsaPublicKey) -> Vec<u8> {
    let mut out = Vec::new();
    put_string(&mut out, SSH_RSA.as_bytes());
    put_mpint(&mut out, &key.e().to_bytes_be());
    put_mpint(&mut out, &key.n().to_bytes_be());
    out
}

pub fn ed25519_wire(key: &VerifyingKey) -> Vec<u8> {
    let mut out = Vec::new();
    put_string(&mut out, SSH_ED25519.as_bytes());
    put_string(&mut out, key.as_bytes());
    out
}

/// First four bytes of SHA-256 over the wire encoding.
pub fn fingerprint(wire: &[u8]) -> [u8; FINGERPRINT_SIZE] {
    let digest = primitives::sha256(wire);
    let mut tag = [0u8; FINGERPRINT_SIZE];
    tag.copy_from_slice(&digest[..FINGERPRINT_SIZE]);
    tag
}

fn put_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Positive mpint: minimal big-endian magnitude, with a 0x00 pad when the top bit is set.
fn put_mpint(out: &mut Vec<u8>, magnitude: &[u8]) {
    let start = magnitude
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(magnitude.len());
    let trimmed = &magnitude[start..];
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        out.extend_from_slice(&((trimmed.len() + 1) as u32).to_be_bytes());
        out.push(0);
        out.extend_from_slice(trimmed);
    } else {
        put_string(out, trimmed);
    }
}

struct WireReader<'a> {
    rest: &'a [u8],
}

impl<'a> WireReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn string(&mut self) -> AgeResult<&'a [u8]> {
        if self.rest.len() < 4 {
            return Err(AgeError::Parse("truncated SSH wire string".into()));
        }
        let (len, rest) = self.rest.split_at(4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if rest.len() < len {
            return Err(AgeError::Parse("truncated SSH wire string".into()));
        }
        let (value, rest) = rest.split_at(len);
        self.rest = rest;
        Ok(value)
    }

    fn mpint(&mut self) -> AgeResult<&'a [u8]> {
        let value = self.string()?;
        if value.first().is_some_and(|b| b & 0x80 != 0) {
            return Err(AgeError::Parse("negative mpint in SSH key".into()));
        }
        Ok(value)
    }
}
