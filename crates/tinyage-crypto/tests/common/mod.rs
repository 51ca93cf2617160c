//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::OnceLock;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::RsaPrivateKey;
use tinyage_core::{AgeError, AgeResult};
use tinyage_crypto::format::{self, Stanza};
use tinyage_crypto::{Decryptor, Identity, StreamWriter};

/// Deterministic generator that yields a single repeated byte.
pub struct FixedRng(pub u8);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        u32::from_ne_bytes([self.0; 4])
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_ne_bytes([self.0; 8])
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(self.0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for FixedRng {}

/// 1024-bit keys keep the suite fast; generated once per test binary.
pub fn rsa_key(slot: usize) -> RsaPrivateKey {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    KEYS.get_or_init(|| {
        (0..2)
            .map(|_| RsaPrivateKey::new(&mut OsRng, 1024).expect("rsa keygen"))
            .collect()
    })[slot]
        .clone()
}

pub fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("hex digit"))
        .collect()
}

pub fn decrypt_all(identities: &[Identity], ciphertext: &[u8]) -> AgeResult<Vec<u8>> {
    let mut reader = Decryptor::new(ciphertext)?.decrypt(identities)?;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).map_err(AgeError::from_io)?;
    Ok(out)
}

/// Rewrite the stanza list of an encrypted file, keeping the original MAC
/// and payload bytes.
pub fn rewrite_stanzas(ciphertext: &[u8], edit: impl FnOnce(&mut Vec<Stanza>)) -> Vec<u8> {
    let decryptor = Decryptor::new(ciphertext).expect("parse header");
    let header = decryptor.header();
    let payload = &ciphertext[header.encoded_len()..];

    let mut stanzas = header.stanzas.clone();
    edit(&mut stanzas);

    let mut out = format::encode_preamble(&stanzas);
    format::encode_footer(&mut out, header.mac());
    out.extend_from_slice(payload);
    out
}

/// Build a file from raw stanzas, authenticating the header with `file_key`.
pub fn assemble(
    stanzas: &[Stanza],
    file_key: &tinyage_crypto::FileKey,
    plaintext: &[u8],
) -> Vec<u8> {
    let mut out = tinyage_crypto::header::encode_header(stanzas, file_key).expect("header");
    let nonce = [0x11u8; tinyage_crypto::PAYLOAD_NONCE_SIZE];
    out.extend_from_slice(&nonce);
    let key = file_key.payload_key(&nonce).expect("payload key");
    let mut writer = StreamWriter::new(out, &key);
    writer.write_all(plaintext).expect("write");
    writer.finish().expect("finish")
}
