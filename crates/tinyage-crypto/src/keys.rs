//! File key: the per-encryption symmetric secret every stanza wraps

use rand::{CryptoRng, RngCore};
use tinyage_core::AgeResult;
use zeroize::Zeroize;

use crate::primitives::{self, SymmetricKey};
use crate::FILE_KEY_SIZE;

const HEADER_INFO: &[u8] = b"header";
const PAYLOAD_INFO: &[u8] = b"payload";

/// A per-file 128-bit key. Zeroized on drop, never serialized in the clear.
#[derive(Clone, PartialEq, Eq)]
pub struct FileKey {
    bytes: [u8; FILE_KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; FILE_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Accept an unwrapped stanza body, which must be exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; FILE_KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self { bytes })
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_bytes(primitives::random_array(rng))
    }

    pub fn as_bytes(&self) -> &[u8; FILE_KEY_SIZE] {
        &self.bytes
    }

    /// HMAC key authenticating the header.
    pub fn mac_key(&self) -> AgeResult<SymmetricKey> {
        primitives::hkdf_derive(b"", &self.bytes, HEADER_INFO)
    }

    /// Key for the payload stream, salted with the per-file payload nonce.
    pub fn payload_key(&self, nonce: &[u8]) -> AgeResult<SymmetricKey> {
        primitives::hkdf_derive(nonce, &self.bytes, PAYLOAD_INFO)
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_file_key_generation() {
        let k1 = FileKey::generate(&mut OsRng);
        let k2 = FileKey::generate(&mut OsRng);
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_from_slice_requires_exact_length() {
        assert!(FileKey::from_slice(&[0u8; 16]).is_some());
        assert!(FileKey::from_slice(&[0u8; 15]).is_none());
        assert!(FileKey::from_slice(&[0u8; 32]).is_none());
    }

    #[test]
    fn test_derived_keys_are_separated() {
        let key = FileKey::from_bytes([3u8; FILE_KEY_SIZE]);
        let mac = key.mac_key().unwrap();
        let payload = key.payload_key(&[0u8; 16]).unwrap();
        assert_ne!(*mac, *payload);

        let other_nonce = key.payload_key(&[1u8; 16]).unwrap();
        assert_ne!(*payload, *other_nonce, "payload key must depend on the nonce");
    }

    #[test]
    fn test_debug_redacts() {
        let key = FileKey::from_bytes([0x41u8; FILE_KEY_SIZE]);
        let shown = format!("{key:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("65"));
    }
}
