//! Typed wrappers around the black-box primitives
//!
//! Every recipient algorithm, the header MAC and the payload stream go through
//! these helpers so error mapping into [`AgeError`] happens in one place.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tinyage_core::{AgeError, AgeResult};
use zeroize::Zeroizing;

use crate::KEY_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// A 32-byte symmetric key that is wiped when dropped.
pub type SymmetricKey = Zeroizing<[u8; KEY_SIZE]>;

/// Seal `plaintext` under `key` with an all-zero nonce.
///
/// Only valid for keys used exactly once (stanza wrapping keys).
pub fn seal_zero_nonce(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> AgeResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(&Nonce::default(), plaintext)
        .map_err(|e| AgeError::Crypto(format!("AEAD seal failed: {e}")))
}

/// Open a zero-nonce ciphertext. `None` means the tag did not verify.
pub fn open_zero_nonce(key: &[u8; KEY_SIZE], ciphertext: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(&Nonce::default(), ciphertext)
        .ok()
        .map(Zeroizing::new)
}

/// HKDF-SHA256 filling `out`. An empty salt is equivalent to no salt.
pub fn hkdf_expand_into(salt: &[u8], ikm: &[u8], info: &[u8], out: &mut [u8]) -> AgeResult<()> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    hkdf.expand(info, out)
        .map_err(|e| AgeError::Crypto(format!("HKDF expand failed: {e}")))
}

/// HKDF-SHA256 with a 32-byte output.
pub fn hkdf_derive(salt: &[u8], ikm: &[u8], info: &[u8]) -> AgeResult<SymmetricKey> {
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf_expand_into(salt, ikm, info, &mut okm[..])?;
    Ok(okm)
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> AgeResult<[u8; 32]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AgeError::Crypto(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time check of an HMAC-SHA256 tag.
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], tag: &[u8]) -> AgeResult<bool> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| AgeError::Crypto(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.verify_slice(tag).is_ok())
}

/// scrypt with r=8, p=1 and a 32-byte output. `log_cost` must already be validated.
pub fn scrypt_derive(password: &[u8], salt: &[u8], log_cost: u8) -> AgeResult<SymmetricKey> {
    let params = scrypt::Params::new(log_cost, 8, 1, KEY_SIZE)
        .map_err(|e| AgeError::Validation(format!("scrypt parameters rejected: {e}")))?;
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(password, salt, &params, &mut okm[..])
        .map_err(|e| AgeError::Crypto(format!("scrypt failed: {e}")))?;
    Ok(okm)
}

/// X25519 scalar multiplication, rejecting the all-zero (low order) result.
pub fn x25519(scalar: &[u8; 32], point: &[u8; 32]) -> AgeResult<Zeroizing<[u8; 32]>> {
    let shared = Zeroizing::new(x25519_dalek::x25519(*scalar, *point));
    if shared.iter().all(|b| *b == 0) {
        return Err(AgeError::Crypto(
            "X25519 produced an all-zero shared secret".into(),
        ));
    }
    Ok(shared)
}

/// X25519 multiplication by the base point.
pub fn x25519_base(scalar: &[u8; 32]) -> [u8; 32] {
    x25519_dalek::x25519(*scalar, x25519_dalek::X25519_BASEPOINT_BYTES)
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Draw `N` bytes from the injected generator.
pub fn random_array<const N: usize, R: RngCore + CryptoRng>(rng: &mut R) -> [u8; N] {
    let mut bytes = [0u8; N];
    rng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let sealed = seal_zero_nonce(&key, b"file key bytes!!").unwrap();
        assert_eq!(sealed.len(), 16 + 16, "ciphertext carries a 16-byte tag");

        let opened = open_zero_nonce(&key, &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"file key bytes!!");
    }

    #[test]
    fn test_open_wrong_key_is_none() {
        let sealed = seal_zero_nonce(&[1u8; KEY_SIZE], b"secret").unwrap();
        assert!(open_zero_nonce(&[2u8; KEY_SIZE], &sealed).is_none());
    }

    #[test]
    fn test_hkdf_info_separates_keys() {
        let a = hkdf_derive(b"", b"ikm", b"header").unwrap();
        let b = hkdf_derive(b"", b"ikm", b"payload").unwrap();
        assert_ne!(*a, *b, "different info strings must produce different keys");
    }

    #[test]
    fn test_hkdf_rfc5869_case_1() {
        let ikm = [0x0bu8; 22];
        let salt: Vec<u8> = (0x00u8..=0x0c).collect();
        let info: Vec<u8> = (0xf0u8..=0xf9).collect();
        let mut okm = [0u8; 42];
        hkdf_expand_into(&salt, &ikm, &info, &mut okm).unwrap();
        assert_eq!(
            okm[..8],
            [0x3c, 0xb2, 0x5f, 0x25, 0xfa, 0xac, 0xd5, 0x7a],
            "RFC 5869 test case 1 prefix"
        );
    }

    #[test]
    fn test_hmac_verify() {
        let tag = hmac_sha256(b"key", b"data").unwrap();
        assert!(hmac_sha256_verify(b"key", b"data", &tag).unwrap());
        assert!(!hmac_sha256_verify(b"key", b"datA", &tag).unwrap());
        assert!(!hmac_sha256_verify(b"key", b"data", &tag[..31]).unwrap());
    }

    #[test]
    fn test_x25519_rejects_zero_point() {
        let result = x25519(&[9u8; 32], &[0u8; 32]);
        assert!(matches!(result, Err(AgeError::Crypto(_))));
    }

    #[test]
    fn test_x25519_agreement() {
        let a = [0x11u8; 32];
        let b = [0x22u8; 32];
        let ab = x25519(&a, &x25519_base(&b)).unwrap();
        let ba = x25519(&b, &x25519_base(&a)).unwrap();
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_scrypt_depends_on_salt() {
        let a = scrypt_derive(b"password", b"salt-a", 2).unwrap();
        let b = scrypt_derive(b"password", b"salt-b", 2).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            sha256(b"")[..4],
            [0xe3, 0xb0, 0xc4, 0x42],
            "SHA-256 of the empty string"
        );
    }
}
