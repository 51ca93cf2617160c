//! Header authentication and the unlock loop
//!
//! ```text
//! mac_key = HKDF-SHA256(salt = "", ikm = file key, info = "header")
//! mac     = HMAC-SHA256(mac_key, version line .. "---")
//! ```
//!
//! The file key is recovered first, then the MAC is checked in constant time.
//! Nothing is decrypted from the payload until the MAC verifies.

use tinyage_core::{AgeError, AgeResult};

use crate::format::{self, Header, Stanza};
use crate::keys::FileKey;
use crate::recipients::{Identity, RecipientStanza, UnwrapError};
use crate::MAC_SIZE;

/// Serialize and authenticate a header for `stanzas`.
pub fn encode_header(stanzas: &[Stanza], file_key: &FileKey) -> AgeResult<Vec<u8>> {
    let mut out = format::encode_preamble(stanzas);
    let mac = compute_mac(file_key, &out)?;
    format::encode_footer(&mut out, &mac);
    Ok(out)
}

pub fn compute_mac(file_key: &FileKey, preamble: &[u8]) -> AgeResult<[u8; MAC_SIZE]> {
    let key = file_key.mac_key()?;
    crate::primitives::hmac_sha256(key.as_slice(), preamble)
}

/// Check the received tag against the recovered file key.
pub fn verify_mac(file_key: &FileKey, header: &Header) -> AgeResult<()> {
    let key = file_key.mac_key()?;
    if crate::primitives::hmac_sha256_verify(key.as_slice(), header.mac_input(), header.mac())? {
        Ok(())
    } else {
        Err(AgeError::AuthenticationFailed)
    }
}

/// Try every identity against every stanza, in header order. First success wins.
pub fn unwrap_file_key(stanzas: &[RecipientStanza], identities: &[Identity]) -> AgeResult<FileKey> {
    for (index, stanza) in stanzas.iter().enumerate() {
        if let RecipientStanza::Unknown(raw) = stanza {
            tracing::debug!(index, tag = %raw.tag, "skipping stanza of unknown type");
            continue;
        }

        for identity in identities
            .iter()
            .filter(|identity| identity.stanza_tag() == stanza.tag())
        {
            match identity.unwrap_stanza(stanza) {
                Ok(file_key) => {
                    tracing::debug!(index, tag = stanza.tag(), "stanza unwrapped");
                    return Ok(file_key);
                }
                Err(UnwrapError::NoMatch) => {
                    tracing::debug!(index, tag = stanza.tag(), "identity did not match");
                }
                Err(UnwrapError::WrongKey) => {
                    tracing::debug!(index, tag = stanza.tag(), "stanza addressed to another key");
                }
                Err(UnwrapError::Invalid(e)) => return Err(e),
            }
        }
    }
    Err(AgeError::NoIdentity)
}

/// Recover the file key and authenticate the header with it.
pub fn unlock(
    header: &Header,
    stanzas: &[RecipientStanza],
    identities: &[Identity],
) -> AgeResult<FileKey> {
    let file_key = unwrap_file_key(stanzas, identities)?;
    verify_mac(&file_key, header)?;
    Ok(file_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipients::{Recipient, ScryptIdentity, X25519Identity};
    use rand::rngs::OsRng;
    use std::io::Cursor;

    fn build(identity: &X25519Identity, file_key: &FileKey) -> (Header, Vec<RecipientStanza>) {
        let stanza = Recipient::from(identity.to_public())
            .wrap(file_key, &mut OsRng)
            .unwrap();
        let bytes = encode_header(&[stanza.to_stanza()], file_key).unwrap();
        let header = format::read_header(&mut Cursor::new(bytes)).unwrap();
        let typed = header
            .stanzas
            .iter()
            .cloned()
            .map(RecipientStanza::from_stanza)
            .collect::<AgeResult<Vec<_>>>()
            .unwrap();
        (header, typed)
    }

    #[test]
    fn test_unlock_roundtrip() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);
        let (header, stanzas) = build(&identity, &file_key);

        let recovered = unlock(&header, &stanzas, &[Identity::from(identity)]).unwrap();
        assert_eq!(recovered.as_bytes(), file_key.as_bytes());
    }

    #[test]
    fn test_no_identity() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);
        let (header, stanzas) = build(&identity, &file_key);

        let stranger = X25519Identity::generate(&mut OsRng);
        let err = unlock(&header, &stanzas, &[Identity::from(stranger)]).unwrap_err();
        assert!(matches!(err, AgeError::NoIdentity));
    }

    #[test]
    fn test_mac_mismatch_is_authentication_failure() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);
        let (header, stanzas) = build(&identity, &file_key);

        let other_key = FileKey::generate(&mut OsRng);
        assert!(matches!(
            verify_mac(&other_key, &header),
            Err(AgeError::AuthenticationFailed)
        ));
        // The right key still verifies the untouched header.
        let recovered = unwrap_file_key(&stanzas, &[Identity::from(identity)]).unwrap();
        verify_mac(&recovered, &header).unwrap();
    }

    #[test]
    fn test_invalid_stanza_aborts_loop() {
        let stanzas = vec![RecipientStanza::Scrypt(crate::recipients::ScryptStanza {
            salt: [0u8; 16],
            log_cost: 30,
            body: [0u8; crate::WRAPPED_KEY_SIZE],
        })];
        let identity = ScryptIdentity::new("pw".to_owned().into());
        let err = unwrap_file_key(&stanzas, &[Identity::from(identity)]).unwrap_err();
        assert!(matches!(err, AgeError::Validation(_)));
    }

    #[test]
    fn test_unknown_stanzas_are_skipped() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);
        let (_, mut stanzas) = build(&identity, &file_key);
        stanzas.insert(
            0,
            RecipientStanza::Unknown(Stanza::new("future", vec![], vec![1, 2, 3])),
        );

        let recovered = unwrap_file_key(&stanzas, &[Identity::from(identity)]).unwrap();
        assert_eq!(recovered.as_bytes(), file_key.as_bytes());
    }
}
