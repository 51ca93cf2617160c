//! ssh-rsa recipients
//!
//! ```text
//! -> ssh-rsa <SHA-256(ssh wire key)[..4]>
//! <RSA-OAEP(SHA-256, MGF1-SHA-256, label, file key)>
//! ```

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tinyage_core::{AgeError, AgeResult};

use super::{decode_fixed, expect_args, UnwrapError, UnwrapResult};
use crate::format::{encode_b64, Stanza};
use crate::keys::FileKey;
use crate::ssh::{self, FINGERPRINT_SIZE};

pub const TAG: &str = "ssh-rsa";

const OAEP_LABEL: &str = "age-encryption.org/v1/ssh-rsa";

fn oaep() -> Oaep {
    Oaep::new_with_label::<Sha256, _>(OAEP_LABEL)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshRsaRecipient {
    key: RsaPublicKey,
    fingerprint: [u8; FINGERPRINT_SIZE],
}

impl SshRsaRecipient {
    pub fn new(key: RsaPublicKey) -> Self {
        let fingerprint = ssh::fingerprint(&ssh::rsa_wire(&key));
        Self { key, fingerprint }
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.key
    }

    pub fn fingerprint(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.fingerprint
    }

    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        file_key: &FileKey,
        rng: &mut R,
    ) -> AgeResult<SshRsaStanza> {
        let body = self
            .key
            .encrypt(rng, oaep(), file_key.as_bytes())
            .map_err(|e| AgeError::Crypto(format!("RSA-OAEP encryption failed: {e}")))?;
        Ok(SshRsaStanza {
            fingerprint: self.fingerprint,
            body,
        })
    }
}

/// An RSA private key, already decoded from its OpenSSH container.
#[derive(Clone)]
pub struct SshRsaIdentity {
    key: RsaPrivateKey,
    recipient: SshRsaRecipient,
}

impl SshRsaIdentity {
    pub fn new(key: RsaPrivateKey) -> Self {
        let recipient = SshRsaRecipient::new(key.to_public_key());
        Self { key, recipient }
    }

    pub fn to_public(&self) -> SshRsaRecipient {
        self.recipient.clone()
    }

    /// A fingerprint mismatch is reported before any private-key operation.
    pub fn unwrap(&self, stanza: &SshRsaStanza) -> UnwrapResult {
        self.unwrap_with_rng(stanza, &mut OsRng)
    }

    /// The private-key operation is blinded with `rng`.
    pub fn unwrap_with_rng<R: RngCore + CryptoRng>(
        &self,
        stanza: &SshRsaStanza,
        rng: &mut R,
    ) -> UnwrapResult {
        if stanza.fingerprint != self.recipient.fingerprint {
            return Err(UnwrapError::WrongKey);
        }
        let plaintext = zeroize::Zeroizing::new(
            self.key
                .decrypt_blinded(rng, oaep(), &stanza.body)
                .map_err(|_| UnwrapError::NoMatch)?,
        );
        FileKey::from_slice(&plaintext).ok_or(UnwrapError::NoMatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshRsaStanza {
    pub fingerprint: [u8; FINGERPRINT_SIZE],
    pub body: Vec<u8>,
}

impl SshRsaStanza {
    pub fn from_stanza(stanza: &Stanza) -> AgeResult<Self> {
        let args = expect_args(stanza, 1)?;
        if stanza.body.is_empty() {
            return Err(AgeError::Parse("ssh-rsa stanza has an empty body".into()));
        }
        Ok(Self {
            fingerprint: decode_fixed(TAG, "fingerprint", &args[0])?,
            body: stanza.body.clone(),
        })
    }

    pub fn to_stanza(&self) -> Stanza {
        Stanza::new(TAG, vec![encode_b64(&self.fingerprint)], self.body.clone())
    }
}
