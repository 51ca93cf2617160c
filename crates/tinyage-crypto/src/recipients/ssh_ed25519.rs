//! ssh-ed25519 recipients
//!
//! The Ed25519 key is mapped to its Montgomery form and tweaked with a scalar
//! bound to the SSH public key, then used as an X25519 recipient:
//!
//! ```text
//! tweak   = reduce(HKDF(salt = ssh wire key, ikm = "", info = label, 64 bytes))
//! tweaked = X25519(tweak, montgomery(pk))
//! -> ssh-ed25519 <SHA-256(ssh wire key)[..4]> <ephemeral share>
//! <X25519 body wrapped to `tweaked`>
//! ```

use curve25519_dalek::Scalar;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{CryptoRng, RngCore};
use tinyage_core::{AgeError, AgeResult};
use zeroize::Zeroizing;

use super::x25519::{stanza_key, wrap_to_point};
use super::{decode_fixed, expect_args, open_file_key, wrapped_body, UnwrapError, UnwrapResult};
use crate::format::{encode_b64, Stanza};
use crate::keys::FileKey;
use crate::primitives;
use crate::ssh::{self, FINGERPRINT_SIZE};
use crate::WRAPPED_KEY_SIZE;

pub const TAG: &str = "ssh-ed25519";

const TWEAK_LABEL: &[u8] = b"age-encryption.org/v1/ssh-ed25519";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEd25519Recipient {
    key: VerifyingKey,
    fingerprint: [u8; FINGERPRINT_SIZE],
    tweak: [u8; 32],
    tweaked: [u8; 32],
}

impl SshEd25519Recipient {
    pub fn new(key: VerifyingKey) -> AgeResult<Self> {
        let wire = ssh::ed25519_wire(&key);
        let tweak = derive_tweak(&wire)?;
        let converted = key.to_montgomery().to_bytes();
        let tweaked = *primitives::x25519(&tweak, &converted)?;
        Ok(Self {
            key,
            fingerprint: ssh::fingerprint(&wire),
            tweak,
            tweaked,
        })
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.key
    }

    pub fn fingerprint(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.fingerprint
    }

    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        file_key: &FileKey,
        rng: &mut R,
    ) -> AgeResult<SshEd25519Stanza> {
        let (ephemeral_share, body) = wrap_to_point(&self.tweaked, file_key, rng)?;
        Ok(SshEd25519Stanza {
            fingerprint: self.fingerprint,
            ephemeral_share,
            body,
        })
    }
}

/// An Ed25519 signing key, already decoded from its OpenSSH container.
#[derive(Clone)]
pub struct SshEd25519Identity {
    key: SigningKey,
    recipient: SshEd25519Recipient,
}

impl SshEd25519Identity {
    pub fn new(key: SigningKey) -> AgeResult<Self> {
        let recipient = SshEd25519Recipient::new(key.verifying_key())?;
        Ok(Self { key, recipient })
    }

    pub fn to_public(&self) -> SshEd25519Recipient {
        self.recipient.clone()
    }

    /// A fingerprint mismatch is reported before any curve arithmetic.
    pub fn unwrap(&self, stanza: &SshEd25519Stanza) -> UnwrapResult {
        if stanza.fingerprint != self.recipient.fingerprint {
            return Err(UnwrapError::WrongKey);
        }

        let converted_secret = Zeroizing::new(self.key.to_scalar_bytes());
        let tweaked_share = primitives::x25519(&self.recipient.tweak, &stanza.ephemeral_share)
            .map_err(UnwrapError::Invalid)?;
        let shared = primitives::x25519(&converted_secret, &tweaked_share)
            .map_err(UnwrapError::Invalid)?;

        // The salt binds the share as sent, not its tweaked image.
        let key = stanza_key(&shared, &stanza.ephemeral_share, &self.recipient.tweaked)
            .map_err(UnwrapError::Invalid)?;
        open_file_key(&key, &stanza.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEd25519Stanza {
    pub fingerprint: [u8; FINGERPRINT_SIZE],
    pub ephemeral_share: [u8; 32],
    pub body: [u8; WRAPPED_KEY_SIZE],
}

impl SshEd25519Stanza {
    pub fn from_stanza(stanza: &Stanza) -> AgeResult<Self> {
        let args = expect_args(stanza, 2)?;
        Ok(Self {
            fingerprint: decode_fixed(TAG, "fingerprint", &args[0])?,
            ephemeral_share: decode_fixed(TAG, "share", &args[1])?,
            body: wrapped_body(stanza)?,
        })
    }

    pub fn to_stanza(&self) -> Stanza {
        Stanza::new(
            TAG,
            vec![
                encode_b64(&self.fingerprint),
                encode_b64(&self.ephemeral_share),
            ],
            self.body.to_vec(),
        )
    }
}

fn derive_tweak(ssh_wire: &[u8]) -> AgeResult<[u8; 32]> {
    let mut wide = Zeroizing::new([0u8; 64]);
    primitives::hkdf_expand_into(ssh_wire, b"", TWEAK_LABEL, &mut wide[..])?;
    let tweak = Scalar::from_bytes_mod_order_wide(&wide).to_bytes();
    if tweak == [0u8; 32] {
        return Err(AgeError::Crypto("ssh-ed25519 tweak reduced to zero".into()));
    }
    Ok(tweak)
}
