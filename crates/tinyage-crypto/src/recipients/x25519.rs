//! Native X25519 recipients
//!
//! ```text
//! -> X25519 <ephemeral share>
//! <ChaCha20-Poly1305(HKDF(share || recipient, label, X25519(e, recipient)), file key)>
//! ```

use rand::{CryptoRng, RngCore};
use tinyage_core::AgeResult;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::{decode_fixed, expect_args, open_file_key, wrapped_body, UnwrapError, UnwrapResult};
use crate::format::{encode_b64, Stanza};
use crate::keys::FileKey;
use crate::primitives;
use crate::WRAPPED_KEY_SIZE;

pub const TAG: &str = "X25519";

pub(crate) const HKDF_LABEL: &[u8] = b"age-encryption.org/v1/X25519";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct X25519Recipient {
    public: [u8; 32],
}

impl X25519Recipient {
    pub fn from_bytes(public: [u8; 32]) -> Self {
        Self { public }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        file_key: &FileKey,
        rng: &mut R,
    ) -> AgeResult<X25519Stanza> {
        let (ephemeral_share, body) = wrap_to_point(&self.public, file_key, rng)?;
        Ok(X25519Stanza {
            ephemeral_share,
            body,
        })
    }
}

/// An X25519 secret scalar. The underlying secret zeroizes on drop.
#[derive(Clone)]
pub struct X25519Identity {
    secret: StaticSecret,
}

impl X25519Identity {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_bytes(primitives::random_array(rng))
    }

    pub fn from_bytes(secret: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn to_public(&self) -> X25519Recipient {
        X25519Recipient::from_bytes(PublicKey::from(&self.secret).to_bytes())
    }

    pub fn unwrap(&self, stanza: &X25519Stanza) -> UnwrapResult {
        let public = self.to_public();
        let secret = self.to_bytes();
        let shared = primitives::x25519(&secret, &stanza.ephemeral_share)
            .map_err(UnwrapError::Invalid)?;
        let key = stanza_key(&shared, &stanza.ephemeral_share, public.as_bytes())
            .map_err(UnwrapError::Invalid)?;
        open_file_key(&key, &stanza.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X25519Stanza {
    pub ephemeral_share: [u8; 32],
    pub body: [u8; WRAPPED_KEY_SIZE],
}

impl X25519Stanza {
    pub fn from_stanza(stanza: &Stanza) -> AgeResult<Self> {
        let args = expect_args(stanza, 1)?;
        Ok(Self {
            ephemeral_share: decode_fixed(TAG, "share", &args[0])?,
            body: wrapped_body(stanza)?,
        })
    }

    pub fn to_stanza(&self) -> Stanza {
        Stanza::new(
            TAG,
            vec![encode_b64(&self.ephemeral_share)],
            self.body.to_vec(),
        )
    }
}

/// Wrap `file_key` to an X25519 point with a fresh ephemeral scalar.
///
/// Returns the ephemeral share and the sealed body. The ssh-ed25519
/// algorithm reuses this with its tweaked point.
pub(crate) fn wrap_to_point<R: RngCore + CryptoRng>(
    point: &[u8; 32],
    file_key: &FileKey,
    rng: &mut R,
) -> AgeResult<([u8; 32], [u8; WRAPPED_KEY_SIZE])> {
    let ephemeral = Zeroizing::new(primitives::random_array::<32, _>(rng));
    let share = primitives::x25519_base(&ephemeral);
    let shared = primitives::x25519(&ephemeral, point)?;
    let key = stanza_key(&shared, &share, point)?;

    let sealed = primitives::seal_zero_nonce(&key, file_key.as_bytes())?;
    let body: [u8; WRAPPED_KEY_SIZE] = sealed.as_slice().try_into().map_err(|_| {
        tinyage_core::AgeError::Crypto("sealed file key has unexpected length".into())
    })?;
    Ok((share, body))
}

/// HKDF(salt = share || recipient point, info = label, ikm = shared secret)
pub(crate) fn stanza_key(
    shared: &[u8; 32],
    share: &[u8; 32],
    recipient_point: &[u8; 32],
) -> AgeResult<primitives::SymmetricKey> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(share);
    salt[32..].copy_from_slice(recipient_point);
    primitives::hkdf_derive(&salt, shared, HKDF_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);

        let stanza = identity.to_public().wrap(&file_key, &mut OsRng).unwrap();
        let unwrapped = identity.unwrap(&stanza).unwrap();

        assert_eq!(unwrapped.as_bytes(), file_key.as_bytes());
    }

    #[test]
    fn test_wrong_identity_is_no_match() {
        let alice = X25519Identity::generate(&mut OsRng);
        let bob = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);

        let stanza = alice.to_public().wrap(&file_key, &mut OsRng).unwrap();
        assert!(matches!(bob.unwrap(&stanza), Err(UnwrapError::NoMatch)));
    }

    #[test]
    fn test_low_order_share_is_invalid() {
        let identity = X25519Identity::generate(&mut OsRng);
        let stanza = X25519Stanza {
            ephemeral_share: [0u8; 32],
            body: [0u8; WRAPPED_KEY_SIZE],
        };
        assert!(matches!(
            identity.unwrap(&stanza),
            Err(UnwrapError::Invalid(_))
        ));
    }

    #[test]
    fn test_stanza_shape() {
        let identity = X25519Identity::generate(&mut OsRng);
        let file_key = FileKey::generate(&mut OsRng);
        let stanza = identity
            .to_public()
            .wrap(&file_key, &mut OsRng)
            .unwrap()
            .to_stanza();

        assert_eq!(stanza.tag, "X25519");
        assert_eq!(stanza.args.len(), 1);
        assert_eq!(stanza.args[0].len(), 43, "32 bytes unpadded base64");
        assert_eq!(stanza.body.len(), 32);

        let parsed = X25519Stanza::from_stanza(&stanza).unwrap();
        assert_eq!(parsed.to_stanza(), stanza);
    }

    #[test]
    fn test_rejects_short_body() {
        let stanza = Stanza::new(TAG, vec![encode_b64(&[1u8; 32])], vec![0u8; 31]);
        assert!(X25519Stanza::from_stanza(&stanza).is_err());
    }
}
