//! Recipient algorithms: wrap a file key into a stanza, unwrap it again
//!
//! ```text
//! Recipient ──wrap──▶ RecipientStanza ──to_stanza──▶ Stanza (wire)
//! Identity  ◀─unwrap─ RecipientStanza ◀─from_stanza─ Stanza (wire)
//! ```
//!
//! Dispatch is a closed match on the stanza type. Stanzas of a type no
//! algorithm handles parse as [`RecipientStanza::Unknown`] and are skipped.

pub mod scrypt;
pub mod ssh_ed25519;
pub mod ssh_rsa;
pub mod x25519;

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tinyage_core::{AgeError, AgeResult};

use crate::format::{self, Stanza};
use crate::keys::FileKey;

pub use self::scrypt::{ScryptIdentity, ScryptRecipient, ScryptStanza};
pub use self::ssh_ed25519::{SshEd25519Identity, SshEd25519Recipient, SshEd25519Stanza};
pub use self::ssh_rsa::{SshRsaIdentity, SshRsaRecipient, SshRsaStanza};
pub use self::x25519::{X25519Identity, X25519Recipient, X25519Stanza};

/// Why an identity could not recover a file key from a stanza.
#[derive(Debug, Error)]
pub enum UnwrapError {
    /// The stanza was not addressed to this identity, or did not authenticate.
    #[error("stanza does not match identity")]
    NoMatch,
    /// The stanza names a different key by fingerprint.
    #[error("stanza is addressed to a different key")]
    WrongKey,
    /// The stanza is unusable for every identity; stop trying.
    #[error(transparent)]
    Invalid(AgeError),
}

pub type UnwrapResult = Result<FileKey, UnwrapError>;

/// A public key (or passphrase) a file can be encrypted to.
#[derive(Debug, Clone)]
pub enum Recipient {
    X25519(X25519Recipient),
    Scrypt(ScryptRecipient),
    SshRsa(SshRsaRecipient),
    SshEd25519(SshEd25519Recipient),
}

impl Recipient {
    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        file_key: &FileKey,
        rng: &mut R,
    ) -> AgeResult<RecipientStanza> {
        Ok(match self {
            Recipient::X25519(r) => RecipientStanza::X25519(r.wrap(file_key, rng)?),
            Recipient::Scrypt(r) => RecipientStanza::Scrypt(r.wrap(file_key, rng)?),
            Recipient::SshRsa(r) => RecipientStanza::SshRsa(r.wrap(file_key, rng)?),
            Recipient::SshEd25519(r) => RecipientStanza::SshEd25519(r.wrap(file_key, rng)?),
        })
    }

    pub fn is_passphrase(&self) -> bool {
        matches!(self, Recipient::Scrypt(_))
    }

    pub fn stanza_tag(&self) -> &'static str {
        match self {
            Recipient::X25519(_) => x25519::TAG,
            Recipient::Scrypt(_) => scrypt::TAG,
            Recipient::SshRsa(_) => ssh_rsa::TAG,
            Recipient::SshEd25519(_) => ssh_ed25519::TAG,
        }
    }
}

/// A secret able to unwrap stanzas of one algorithm.
#[derive(Clone)]
pub enum Identity {
    X25519(X25519Identity),
    Scrypt(ScryptIdentity),
    SshRsa(SshRsaIdentity),
    SshEd25519(SshEd25519Identity),
}

impl Identity {
    /// Try to recover the file key. Stanzas of another algorithm never match.
    pub fn unwrap_stanza(&self, stanza: &RecipientStanza) -> UnwrapResult {
        match (self, stanza) {
            (Identity::X25519(i), RecipientStanza::X25519(s)) => i.unwrap(s),
            (Identity::Scrypt(i), RecipientStanza::Scrypt(s)) => i.unwrap(s),
            (Identity::SshRsa(i), RecipientStanza::SshRsa(s)) => i.unwrap(s),
            (Identity::SshEd25519(i), RecipientStanza::SshEd25519(s)) => i.unwrap(s),
            _ => Err(UnwrapError::NoMatch),
        }
    }

    pub fn stanza_tag(&self) -> &'static str {
        match self {
            Identity::X25519(_) => x25519::TAG,
            Identity::Scrypt(_) => scrypt::TAG,
            Identity::SshRsa(_) => ssh_rsa::TAG,
            Identity::SshEd25519(_) => ssh_ed25519::TAG,
        }
    }

    /// The matching recipient. Passphrase identities have none.
    pub fn to_recipient(&self) -> Option<Recipient> {
        match self {
            Identity::X25519(i) => Some(Recipient::X25519(i.to_public())),
            Identity::Scrypt(_) => None,
            Identity::SshRsa(i) => Some(Recipient::SshRsa(i.to_public())),
            Identity::SshEd25519(i) => Some(Recipient::SshEd25519(i.to_public())),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Identity")
            .field(&self.stanza_tag())
            .field(&"[REDACTED]")
            .finish()
    }
}

/// A stanza interpreted according to its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientStanza {
    X25519(X25519Stanza),
    Scrypt(ScryptStanza),
    SshRsa(SshRsaStanza),
    SshEd25519(SshEd25519Stanza),
    Unknown(Stanza),
}

impl RecipientStanza {
    /// Interpret a wire stanza. Unknown types are kept verbatim; a known type
    /// with the wrong shape is a parse error.
    pub fn from_stanza(stanza: Stanza) -> AgeResult<Self> {
        match Self::parse_known(&stanza) {
            Ok(parsed) => Ok(parsed),
            Err(AgeError::UnknownRecipient(tag)) => {
                tracing::debug!(%tag, "keeping stanza of unknown type");
                Ok(RecipientStanza::Unknown(stanza))
            }
            Err(e) => Err(e),
        }
    }

    fn parse_known(stanza: &Stanza) -> AgeResult<Self> {
        Ok(match stanza.tag.as_str() {
            x25519::TAG => RecipientStanza::X25519(X25519Stanza::from_stanza(stanza)?),
            scrypt::TAG => RecipientStanza::Scrypt(ScryptStanza::from_stanza(stanza)?),
            ssh_rsa::TAG => RecipientStanza::SshRsa(SshRsaStanza::from_stanza(stanza)?),
            ssh_ed25519::TAG => {
                RecipientStanza::SshEd25519(SshEd25519Stanza::from_stanza(stanza)?)
            }
            other => return Err(AgeError::UnknownRecipient(other.to_owned())),
        })
    }

    pub fn to_stanza(&self) -> Stanza {
        match self {
            RecipientStanza::X25519(s) => s.to_stanza(),
            RecipientStanza::Scrypt(s) => s.to_stanza(),
            RecipientStanza::SshRsa(s) => s.to_stanza(),
            RecipientStanza::SshEd25519(s) => s.to_stanza(),
            RecipientStanza::Unknown(s) => s.clone(),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            RecipientStanza::X25519(_) => x25519::TAG,
            RecipientStanza::Scrypt(_) => scrypt::TAG,
            RecipientStanza::SshRsa(_) => ssh_rsa::TAG,
            RecipientStanza::SshEd25519(_) => ssh_ed25519::TAG,
            RecipientStanza::Unknown(s) => &s.tag,
        }
    }
}

macro_rules! impl_from_variant {
    ($enum:ident, $($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for $enum {
                fn from(value: $ty) -> Self {
                    $enum::$variant(value)
                }
            }
        )+
    };
}

impl_from_variant!(Recipient,
    X25519 => X25519Recipient,
    Scrypt => ScryptRecipient,
    SshRsa => SshRsaRecipient,
    SshEd25519 => SshEd25519Recipient,
);

impl_from_variant!(Identity,
    X25519 => X25519Identity,
    Scrypt => ScryptIdentity,
    SshRsa => SshRsaIdentity,
    SshEd25519 => SshEd25519Identity,
);

// ── Shared stanza helpers ──────────────────────────────────────────────────

/// Check the argument count of a known stanza type.
pub(crate) fn expect_args<'a>(stanza: &'a Stanza, count: usize) -> AgeResult<&'a [String]> {
    if stanza.args.len() != count {
        return Err(AgeError::Parse(format!(
            "{} stanza needs {count} argument(s), found {}",
            stanza.tag,
            stanza.args.len()
        )));
    }
    Ok(&stanza.args)
}

/// Decode a base64 argument of an exact byte length.
pub(crate) fn decode_fixed<const N: usize>(tag: &str, what: &str, arg: &str) -> AgeResult<[u8; N]> {
    format::decode_b64(arg)?.try_into().map_err(|_| {
        AgeError::Parse(format!("{tag} stanza {what} must be {N} bytes"))
    })
}

/// Decode a body that wraps a file key with ChaCha20-Poly1305 (16 + 16 bytes).
pub(crate) fn wrapped_body(stanza: &Stanza) -> AgeResult<[u8; crate::WRAPPED_KEY_SIZE]> {
    stanza.body.as_slice().try_into().map_err(|_| {
        AgeError::Parse(format!(
            "{} stanza body must be {} bytes",
            stanza.tag,
            crate::WRAPPED_KEY_SIZE
        ))
    })
}

/// Unwrap a zero-nonce AEAD body into a file key. Tag failure is `NoMatch`.
pub(crate) fn open_file_key(key: &[u8; crate::KEY_SIZE], body: &[u8]) -> UnwrapResult {
    let plaintext = crate::primitives::open_zero_nonce(key, body).ok_or(UnwrapError::NoMatch)?;
    FileKey::from_slice(&plaintext).ok_or(UnwrapError::NoMatch)
}
