//! Passphrase recipients
//!
//! ```text
//! -> scrypt <salt[16]> <log2 N>
//! <ChaCha20-Poly1305(scrypt(label || salt, N, r=8, p=1), file key)>
//! ```

use rand::{CryptoRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use tinyage_core::config::{validate_scrypt_log_cost, SCRYPT_MAX_LOG_COST};
use tinyage_core::{AgeError, AgeResult};

use super::{decode_fixed, expect_args, open_file_key, wrapped_body, UnwrapError, UnwrapResult};
use crate::format::{encode_b64, Stanza};
use crate::keys::FileKey;
use crate::primitives;
use crate::WRAPPED_KEY_SIZE;

pub const TAG: &str = "scrypt";

/// Work factor used when none is configured
pub const DEFAULT_LOG_COST: u8 = 18;

const SALT_LABEL: &[u8] = b"age-encryption.org/v1/scrypt";
const SALT_SIZE: usize = 16;

/// Encrypts to a passphrase.
pub struct ScryptRecipient {
    passphrase: SecretString,
    log_cost: u8,
}

impl ScryptRecipient {
    pub fn new(passphrase: SecretString) -> Self {
        Self {
            passphrase,
            log_cost: DEFAULT_LOG_COST,
        }
    }

    /// Override the work factor. Checked when wrapping, not here.
    pub fn with_log_cost(mut self, log_cost: u8) -> Self {
        self.log_cost = log_cost;
        self
    }

    pub fn log_cost(&self) -> u8 {
        self.log_cost
    }

    pub fn wrap<R: RngCore + CryptoRng>(
        &self,
        file_key: &FileKey,
        rng: &mut R,
    ) -> AgeResult<ScryptStanza> {
        validate_scrypt_log_cost(self.log_cost)?;

        let salt: [u8; SALT_SIZE] = primitives::random_array(rng);
        let key = derive_key(&self.passphrase, &salt, self.log_cost)?;
        let sealed = primitives::seal_zero_nonce(&key, file_key.as_bytes())?;
        let body = sealed
            .as_slice()
            .try_into()
            .map_err(|_| AgeError::Crypto("sealed file key has unexpected length".into()))?;

        Ok(ScryptStanza {
            salt,
            log_cost: self.log_cost,
            body,
        })
    }
}

impl Clone for ScryptRecipient {
    fn clone(&self) -> Self {
        Self {
            passphrase: clone_secret(&self.passphrase),
            log_cost: self.log_cost,
        }
    }
}

impl std::fmt::Debug for ScryptRecipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScryptRecipient")
            .field("passphrase", &"[REDACTED]")
            .field("log_cost", &self.log_cost)
            .finish()
    }
}

/// Decrypts with a passphrase.
pub struct ScryptIdentity {
    passphrase: SecretString,
    max_log_cost: u8,
}

impl ScryptIdentity {
    pub fn new(passphrase: SecretString) -> Self {
        Self {
            passphrase,
            max_log_cost: SCRYPT_MAX_LOG_COST,
        }
    }

    /// Refuse stanzas costlier than `max_log_cost` (still capped at the global bound).
    pub fn with_max_log_cost(mut self, max_log_cost: u8) -> Self {
        self.max_log_cost = max_log_cost.min(SCRYPT_MAX_LOG_COST);
        self
    }

    pub fn unwrap(&self, stanza: &ScryptStanza) -> UnwrapResult {
        validate_scrypt_log_cost(stanza.log_cost).map_err(UnwrapError::Invalid)?;
        if stanza.log_cost > self.max_log_cost {
            return Err(UnwrapError::Invalid(AgeError::Validation(format!(
                "scrypt work factor {} exceeds local limit {}",
                stanza.log_cost, self.max_log_cost
            ))));
        }

        let key = derive_key(&self.passphrase, &stanza.salt, stanza.log_cost)
            .map_err(UnwrapError::Invalid)?;
        open_file_key(&key, &stanza.body)
    }
}

impl Clone for ScryptIdentity {
    fn clone(&self) -> Self {
        Self {
            passphrase: clone_secret(&self.passphrase),
            max_log_cost: self.max_log_cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScryptStanza {
    pub salt: [u8; SALT_SIZE],
    pub log_cost: u8,
    pub body: [u8; WRAPPED_KEY_SIZE],
}

impl ScryptStanza {
    /// Bounds on the work factor are enforced at unwrap time, not here.
    pub fn from_stanza(stanza: &Stanza) -> AgeResult<Self> {
        let args = expect_args(stanza, 2)?;
        let salt = decode_fixed(TAG, "salt", &args[0])?;
        let log_cost = parse_log_cost(&args[1])?;
        Ok(Self {
            salt,
            log_cost,
            body: wrapped_body(stanza)?,
        })
    }

    pub fn to_stanza(&self) -> Stanza {
        Stanza::new(
            TAG,
            vec![encode_b64(&self.salt), self.log_cost.to_string()],
            self.body.to_vec(),
        )
    }
}

/// Decimal without sign or leading zeros.
fn parse_log_cost(arg: &str) -> AgeResult<u8> {
    let canonical = !arg.is_empty()
        && arg.bytes().all(|b| b.is_ascii_digit())
        && (arg == "0" || !arg.starts_with('0'));
    if !canonical {
        return Err(AgeError::Parse(format!(
            "scrypt work factor {arg:?} is not a decimal number"
        )));
    }
    // Too large for u8 is certainly out of range.
    arg.parse::<u8>()
        .map_err(|_| AgeError::Validation(format!("scrypt work factor {arg} out of range")))
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; SALT_SIZE],
    log_cost: u8,
) -> AgeResult<primitives::SymmetricKey> {
    let mut full_salt = Vec::with_capacity(SALT_LABEL.len() + SALT_SIZE);
    full_salt.extend_from_slice(SALT_LABEL);
    full_salt.extend_from_slice(salt);
    primitives::scrypt_derive(passphrase.expose_secret().as_bytes(), &full_salt, log_cost)
}
