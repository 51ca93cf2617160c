//! Native age key strings (Bech32)
//!
//! ```text
//! recipient: age1<bech32 data>                  (lowercase)
//! identity:  AGE-SECRET-KEY-1<bech32 data>      (uppercase)
//! ```

use anyhow::{bail, Context, Result};
use bech32::{FromBase32, ToBase32, Variant};
use rand::rngs::OsRng;
use secrecy::SecretString;
use tinyage_crypto::{X25519Identity, X25519Recipient};
use zeroize::Zeroizing;

pub const PUBLIC_KEY_HRP: &str = "age";
pub const SECRET_KEY_HRP: &str = "age-secret-key-";

/// Prefix every recipient string starts with.
pub const PUBLIC_KEY_PREFIX: &str = "age1";

/// Prefix every secret key string starts with.
pub const SECRET_KEY_PREFIX: &str = "AGE-SECRET-KEY-1";

pub fn encode_recipient(recipient: &X25519Recipient) -> Result<String> {
    bech32::encode(
        PUBLIC_KEY_HRP,
        recipient.as_bytes().as_slice().to_base32(),
        Variant::Bech32,
    )
    .context("encoding age recipient")
}

pub fn parse_recipient(s: &str) -> Result<X25519Recipient> {
    let bytes = decode(s, PUBLIC_KEY_HRP).context("invalid age recipient")?;
    let public: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("age recipient must hold 32 bytes, got {}", bytes.len()))?;
    Ok(X25519Recipient::from_bytes(public))
}

pub fn encode_identity(identity: &X25519Identity) -> Result<SecretString> {
    let secret = identity.to_bytes();
    let encoded = Zeroizing::new(
        bech32::encode(SECRET_KEY_HRP, secret.as_slice().to_base32(), Variant::Bech32)
            .context("encoding age identity")?,
    );
    Ok(SecretString::from(encoded.to_uppercase()))
}

/// Accepts the canonical uppercase form as well as all-lowercase.
pub fn parse_identity(s: &str) -> Result<X25519Identity> {
    let bytes = Zeroizing::new(decode(s, SECRET_KEY_HRP).context("invalid age identity")?);
    let secret: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("age identity must hold 32 bytes, got {}", bytes.len()))?;
    Ok(X25519Identity::from_bytes(secret))
}

fn decode(s: &str, expected_hrp: &str) -> Result<Vec<u8>> {
    let (hrp, data, variant) = bech32::decode(s)?;
    if hrp != expected_hrp {
        bail!("unexpected prefix {hrp:?}, expected {expected_hrp:?}");
    }
    if variant != Variant::Bech32 {
        bail!("bech32m encoding is not used for age keys");
    }
    Ok(Vec::<u8>::from_base32(&data)?)
}

/// A freshly generated identity with its key file rendering.
pub struct GeneratedKey {
    pub identity: X25519Identity,
    pub public: String,
}

impl GeneratedKey {
    pub fn generate() -> Result<Self> {
        let identity = X25519Identity::generate(&mut OsRng);
        let public = encode_recipient(&identity.to_public())?;
        Ok(Self { identity, public })
    }

    /// Three lines: creation time, public key comment, secret key.
    pub fn to_key_file(&self) -> Result<Zeroizing<String>> {
        use secrecy::ExposeSecret;

        let secret = encode_identity(&self.identity)?;
        let created = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        Ok(Zeroizing::new(format!(
            "# created: {created}\n# public key: {}\n{}\n",
            self.public,
            secret.expose_secret()
        )))
    }
}
