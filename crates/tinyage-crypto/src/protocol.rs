//! Encryptor / Decryptor: file key generation, recipient fan-out, header
//! authentication and payload streaming tied together.

use std::io::{self, BufRead, Read, Write};

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tinyage_core::{AgeError, AgeResult};

use crate::format::{self, Header};
use crate::header;
use crate::keys::FileKey;
use crate::primitives;
use crate::recipients::{Identity, Recipient, RecipientStanza};
use crate::stream::{StreamReader, StreamWriter};
use crate::PAYLOAD_NONCE_SIZE;

/// Encrypts a payload to a fixed set of recipients.
pub struct Encryptor<R = OsRng> {
    recipients: Vec<Recipient>,
    rng: R,
}

impl Encryptor<OsRng> {
    pub fn new(recipients: Vec<Recipient>) -> AgeResult<Self> {
        Self::with_rng(recipients, OsRng)
    }
}

impl<R: RngCore + CryptoRng> Encryptor<R> {
    /// Use `rng` for the file key, ephemeral secrets, salts and the payload nonce.
    pub fn with_rng(recipients: Vec<Recipient>, rng: R) -> AgeResult<Self> {
        if recipients.is_empty() {
            return Err(AgeError::Validation("at least one recipient is required".into()));
        }
        if recipients.len() > 1 && recipients.iter().any(Recipient::is_passphrase) {
            tracing::warn!(
                recipients = recipients.len(),
                "passphrase recipient mixed with other recipients; anyone holding any of them can decrypt"
            );
        }
        Ok(Self { recipients, rng })
    }

    /// Write the header and payload nonce to `output`, returning the payload writer.
    pub fn wrap_output<W: Write>(mut self, mut output: W) -> AgeResult<StreamWriter<W>> {
        let file_key = FileKey::generate(&mut self.rng);

        let mut stanzas = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            let stanza = recipient.wrap(&file_key, &mut self.rng)?;
            tracing::debug!(tag = stanza.tag(), "wrapped file key");
            stanzas.push(stanza.to_stanza());
        }

        let header_bytes = header::encode_header(&stanzas, &file_key)?;
        output.write_all(&header_bytes)?;

        let nonce: [u8; PAYLOAD_NONCE_SIZE] = primitives::random_array(&mut self.rng);
        output.write_all(&nonce)?;

        let payload_key = file_key.payload_key(&nonce)?;
        Ok(StreamWriter::new(output, &payload_key))
    }
}

/// A parsed (not yet authenticated) encrypted file.
pub struct Decryptor<R: BufRead> {
    input: R,
    header: Header,
    stanzas: Vec<RecipientStanza>,
}

impl<R: BufRead> Decryptor<R> {
    /// Parse the header. A known stanza type with a malformed shape fails here.
    pub fn new(mut input: R) -> AgeResult<Self> {
        let header = format::read_header(&mut input)?;
        let stanzas = header
            .stanzas
            .iter()
            .cloned()
            .map(RecipientStanza::from_stanza)
            .collect::<AgeResult<Vec<_>>>()?;
        Ok(Self {
            input,
            header,
            stanzas,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn stanzas(&self) -> &[RecipientStanza] {
        &self.stanzas
    }

    /// True when the file can only be opened with a passphrase.
    pub fn is_passphrase_only(&self) -> bool {
        !self.stanzas.is_empty()
            && self
                .stanzas
                .iter()
                .all(|s| matches!(s, RecipientStanza::Scrypt(_)))
    }

    /// Unlock with `identities`, authenticate the header and return the payload reader.
    pub fn decrypt(mut self, identities: &[Identity]) -> AgeResult<StreamReader<R>> {
        let file_key = header::unlock(&self.header, &self.stanzas, identities)?;

        let mut nonce = [0u8; PAYLOAD_NONCE_SIZE];
        self.input.read_exact(&mut nonce).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => AgeError::Truncated,
            _ => AgeError::Io(e),
        })?;

        let payload_key = file_key.payload_key(&nonce)?;
        Ok(StreamReader::new(self.input, &payload_key))
    }
}

/// Encrypt an in-memory plaintext.
pub fn encrypt(recipients: Vec<Recipient>, plaintext: &[u8]) -> AgeResult<Vec<u8>> {
    let mut writer = Encryptor::new(recipients)?.wrap_output(Vec::new())?;
    writer.write_all(plaintext).map_err(AgeError::from_io)?;
    writer.finish().map_err(AgeError::from_io)
}

/// Decrypt an in-memory ciphertext.
pub fn decrypt(identities: &[Identity], ciphertext: &[u8]) -> AgeResult<Vec<u8>> {
    let mut reader = Decryptor::new(ciphertext)?.decrypt(identities)?;
    let mut plaintext = Vec::new();
    reader
        .read_to_end(&mut plaintext)
        .map_err(AgeError::from_io)?;
    Ok(plaintext)
}
