//! Chunked ChaCha20-Poly1305 payload
//!
//! Payload format (binary, after the header):
//! ```text
//! [16 bytes: payload nonce][chunk 0][chunk 1]...[final chunk]
//! chunk   = ChaCha20-Poly1305(payload key, nonce_i, plaintext_i)  (64 KiB + 16 except the last)
//! nonce_i = i as 11-byte big-endian || 0x00 (0x01 on the final chunk)
//! ```
//!
//! The counter and the final flag bind each chunk to its position, so chunks
//! cannot be reordered, dropped or appended without detection.

use std::io::{self, Read, Write};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use tinyage_core::{AgeError, AgeResult};
use zeroize::Zeroizing;

use crate::{CHUNK_SIZE, KEY_SIZE, TAG_SIZE};

/// Size of a sealed full chunk
pub const ENCRYPTED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

/// Largest chunk counter representable in the 11-byte nonce prefix
pub const MAX_COUNTER: u128 = (1 << 88) - 1;

const LAST_CHUNK_FLAG: u8 = 0x01;

/// Build the nonce of chunk `counter`.
pub fn chunk_nonce(counter: u128, last: bool) -> AgeResult<[u8; 12]> {
    if counter > MAX_COUNTER {
        return Err(AgeError::NonceOverflow);
    }
    let mut nonce = [0u8; 12];
    nonce[..11].copy_from_slice(&counter.to_be_bytes()[5..]);
    if last {
        nonce[11] = LAST_CHUNK_FLAG;
    }
    Ok(nonce)
}

fn seal_chunk(
    cipher: &ChaCha20Poly1305,
    counter: u128,
    last: bool,
    plaintext: &[u8],
) -> AgeResult<Vec<u8>> {
    let nonce = chunk_nonce(counter, last)?;
    cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| AgeError::Crypto(format!("chunk encryption failed: {e}")))
}

fn open_chunk(
    cipher: &ChaCha20Poly1305,
    counter: u128,
    last: bool,
    ciphertext: &[u8],
) -> AgeResult<Option<Zeroizing<Vec<u8>>>> {
    let nonce = chunk_nonce(counter, last)?;
    Ok(cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext)
        .ok()
        .map(Zeroizing::new))
}

// ── Writer ─────────────────────────────────────────────────────────────────

/// Encrypts everything written to it. Call [`StreamWriter::finish`] to emit
/// the final chunk; a writer that is dropped leaves a truncated stream.
pub struct StreamWriter<W: Write> {
    inner: Option<W>,
    cipher: ChaCha20Poly1305,
    counter: u128,
    buffer: Zeroizing<Vec<u8>>,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W, payload_key: &[u8; KEY_SIZE]) -> Self {
        Self {
            inner: Some(inner),
            cipher: ChaCha20Poly1305::new(payload_key.into()),
            counter: 0,
            buffer: Zeroizing::new(Vec::with_capacity(CHUNK_SIZE)),
        }
    }

    /// Seal the buffered data as the final chunk and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        let sealed = seal_chunk(&self.cipher, self.counter, true, &self.buffer)
            .map_err(AgeError::into_io)?;
        self.buffer.clear();

        let mut inner = self.take_inner()?;
        inner.write_all(&sealed)?;
        inner.flush()?;
        Ok(inner)
    }

    fn take_inner(&mut self) -> io::Result<W> {
        self.inner
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream writer already finished"))
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream writer already finished"))
    }

    /// Emit the full buffer as a non-final chunk.
    fn flush_full_chunk(&mut self) -> io::Result<()> {
        let sealed = seal_chunk(&self.cipher, self.counter, false, &self.buffer)
            .map_err(AgeError::into_io)?;
        self.inner_mut()?.write_all(&sealed)?;
        self.buffer.clear();
        self.counter += 1;
        Ok(())
    }
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < data.len() {
            // A full chunk is only known to be non-final once more data arrives.
            if self.buffer.len() == CHUNK_SIZE {
                self.flush_full_chunk()?;
            }
            let room = CHUNK_SIZE - self.buffer.len();
            let take = room.min(data.len() - written);
            self.buffer
                .extend_from_slice(&data[written..written + take]);
            written += take;
        }
        Ok(written)
    }

    /// Flushes the sink only. Buffered plaintext is sealed on the next full chunk or on finish.
    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut()?.flush()
    }
}

impl<W: Write> Drop for StreamWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() && !std::thread::panicking() {
            tracing::warn!(
                chunks_written = %self.counter,
                "stream writer dropped without finish(); output is truncated"
            );
        }
    }
}

// ── Reader ─────────────────────────────────────────────────────────────────

enum ReadState {
    Streaming,
    Done,
    Failed(Fault),
}

/// A failure that every later read repeats.
#[derive(Clone, Copy)]
enum Fault {
    Corrupt(u128),
    NonceOverflow,
}

impl Fault {
    fn from_error(err: &AgeError) -> Option<Self> {
        match err {
            AgeError::StreamCorruption { chunk } => Some(Fault::Corrupt(*chunk)),
            AgeError::NonceOverflow => Some(Fault::NonceOverflow),
            _ => None,
        }
    }

    fn to_error(self) -> AgeError {
        match self {
            Fault::Corrupt(chunk) => AgeError::StreamCorruption { chunk },
            Fault::NonceOverflow => AgeError::NonceOverflow,
        }
    }
}

/// Decrypts a payload chunk by chunk. Plaintext of a chunk is released only
/// after that chunk authenticates.
pub struct StreamReader<R: Read> {
    inner: R,
    cipher: ChaCha20Poly1305,
    counter: u128,
    chunk: Zeroizing<Vec<u8>>,
    pos: usize,
    state: ReadState,
    sealed: Vec<u8>,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R, payload_key: &[u8; KEY_SIZE]) -> Self {
        Self {
            inner,
            cipher: ChaCha20Poly1305::new(payload_key.into()),
            counter: 0,
            chunk: Zeroizing::new(Vec::new()),
            pos: 0,
            state: ReadState::Streaming,
            sealed: vec![0u8; ENCRYPTED_CHUNK_SIZE],
        }
    }

    /// Number of chunks authenticated so far.
    pub fn chunks_read(&self) -> u128 {
        self.counter
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Framing faults are reported against the chunk where the stream went wrong.
    fn corrupt(&self) -> AgeError {
        AgeError::StreamCorruption {
            chunk: self.counter,
        }
    }

    fn next_chunk(&mut self) -> AgeResult<()> {
        let n = read_full(&mut self.inner, &mut self.sealed)?;
        if n < TAG_SIZE {
            // Covers both a missing final chunk and a fragment too short to authenticate.
            return Err(self.corrupt());
        }
        // Only an empty plaintext is sealed as an empty final chunk.
        if n == TAG_SIZE && self.counter > 0 {
            return Err(self.corrupt());
        }

        let ciphertext = &self.sealed[..n];
        if n < ENCRYPTED_CHUNK_SIZE {
            let plaintext = open_chunk(&self.cipher, self.counter, true, ciphertext)?
                .ok_or_else(|| self.corrupt())?;
            self.accept(plaintext, true);
            return Ok(());
        }

        if let Some(plaintext) = open_chunk(&self.cipher, self.counter, false, ciphertext)? {
            self.accept(plaintext, false);
            return Ok(());
        }

        // A full chunk may still be the last one when the plaintext length is a multiple of 64 KiB.
        let plaintext = open_chunk(&self.cipher, self.counter, true, ciphertext)?
            .ok_or_else(|| self.corrupt())?;
        let mut lookahead = [0u8; 1];
        if read_full(&mut self.inner, &mut lookahead)? != 0 {
            return Err(self.corrupt());
        }
        self.accept(plaintext, true);
        Ok(())
    }

    fn accept(&mut self, plaintext: Zeroizing<Vec<u8>>, last: bool) {
        self.chunk = plaintext;
        self.pos = 0;
        self.counter += 1;
        if last {
            self.state = ReadState::Done;
        }
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.chunk.len() {
                let n = out.len().min(self.chunk.len() - self.pos);
                out[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match self.state {
                ReadState::Done => return Ok(0),
                ReadState::Failed(fault) => return Err(fault.to_error().into_io()),
                ReadState::Streaming => {}
            }
            if out.is_empty() {
                return Ok(0);
            }
            match self.next_chunk() {
                Ok(()) => {}
                Err(e) => {
                    if let Some(fault) = Fault::from_error(&e) {
                        self.state = ReadState::Failed(fault);
                    }
                    return Err(e.into_io());
                }
            }
        }
    }
}

/// Fill `buf` unless EOF comes first; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
