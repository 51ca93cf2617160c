//! ASCII armor for encrypted files
//!
//! ```text
//! -----BEGIN AGE ENCRYPTED FILE-----
//! <standard padded base64 of the binary file, 64 columns>
//! -----END AGE ENCRYPTED FILE-----
//! ```
//!
//! Reading is strict: every body line but the last must be exactly 64
//! columns, and only whitespace may follow the end marker.

use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tinyage_core::{AgeError, AgeResult};

pub const BEGIN_MARKER: &str = "-----BEGIN AGE ENCRYPTED FILE-----";
pub const END_MARKER: &str = "-----END AGE ENCRYPTED FILE-----";

const COLUMNS: usize = 64;
/// Raw bytes per full armor line
const BYTES_PER_LINE: usize = COLUMNS / 4 * 3;

/// True when `prefix` (the first bytes of a file) starts an armored file.
pub fn is_armored(prefix: &[u8]) -> bool {
    let start = prefix
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(prefix.len());
    let rest = &prefix[start..];
    let marker = BEGIN_MARKER.as_bytes();
    let n = rest.len().min(marker.len());
    n > 0 && rest[..n] == marker[..n]
}

/// Armor a complete binary file.
pub fn armor(data: &[u8]) -> String {
    let lines = data.len().div_ceil(BYTES_PER_LINE);
    let mut out =
        String::with_capacity(BEGIN_MARKER.len() + END_MARKER.len() + 2 + lines * (COLUMNS + 1));
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    for line in data.chunks(BYTES_PER_LINE) {
        STANDARD.encode_string(line, &mut out);
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out.push('\n');
    out
}

/// Strip the armor, validating markers and line lengths.
pub fn dearmor(text: &str) -> AgeResult<Vec<u8>> {
    let mut lines = text.trim_start().lines();
    match lines.next() {
        Some(first) if first.trim_end() == BEGIN_MARKER => {}
        _ => return Err(AgeError::Parse("missing armor begin marker".into())),
    }

    let mut body: Vec<&str> = Vec::new();
    let mut closed = false;
    for line in lines.by_ref() {
        let line = line.trim_end_matches('\r');
        if line == END_MARKER {
            closed = true;
            break;
        }
        if line.starts_with("-----") {
            return Err(AgeError::Parse(format!("unexpected armor boundary {line:?}")));
        }
        body.push(line);
    }
    if !closed {
        return Err(AgeError::Parse("missing armor end marker".into()));
    }
    if lines.any(|rest| !rest.trim().is_empty()) {
        return Err(AgeError::Parse("data after armor end marker".into()));
    }

    if let Some((last, full)) = body.split_last() {
        if let Some(bad) = full.iter().find(|l| l.len() != COLUMNS) {
            return Err(AgeError::Parse(format!(
                "armor line has {} columns, expected {COLUMNS}",
                bad.len()
            )));
        }
        if last.is_empty() || last.len() > COLUMNS {
            return Err(AgeError::Parse("malformed final armor line".into()));
        }
    }

    STANDARD
        .decode(body.concat())
        .map_err(|e| AgeError::Parse(format!("invalid armor base64: {e}")))
}

/// Streams armored output. [`ArmoredWriter::finish`] writes the padding and end marker.
pub struct ArmoredWriter<W: Write> {
    inner: W,
    pending: Vec<u8>,
    started: bool,
}

impl<W: Write> ArmoredWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            pending: Vec::with_capacity(BYTES_PER_LINE),
            started: false,
        }
    }

    fn start(&mut self) -> io::Result<()> {
        if !self.started {
            self.inner.write_all(BEGIN_MARKER.as_bytes())?;
            self.inner.write_all(b"\n")?;
            self.started = true;
        }
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.start()?;
        if !self.pending.is_empty() {
            let line = STANDARD.encode(&self.pending);
            self.inner.write_all(line.as_bytes())?;
            self.inner.write_all(b"\n")?;
        }
        self.inner.write_all(END_MARKER.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ArmoredWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.start()?;
        let mut rest = data;
        while !rest.is_empty() {
            // Keep the final (possibly partial) line buffered until finish.
            if self.pending.len() == BYTES_PER_LINE {
                let line = STANDARD.encode(&self.pending);
                self.inner.write_all(line.as_bytes())?;
                self.inner.write_all(b"\n")?;
                self.pending.clear();
            }
            let take = (BYTES_PER_LINE - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
