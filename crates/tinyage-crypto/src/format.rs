//! Textual header wire format
//!
//! ```text
//! age-encryption.org/v1
//! -> <tag> <arg> <arg> ...
//! <base64 body, 64 columns per line, last line shorter than 64 (possibly empty)>
//! --- <base64 HMAC-SHA256 tag>
//! ```
//!
//! Base64 is the standard alphabet without padding. The MAC covers every byte
//! from the version line through the `---` marker, exactly as read, so stanzas
//! this crate cannot interpret stay authenticated.

use std::io::{BufRead, Read};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use tinyage_core::{AgeError, AgeResult};

use crate::MAC_SIZE;

pub const VERSION_LINE: &str = "age-encryption.org/v1";

const STANZA_PREFIX: &str = "-> ";
const FOOTER_MARKER: &str = "---";
const COLUMNS: usize = 64;

/// Longest line accepted while reading a header
const MAX_LINE_LEN: u64 = 4096;

/// Upper bound on the whole header, so a hostile input cannot exhaust memory
const MAX_HEADER_LEN: usize = 1 << 20;

/// A single recipient entry as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
    pub tag: String,
    pub args: Vec<String>,
    pub body: Vec<u8>,
}

impl Stanza {
    pub fn new(tag: impl Into<String>, args: Vec<String>, body: Vec<u8>) -> Self {
        Self {
            tag: tag.into(),
            args,
            body,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(STANZA_PREFIX.as_bytes());
        out.extend_from_slice(self.tag.as_bytes());
        for arg in &self.args {
            out.push(b' ');
            out.extend_from_slice(arg.as_bytes());
        }
        out.push(b'\n');

        let encoded = STANDARD_NO_PAD.encode(&self.body);
        let mut rest = encoded.as_bytes();
        // A full-width line is always followed by another, possibly empty, line.
        loop {
            let take = rest.len().min(COLUMNS);
            out.extend_from_slice(&rest[..take]);
            out.push(b'\n');
            rest = &rest[take..];
            if take < COLUMNS {
                break;
            }
        }
    }
}

/// A parsed header: the stanzas, the exact MAC'd bytes and the received tag.
#[derive(Debug, Clone)]
pub struct Header {
    pub stanzas: Vec<Stanza>,
    mac_input: Vec<u8>,
    mac: [u8; MAC_SIZE],
}

impl Header {
    pub fn mac_input(&self) -> &[u8] {
        &self.mac_input
    }

    pub fn mac(&self) -> &[u8; MAC_SIZE] {
        &self.mac
    }

    /// Total size of the header on the wire, footer line included.
    pub fn encoded_len(&self) -> usize {
        self.mac_input.len() + 1 + 43 + 1
    }
}

/// Serialize the version line, the stanzas and the bare `---` marker.
///
/// This is exactly the input of the header MAC.
pub fn encode_preamble(stanzas: &[Stanza]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(VERSION_LINE.as_bytes());
    out.push(b'\n');
    for stanza in stanzas {
        stanza.write_to(&mut out);
    }
    out.extend_from_slice(FOOTER_MARKER.as_bytes());
    out
}

/// Append ` <base64 mac>\n` to a preamble from [`encode_preamble`].
pub fn encode_footer(preamble: &mut Vec<u8>, mac: &[u8; MAC_SIZE]) {
    preamble.push(b' ');
    preamble.extend_from_slice(STANDARD_NO_PAD.encode(mac).as_bytes());
    preamble.push(b'\n');
}

/// Read a header, leaving `input` positioned at the first payload byte.
pub fn read_header<R: BufRead>(input: &mut R) -> AgeResult<Header> {
    let mut raw = Vec::new();

    let version = next_line(input, &mut raw)?;
    if version != VERSION_LINE {
        return Err(AgeError::Parse(format!(
            "unsupported version line {:?}",
            truncate_for_display(&version)
        )));
    }

    let mut stanzas = Vec::new();
    let mut current: Option<PendingStanza> = None;

    loop {
        let line_start = raw.len();
        let line = next_line(input, &mut raw)?;

        if let Some(rest) = line.strip_prefix(FOOTER_MARKER) {
            if let Some(pending) = current.take() {
                stanzas.push(pending.finish()?);
            }
            let mac = parse_footer(rest)?;
            raw.truncate(line_start + FOOTER_MARKER.len());
            return Ok(Header {
                stanzas,
                mac_input: raw,
                mac,
            });
        }

        if let Some(rest) = line.strip_prefix(STANZA_PREFIX) {
            if let Some(pending) = current.take() {
                stanzas.push(pending.finish()?);
            }
            current = Some(PendingStanza::start(rest)?);
            continue;
        }

        match current.as_mut() {
            Some(pending) => pending.lines.push(line),
            None => {
                return Err(AgeError::Parse(format!(
                    "unexpected header line {:?}",
                    truncate_for_display(&line)
                )))
            }
        }
    }
}

struct PendingStanza {
    tag: String,
    args: Vec<String>,
    lines: Vec<String>,
}

impl PendingStanza {
    fn start(header_line: &str) -> AgeResult<Self> {
        let mut parts = header_line.split(' ');
        let tag = parts.next().unwrap_or_default();
        if tag.is_empty() {
            return Err(AgeError::Parse("stanza without a type".into()));
        }
        let args: Vec<String> = parts.map(str::to_owned).collect();
        for token in std::iter::once(tag).chain(args.iter().map(String::as_str)) {
            if !is_valid_token(token) {
                return Err(AgeError::Parse(format!(
                    "invalid stanza token {:?}",
                    truncate_for_display(token)
                )));
            }
        }
        Ok(Self {
            tag: tag.to_owned(),
            args,
            lines: Vec::new(),
        })
    }

    fn finish(self) -> AgeResult<Stanza> {
        if let Some((last, full)) = self.lines.split_last() {
            if full.iter().any(|l| l.len() != COLUMNS) || last.len() > COLUMNS {
                return Err(AgeError::Parse(format!(
                    "{} stanza body is not wrapped at {COLUMNS} columns",
                    self.tag
                )));
            }
        }
        let joined: String = self.lines.concat();
        let body = decode_b64(&joined)?;
        Ok(Stanza {
            tag: self.tag,
            args: self.args,
            body,
        })
    }
}

fn parse_footer(rest: &str) -> AgeResult<[u8; MAC_SIZE]> {
    let encoded = rest
        .strip_prefix(' ')
        .ok_or_else(|| AgeError::Parse("malformed header footer".into()))?;
    decode_b64(encoded)?
        .try_into()
        .map_err(|_| AgeError::Parse("header MAC must be 32 bytes".into()))
}

/// Strict base64: standard alphabet, no padding, canonical trailing bits.
pub fn decode_b64(encoded: &str) -> AgeResult<Vec<u8>> {
    STANDARD_NO_PAD
        .decode(encoded)
        .map_err(|e| AgeError::Parse(format!("invalid base64: {e}")))
}

pub fn encode_b64(bytes: &[u8]) -> String {
    STANDARD_NO_PAD.encode(bytes)
}

/// Tokens are non-empty runs of printable ASCII without spaces.
fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| (33..=126).contains(&b))
}

/// Read one `\n`-terminated line, appending its raw bytes to `raw`.
fn next_line<R: BufRead>(input: &mut R, raw: &mut Vec<u8>) -> AgeResult<String> {
    let mut buf = Vec::new();
    input.by_ref().take(MAX_LINE_LEN).read_until(b'\n', &mut buf)?;

    match buf.last() {
        Some(b'\n') => {}
        None => return Err(AgeError::Parse("unexpected end of header".into())),
        Some(_) if buf.len() as u64 >= MAX_LINE_LEN => {
            return Err(AgeError::Parse("header line too long".into()))
        }
        Some(_) => return Err(AgeError::Parse("unexpected end of header".into())),
    }
    raw.extend_from_slice(&buf);
    if raw.len() > MAX_HEADER_LEN {
        return Err(AgeError::Parse("header too large".into()));
    }

    buf.pop();
    String::from_utf8(buf).map_err(|_| AgeError::Parse("header is not valid UTF-8".into()))
}

fn truncate_for_display(s: &str) -> String {
    s.chars().take(40).collect()
}
