//! Text encodings supported for input decoding and output encoding.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{EncoderResult, Encoding, UTF_16BE, UTF_16LE, WINDOWS_1252};
use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const UTF16LE_BOM: &[u8] = b"\xFF\xFE";
const UTF16BE_BOM: &[u8] = b"\xFE\xFF";

/// Byte values that have no assigned character in Windows-1252.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Placeholder written for characters the target encoding cannot represent.
pub const REPLACEMENT_BYTE: u8 = b'?';

/// A text encoding.
///
/// The four named variants form the detection fallback list. Any other WHATWG label can be
/// used through [`TextEncoding::from_label`], which yields [`TextEncoding::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    /// UTF-8 without byte-order mark.
    Utf8,
    /// UTF-8 with a leading byte-order mark (stripped on decode, written on encode).
    Utf8Bom,
    /// Windows-1252, rejecting the five unassigned byte values.
    Windows1252,
    /// ISO-8859-1. Every byte sequence decodes, so this is the terminal fallback.
    Latin1,
    /// Any other encoding known to `encoding_rs`.
    Other(&'static Encoding),
}

/// Encodings tried, in order, when the input encoding is unknown.
pub const FALLBACK_ENCODINGS: [TextEncoding; 4] = [
    TextEncoding::Utf8,
    TextEncoding::Utf8Bom,
    TextEncoding::Windows1252,
    TextEncoding::Latin1,
];

impl TextEncoding {
    /// Parse an encoding label (case-insensitive), e.g. `utf-8`, `utf-8-sig`, `cp1252`,
    /// `latin-1`, `shift_jis`, `utf-16le`.
    ///
    /// Labels that `encoding_rs` maps to an encoding it cannot write (the `replacement`
    /// encoding) are not accepted.
    pub fn from_label(label: &str) -> Option<Self> {
        let norm = label.trim().to_ascii_lowercase().replace('_', "-");
        match norm.as_str() {
            "utf-8" | "utf8" => return Some(Self::Utf8),
            "utf-8-sig" | "utf8-sig" | "utf-8-bom" => return Some(Self::Utf8Bom),
            "windows-1252" | "cp1252" => return Some(Self::Windows1252),
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" => return Some(Self::Latin1),
            _ => {}
        }
        let enc = Encoding::for_label(label.trim().as_bytes())?;
        if enc.output_encoding() != enc && !is_utf16(enc) {
            return None;
        }
        if enc == encoding_rs::UTF_8 {
            Some(Self::Utf8)
        } else if enc == WINDOWS_1252 {
            Some(Self::Windows1252)
        } else {
            Some(Self::Other(enc))
        }
    }

    /// Canonical label of this encoding.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Bom => "utf-8-sig",
            Self::Windows1252 => "windows-1252",
            Self::Latin1 => "latin-1",
            Self::Other(enc) => enc.name(),
        }
    }

    /// Returns `true` if ASCII bytes (and therefore every supported delimiter and quote) keep
    /// their meaning in this encoding, so records can be split before decoding.
    pub fn is_ascii_compatible(&self) -> bool {
        match self {
            Self::Other(enc) => enc.is_ascii_compatible(),
            _ => true,
        }
    }

    /// Decode `bytes` without any replacement; `None` if any byte sequence is invalid.
    pub fn decode_strict<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Utf8Bom => std::str::from_utf8(strip_utf8_bom(bytes)).ok().map(Cow::Borrowed),
            Self::Windows1252 => {
                if bytes.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
                    return None;
                }
                Some(WINDOWS_1252.decode_without_bom_handling(bytes).0)
            }
            Self::Latin1 => Some(decode_latin1(bytes)),
            Self::Other(enc) => enc.decode_without_bom_handling_and_without_replacement(bytes),
        }
    }

    /// Decode `bytes`, substituting U+FFFD for invalid sequences.
    pub fn decode_lossy<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes),
            Self::Utf8Bom => String::from_utf8_lossy(strip_utf8_bom(bytes)),
            Self::Windows1252 => WINDOWS_1252.decode_without_bom_handling(bytes).0,
            Self::Latin1 => decode_latin1(bytes),
            Self::Other(enc) => enc.decode_without_bom_handling(bytes).0,
        }
    }

    /// Encode `text`, writing [`REPLACEMENT_BYTE`] for every unrepresentable character.
    ///
    /// Returns the encoded bytes and the number of replaced characters. A BOM is not
    /// written here; see [`TextEncoding::bom`].
    pub fn encode_lossy(&self, text: &str) -> (Vec<u8>, usize) {
        match self {
            Self::Utf8 | Self::Utf8Bom => (text.as_bytes().to_vec(), 0),
            Self::Latin1 => {
                let mut out = Vec::with_capacity(text.len());
                let mut replaced = 0usize;
                for c in text.chars() {
                    match u8::try_from(u32::from(c)) {
                        Ok(b) => out.push(b),
                        Err(_) => {
                            out.push(REPLACEMENT_BYTE);
                            replaced += 1;
                        }
                    }
                }
                (out, replaced)
            }
            Self::Windows1252 => encode_with(WINDOWS_1252, text),
            Self::Other(enc) if *enc == UTF_16LE => (text.encode_utf16().flat_map(u16::to_le_bytes).collect(), 0),
            Self::Other(enc) if *enc == UTF_16BE => (text.encode_utf16().flat_map(u16::to_be_bytes).collect(), 0),
            Self::Other(enc) => encode_with(enc, text),
        }
    }

    /// `bytes` without a leading byte-order mark of this encoding or of UTF-8.
    pub fn strip_bom<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        let bom = match self {
            Self::Other(enc) if *enc == UTF_16LE => UTF16LE_BOM,
            Self::Other(enc) if *enc == UTF_16BE => UTF16BE_BOM,
            _ => UTF8_BOM,
        };
        bytes.strip_prefix(bom).unwrap_or(bytes)
    }

    /// Byte-order mark written once at the start of an output stream.
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Self::Utf8Bom => UTF8_BOM,
            _ => &[],
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_label(&value).ok_or_else(|| format!("unknown text encoding '{value}'"))
    }
}

impl From<TextEncoding> for String {
    fn from(value: TextEncoding) -> Self {
        value.label().to_string()
    }
}

/// Returns `true` if `bytes` starts with a UTF-8 byte-order mark.
pub fn has_utf8_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(UTF8_BOM)
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn is_utf16(enc: &'static Encoding) -> bool {
    enc == UTF_16LE || enc == UTF_16BE
}

fn decode_latin1(bytes: &[u8]) -> Cow<'_, str> {
    if bytes.is_ascii() {
        // ASCII is valid UTF-8 and maps 1:1.
        return Cow::Borrowed(std::str::from_utf8(bytes).unwrap_or_default());
    }
    Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
}

fn encode_with(encoding: &'static Encoding, text: &str) -> (Vec<u8>, usize) {
    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len());
    let mut buf = [0u8; 4096];
    let mut src = text;
    let mut replaced = 0usize;
    loop {
        let (result, read, written) = encoder.encode_from_utf8_without_replacement(src, &mut buf, true);
        out.extend_from_slice(&buf[..written]);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => {}
            EncoderResult::Unmappable(_) => {
                out.push(REPLACEMENT_BYTE);
                replaced += 1;
            }
        }
    }
    (out, replaced)
}
