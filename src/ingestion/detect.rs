//! Encoding, delimiter and quote detection for delimited text.

use std::fmt;

use super::encoding::{has_utf8_bom, TextEncoding, FALLBACK_ENCODINGS};
use crate::types::Delimiter;

/// Number of leading bytes used for delimiter and quote sniffing.
pub const SNIFF_BYTES: usize = 100_000;

/// Maximum number of records inspected by structural sniffing.
const SNIFF_RECORDS: usize = 50;

/// How to parse a delimited text source.
///
/// Computed once per source and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Text encoding of the source.
    pub encoding: TextEncoding,
    /// Field delimiter.
    pub delimiter: Delimiter,
    /// Quote character; `None` disables quote handling.
    pub quote: Option<u8>,
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "encoding={} delimiter={:?} quote={}",
            self.encoding,
            self.delimiter.as_char(),
            self.quote.map(|q| char::from(q).to_string()).unwrap_or_else(|| "none".to_string())
        )
    }
}

/// Result of [`detect_format`]: the best guess plus why it may be unreliable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDetection {
    /// Best-guess descriptor. Always usable.
    pub format: FormatDescriptor,
    /// Set when detection had to fall back to a weaker heuristic.
    pub degraded: Option<String>,
}

/// Detect encoding, delimiter and quote character of a complete source.
///
/// Never fails: the encoding ladder ends in Latin-1 (which decodes anything) and the delimiter
/// ladder ends in raw occurrence counting.
pub fn detect_format(bytes: &[u8]) -> FormatDetection {
    detect(bytes, false)
}

/// Like [`detect_format`], but for a leading prefix of a larger source.
///
/// A multi-byte UTF-8 sequence cut off at the end of the prefix does not disqualify UTF-8,
/// and the possibly incomplete last line is ignored by sniffing.
pub fn detect_format_of_prefix(prefix: &[u8]) -> FormatDetection {
    detect(prefix, true)
}

fn detect(bytes: &[u8], is_prefix: bool) -> FormatDetection {
    let encoding = detect_encoding(bytes, is_prefix);
    let sample_len = bytes.len().min(SNIFF_BYTES);
    let truncated = is_prefix || sample_len < bytes.len();
    let sample = encoding.decode_lossy(&bytes[..sample_len]);
    let sample = if truncated { complete_lines(&sample) } else { &sample[..] };

    match sniff_dialect(sample) {
        Some((delimiter, quote)) => FormatDetection {
            format: FormatDescriptor {
                encoding,
                delimiter,
                quote: Some(quote),
            },
            degraded: None,
        },
        None => {
            let delimiter = count_delimiters(sample);
            FormatDetection {
                format: FormatDescriptor {
                    encoding,
                    delimiter,
                    quote: Some(b'"'),
                },
                degraded: Some(format!(
                    "no consistent dialect found; picked {:?} by occurrence count",
                    delimiter.as_char()
                )),
            }
        }
    }
}

/// First encoding of [`FALLBACK_ENCODINGS`] that decodes `bytes` without error.
pub fn detect_encoding(bytes: &[u8], is_prefix: bool) -> TextEncoding {
    for enc in FALLBACK_ENCODINGS {
        let ok = match enc {
            TextEncoding::Utf8 => !has_utf8_bom(bytes) && utf8_valid(bytes, is_prefix),
            TextEncoding::Utf8Bom => has_utf8_bom(bytes) && utf8_valid(bytes, is_prefix),
            other => other.decode_strict(bytes).is_some(),
        };
        if ok {
            return enc;
        }
    }
    TextEncoding::Latin1
}

fn utf8_valid(bytes: &[u8], is_prefix: bool) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        // `error_len() == None` means the input ended in the middle of a sequence.
        Err(e) => is_prefix && e.error_len().is_none(),
    }
}

fn complete_lines(text: &str) -> &str {
    match text.rfind('\n') {
        Some(pos) => &text[..=pos],
        None => text,
    }
}

/// Structural sniffing: a candidate wins if every sampled record splits into the same number
/// (at least two) of fields. Among winners the widest split wins, ties go to candidate order.
pub fn sniff_dialect(sample: &str) -> Option<(Delimiter, u8)> {
    let mut best: Option<(Delimiter, u8, usize)> = None;
    for delimiter in Delimiter::CANDIDATES {
        let quote = guess_quote(sample, delimiter.as_byte());
        let Some(width) = consistent_width(sample, delimiter.as_byte(), quote) else {
            continue;
        };
        if width < 2 {
            continue;
        }
        if best.map(|(_, _, w)| width > w).unwrap_or(true) {
            best = Some((delimiter, quote, width));
        }
    }
    best.map(|(d, q, _)| (d, q))
}

fn consistent_width(sample: &str, delimiter: u8, quote: u8) -> Option<usize> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quote(quote)
        .from_reader(sample.as_bytes());

    let mut width: Option<usize> = None;
    for record in rdr.byte_records().take(SNIFF_RECORDS) {
        let record = record.ok()?;
        match width {
            None => width = Some(record.len()),
            Some(w) if w == record.len() => {}
            Some(_) => return None,
        }
    }
    width
}

/// `'` is used only when it opens fields more often than `"` does.
fn guess_quote(sample: &str, delimiter: u8) -> u8 {
    let opens = |quote: u8| {
        let bytes = sample.as_bytes();
        bytes
            .iter()
            .enumerate()
            .filter(|&(i, &b)| {
                b == quote && (i == 0 || matches!(bytes[i - 1], b'\n' | b'\r') || bytes[i - 1] == delimiter)
            })
            .count()
    };
    if opens(b'\'') > opens(b'"') { b'\'' } else { b'"' }
}

/// Most frequent candidate in `sample`; ties (including all-zero) go to candidate order.
pub fn count_delimiters(sample: &str) -> Delimiter {
    let mut best = Delimiter::CANDIDATES[0];
    let mut best_count = 0usize;
    for delimiter in Delimiter::CANDIDATES {
        let count = sample.bytes().filter(|&b| b == delimiter.as_byte()).count();
        if count > best_count {
            best = delimiter;
            best_count = count;
        }
    }
    best
}
