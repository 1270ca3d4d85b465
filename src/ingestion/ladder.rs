//! The ordered fallback ladder of parsing strategies for delimited text.
//!
//! Each rung is a plain [`ParseStrategy`] value. The reader tries them in order and keeps the
//! first one whose dry run is accepted; every rejection is recorded as a [`StrategyAttempt`].

use std::borrow::Cow;
use std::fmt;

use csv::ByteRecord;

use super::detect::FormatDescriptor;
use super::encoding::{TextEncoding, FALLBACK_ENCODINGS};
use crate::types::Delimiter;

/// Escape character used by the last-resort rung.
pub const FALLBACK_ESCAPE: u8 = b'\\';

/// The kind of a ladder rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Quoted parse; a row with more fields than the header rejects the whole attempt.
    Strict,
    /// Quoted parse; malformed rows are dropped instead of rejecting the attempt.
    Permissive,
    /// Like [`StrategyKind::Permissive`], with a delimiter that was not detected but forced.
    ForcedDelimiter,
    /// No quote handling, backslash escapes, malformed rows dropped.
    Unquoted,
}

impl StrategyKind {
    fn label(self) -> &'static str {
        match self {
            StrategyKind::Strict => "strict",
            StrategyKind::Permissive => "permissive",
            StrategyKind::ForcedDelimiter => "forced-delimiter",
            StrategyKind::Unquoted => "unquoted",
        }
    }
}

/// One rung of the ladder: how to split and decode records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseStrategy {
    /// Rung kind.
    pub kind: StrategyKind,
    /// Encoding used to decode every field.
    pub encoding: TextEncoding,
    /// Field delimiter.
    pub delimiter: Delimiter,
    /// Quote character (`None` for [`StrategyKind::Unquoted`]).
    pub quote: Option<u8>,
    /// Minimum header width for the attempt to be accepted.
    pub min_columns: usize,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(encoding={}, delimiter={:?})",
            self.kind.label(),
            self.encoding,
            self.delimiter.as_char()
        )
    }
}

/// Outcome of trying one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    /// The strategy that was tried.
    pub strategy: ParseStrategy,
    /// `Ok(())` if accepted, otherwise the rejection reason.
    pub outcome: Result<(), String>,
}

/// What to do with one data record.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RowVerdict {
    Keep(Vec<String>),
    Drop,
    Reject(String),
}

impl ParseStrategy {
    pub(crate) fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter.as_byte());
        match self.quote {
            Some(q) => {
                builder.quote(q).quoting(true);
            }
            None => {
                builder.quoting(false);
            }
        }
        builder
    }

    /// Decode every field of `record`; `None` if any field is not valid in the encoding.
    pub(crate) fn decode_record(&self, record: &ByteRecord) -> Option<Vec<String>> {
        self.decode_fields(&self.fields(record))
    }

    fn decode_fields(&self, record: &ByteRecord) -> Option<Vec<String>> {
        record
            .iter()
            .map(|field| self.encoding.decode_strict(field).map(|s| s.into_owned()))
            .collect()
    }

    /// Fields of `record` as this strategy sees them. The unquoted rung resolves
    /// [`FALLBACK_ESCAPE`] sequences here, since the `csv` reader only honours escapes inside
    /// quoted fields.
    fn fields<'r>(&self, record: &'r ByteRecord) -> Cow<'r, ByteRecord> {
        if self.kind == StrategyKind::Unquoted && record.as_slice().contains(&FALLBACK_ESCAPE) {
            Cow::Owned(unescape_record(record, self.delimiter.as_byte()))
        } else {
            Cow::Borrowed(record)
        }
    }

    /// Shape a data record to `width` columns.
    ///
    /// Short rows are padded with empty values. Long rows and undecodable rows reject a strict
    /// attempt and are dropped by every other kind.
    pub(crate) fn shape_row(&self, record: &ByteRecord, width: usize, line: u64) -> RowVerdict {
        let record = self.fields(record);
        let strict = self.kind == StrategyKind::Strict;
        if record.len() > width {
            if strict {
                return RowVerdict::Reject(format!(
                    "line {line}: expected {width} fields, saw {}",
                    record.len()
                ));
            }
            return RowVerdict::Drop;
        }
        match self.decode_fields(&record) {
            Some(mut row) => {
                row.resize(width, String::new());
                RowVerdict::Keep(row)
            }
            None if strict => RowVerdict::Reject(format!("line {line}: not valid {}", self.encoding)),
            None => RowVerdict::Drop,
        }
    }
}

/// An escaped delimiter joins two fields back together; any other escaped byte is kept as is.
/// A trailing escape at the end of the record stays literal.
fn unescape_record(record: &ByteRecord, delimiter: u8) -> ByteRecord {
    let mut out = ByteRecord::new();
    let mut field = Vec::new();
    let last = record.len().saturating_sub(1);
    for (i, raw) in record.iter().enumerate() {
        let mut escaped = false;
        for &b in raw {
            if escaped {
                field.push(b);
                escaped = false;
            } else if b == FALLBACK_ESCAPE {
                escaped = true;
            } else {
                field.push(b);
            }
        }
        if escaped {
            if i < last {
                field.push(delimiter);
                continue;
            }
            field.push(FALLBACK_ESCAPE);
        }
        out.push_field(&field);
        field.clear();
    }
    out
}

/// Line (1-based) of a quoted field that is still open at the end of `data`, if any.
///
/// The `csv` reader silently treats end of input as closing a quoted field, which would fold
/// every following line into one cell. Field starts, doubled quotes and record terminators are
/// tracked the same way the reader tracks them.
pub(crate) fn unterminated_quote(data: &[u8], delimiter: u8, quote: u8) -> Option<u64> {
    #[derive(Clone, Copy)]
    enum State {
        FieldStart,
        Unquoted,
        Quoted,
        QuoteInQuoted,
    }

    let mut state = State::FieldStart;
    let mut line = 1u64;
    let mut opened_at = 0u64;
    for &b in data {
        let boundary = b == delimiter || b == b'\n' || b == b'\r';
        state = match state {
            State::FieldStart if b == quote => {
                opened_at = line;
                State::Quoted
            }
            State::FieldStart | State::Unquoted if boundary => State::FieldStart,
            State::FieldStart | State::Unquoted => State::Unquoted,
            State::Quoted if b == quote => State::QuoteInQuoted,
            State::Quoted => State::Quoted,
            State::QuoteInQuoted if b == quote => State::Quoted,
            State::QuoteInQuoted if boundary => State::FieldStart,
            State::QuoteInQuoted => State::Unquoted,
        };
        if b == b'\n' {
            line += 1;
        }
    }
    matches!(state, State::Quoted).then_some(opened_at)
}

/// Build the ladder for a source.
///
/// Without an explicit delimiter:
/// 1. strict parse with the detected delimiter, for each candidate encoding;
/// 2. permissive parse with the detected delimiter, for each candidate encoding;
/// 3. permissive parse forcing each candidate delimiter, for each candidate encoding;
/// 4. unquoted parse with the detected delimiter, for each candidate encoding.
///
/// With an explicit delimiter the caller's choice is trusted: only strict and permissive rungs
/// with that delimiter are built, and a single column is acceptable.
pub fn build_ladder(
    format: &FormatDescriptor,
    explicit_delimiter: Option<Delimiter>,
    explicit_encoding: Option<TextEncoding>,
) -> Vec<ParseStrategy> {
    let encodings: Vec<TextEncoding> = match explicit_encoding {
        Some(enc) => vec![enc],
        None => {
            let mut v = vec![format.encoding];
            v.extend(FALLBACK_ENCODINGS.iter().copied().filter(|e| *e != format.encoding));
            v
        }
    };
    let quote = format.quote.or(Some(b'"'));
    let rung = |kind, encoding, delimiter, quote, min_columns| ParseStrategy {
        kind,
        encoding,
        delimiter,
        quote,
        min_columns,
    };

    let mut ladder = Vec::new();
    if let Some(delimiter) = explicit_delimiter {
        for kind in [StrategyKind::Strict, StrategyKind::Permissive] {
            for &enc in &encodings {
                ladder.push(rung(kind, enc, delimiter, quote, 1));
            }
        }
        return ladder;
    }

    for kind in [StrategyKind::Strict, StrategyKind::Permissive] {
        for &enc in &encodings {
            ladder.push(rung(kind, enc, format.delimiter, quote, 2));
        }
    }
    for delimiter in Delimiter::CANDIDATES {
        for &enc in &encodings {
            ladder.push(rung(StrategyKind::ForcedDelimiter, enc, delimiter, quote, 2));
        }
    }
    for &enc in &encodings {
        ladder.push(rung(StrategyKind::Unquoted, enc, format.delimiter, None, 1));
    }
    ladder
}
