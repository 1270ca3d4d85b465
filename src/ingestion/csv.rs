//! Chunked ingestion of delimited text.

use std::borrow::Cow;
use std::io::Cursor;

use csv::ByteRecord;

use super::detect::{detect_format, FormatDetection};
use super::encoding::TextEncoding;
use super::ladder::{build_ladder, unterminated_quote, ParseStrategy, RowVerdict, StrategyAttempt};
use super::unified::ReadOptions;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Schema, Table};

/// Lazy, single-pass sequence of [`Table`] chunks read from delimited text.
///
/// Opening the reader runs the fallback ladder: each strategy is dry-run over the whole
/// source (without keeping rows) and the first accepted one drives the chunk stream.
/// Every chunk has at most `chunk_size` rows and the schema fixed by the header row.
/// Reading again requires opening a new reader.
pub struct ChunkedReader<'a> {
    reader: csv::Reader<Cursor<Cow<'a, [u8]>>>,
    strategy: ParseStrategy,
    detection: FormatDetection,
    attempts: Vec<StrategyAttempt>,
    schema: Schema,
    chunk_size: usize,
    record: ByteRecord,
    rows_read: u64,
    rows_dropped: u64,
    done: bool,
}

impl<'a> ChunkedReader<'a> {
    /// Detect the format of `data`, run the ladder and position the reader after the header.
    ///
    /// Fails with [`PipelineError::IngestionExhausted`] only when every rung was rejected.
    pub fn open(data: &'a [u8], options: &ReadOptions) -> PipelineResult<Self> {
        if options.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig {
                message: "chunk_size must be > 0".to_string(),
            });
        }
        let detection = detect_format(data);
        let ladder = build_ladder(&detection.format, options.delimiter, options.encoding);

        let mut attempts = Vec::with_capacity(ladder.len());
        for requested in ladder {
            let (effective, source) = prepare_source(data, requested);
            let outcome = dry_run(&source, &effective);
            let accepted = outcome.is_ok();
            attempts.push(StrategyAttempt {
                strategy: requested,
                outcome,
            });
            if accepted {
                return Self::start(source, effective, detection, attempts, options.chunk_size);
            }
        }

        Err(PipelineError::IngestionExhausted {
            attempts: attempts.len(),
            last_error: attempts
                .last()
                .and_then(|a| a.outcome.clone().err())
                .unwrap_or_else(|| "no strategies".to_string()),
        })
    }

    fn start(
        source: Cow<'a, [u8]>,
        strategy: ParseStrategy,
        detection: FormatDetection,
        attempts: Vec<StrategyAttempt>,
        chunk_size: usize,
    ) -> PipelineResult<Self> {
        let mut reader = strategy.reader_builder().from_reader(Cursor::new(source));
        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            return Err(PipelineError::SchemaMismatch {
                message: "source has no header row".to_string(),
            });
        }
        let header = strategy.decode_record(&record).ok_or_else(|| PipelineError::SchemaMismatch {
            message: format!("header row is not valid {}", strategy.encoding),
        })?;

        Ok(Self {
            reader,
            strategy,
            detection,
            attempts,
            schema: Schema::from_header_cells(header),
            chunk_size,
            record,
            rows_read: 0,
            rows_dropped: 0,
            done: false,
        })
    }

    /// Schema fixed by the header row.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Format detected before the ladder ran.
    pub fn detection(&self) -> &FormatDetection {
        &self.detection
    }

    /// The accepted strategy as applied to the bytes (non-ASCII-compatible encodings are
    /// transcoded first and then read as UTF-8).
    pub fn strategy(&self) -> &ParseStrategy {
        &self.strategy
    }

    /// Every strategy tried, in order; the last one is the accepted strategy.
    pub fn attempts(&self) -> &[StrategyAttempt] {
        &self.attempts
    }

    /// Data rows emitted so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Malformed rows discarded so far by a permissive strategy.
    pub fn rows_dropped(&self) -> u64 {
        self.rows_dropped
    }

    /// Consume the rest of the stream into one table.
    pub fn read_all(self) -> PipelineResult<Table> {
        let mut table = Table::empty(self.schema.clone());
        for chunk in self {
            table.append(chunk?)?;
        }
        Ok(table)
    }

    fn next_chunk(&mut self) -> PipelineResult<Option<Table>> {
        let width = self.schema.len();
        let mut rows = Vec::with_capacity(self.chunk_size.min(4_096));
        while rows.len() < self.chunk_size {
            if !self.reader.read_byte_record(&mut self.record)? {
                self.done = true;
                break;
            }
            let line = self.record.position().map(|p| p.line()).unwrap_or_default();
            match self.strategy.shape_row(&self.record, width, line) {
                RowVerdict::Keep(row) => rows.push(row),
                RowVerdict::Drop => self.rows_dropped += 1,
                RowVerdict::Reject(reason) => {
                    return Err(PipelineError::SchemaMismatch { message: reason });
                }
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.rows_read += rows.len() as u64;
        Ok(Some(Table::new(self.schema.clone(), rows)))
    }
}

impl Iterator for ChunkedReader<'_> {
    type Item = PipelineResult<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Bytes a strategy actually parses, with the strategy adjusted to those bytes.
///
/// A leading byte-order mark is stripped whatever the encoding. Encodings that are not
/// ASCII-compatible are transcoded to UTF-8 up front, so delimiters and quotes can be found at
/// the byte level.
fn prepare_source(data: &[u8], strategy: ParseStrategy) -> (ParseStrategy, Cow<'_, [u8]>) {
    let body = strategy.encoding.strip_bom(data);
    match strategy.encoding {
        enc if enc.is_ascii_compatible() => (strategy, Cow::Borrowed(body)),
        enc => {
            let effective = ParseStrategy {
                encoding: TextEncoding::Utf8,
                ..strategy
            };
            match enc.decode_strict(body) {
                Some(text) => (effective, Cow::Owned(text.into_owned().into_bytes())),
                // Undecodable: keep the original encoding so the dry run rejects the bytes.
                None => (strategy, Cow::Borrowed(body)),
            }
        }
    }
}

/// Dry run of `strategy` over the whole source; no rows are retained.
fn dry_run(data: &[u8], strategy: &ParseStrategy) -> Result<(), String> {
    if let Some(quote) = strategy.quote {
        if let Some(line) = unterminated_quote(data, strategy.delimiter.as_byte(), quote) {
            return Err(format!("line {line}: quoted field is never closed"));
        }
    }
    let mut reader = strategy.reader_builder().from_reader(data);
    let mut record = ByteRecord::new();
    match reader.read_byte_record(&mut record) {
        Ok(true) => {}
        Ok(false) => return Err("no header row".to_string()),
        Err(e) => return Err(e.to_string()),
    }
    let Some(header) = strategy.decode_record(&record) else {
        return Err(format!("header is not valid {}", strategy.encoding));
    };
    let width = header.len();
    if width < strategy.min_columns {
        return Err(if width == 1 {
            "header has a single column (probable delimiter miss)".to_string()
        } else {
            format!("header has {width} columns, need {}", strategy.min_columns)
        });
    }

    let (mut kept, mut dropped) = (0u64, 0u64);
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(e.to_string()),
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        match strategy.shape_row(&record, width, line) {
            RowVerdict::Keep(_) => kept += 1,
            RowVerdict::Drop => dropped += 1,
            RowVerdict::Reject(reason) => return Err(reason),
        }
    }
    if kept == 0 && dropped > 0 {
        return Err(format!("all {dropped} data rows were malformed"));
    }
    Ok(())
}
