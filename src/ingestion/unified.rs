//! Unified ingestion entrypoint.
//!
//! Most callers should use [`open_source`], which turns raw bytes plus a filename hint into a
//! [`ChunkStream`]:
//!
//! - If [`ReadOptions::kind`] is `None`, the source kind is inferred from the file extension.
//! - Delimited text streams as bounded chunks through [`ChunkedReader`].
//! - A spreadsheet is read as a single chunk holding the whole sheet.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::csv::ChunkedReader;
use super::detect::{FormatDescriptor, FormatDetection, SNIFF_BYTES};
use super::encoding::TextEncoding;
use super::ladder::StrategyAttempt;
use crate::error::PipelineResult;
use crate::types::{Delimiter, Schema, Table};

/// Default number of rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 200_000;

/// Default number of rows returned by [`preview`].
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Supported source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Delimited text (CSV, TSV, ...).
    Delimited,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Spreadsheet,
}

impl SourceKind {
    /// Parse a source kind from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" | "tab" => Some(Self::Delimited),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    /// Infer the kind from a filename; anything unrecognised is treated as delimited text.
    pub fn infer(filename: &str) -> Self {
        filename
            .rsplit_once('.')
            .and_then(|(_, ext)| Self::from_extension(ext))
            .unwrap_or(Self::Delimited)
    }
}

/// Which sheet to read from a workbook.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetSelection {
    /// Read the first sheet (default).
    #[default]
    First,
    /// Read a single named sheet.
    Named(String),
}

/// Options controlling how one source is read.
///
/// Use [`Default`] for common cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// If `None`, infer the kind from the filename extension.
    pub kind: Option<SourceKind>,
    /// Maximum rows per chunk for delimited text.
    pub chunk_size: usize,
    /// Skip delimiter detection and use this delimiter.
    pub delimiter: Option<Delimiter>,
    /// Skip encoding detection and use this encoding.
    pub encoding: Option<TextEncoding>,
    /// Spreadsheet-specific options.
    pub sheet: SheetSelection,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            kind: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: None,
            encoding: None,
            sheet: SheetSelection::default(),
        }
    }
}

/// Raw bytes of one input plus the filename used as a kind hint.
#[derive(Clone)]
pub struct SourceInput<'a> {
    /// Filename or path, only used for its extension.
    pub filename: &'a str,
    /// Entire source content.
    pub bytes: &'a [u8],
}

impl fmt::Debug for SourceInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceInput")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl<'a> SourceInput<'a> {
    /// Create a source from a filename hint and its content.
    pub fn new(filename: &'a str, bytes: &'a [u8]) -> Self {
        Self { filename, bytes }
    }

    /// The effective kind under `options`.
    pub fn kind(&self, options: &ReadOptions) -> SourceKind {
        options.kind.unwrap_or_else(|| SourceKind::infer(self.filename))
    }
}

/// A finite, non-restartable stream of chunks from one source.
pub enum ChunkStream<'a> {
    /// Delimited text read chunk by chunk.
    Delimited(ChunkedReader<'a>),
    /// A spreadsheet; yields its whole sheet once.
    Sheet {
        /// Schema of the sheet.
        schema: Schema,
        /// The sheet, until it has been yielded.
        table: Option<Table>,
    },
}

impl ChunkStream<'_> {
    /// Schema shared by every chunk of the stream.
    pub fn schema(&self) -> &Schema {
        match self {
            ChunkStream::Delimited(r) => r.schema(),
            ChunkStream::Sheet { schema, .. } => schema,
        }
    }

    /// Detection result for delimited text; `None` for spreadsheets.
    pub fn detection(&self) -> Option<&FormatDetection> {
        match self {
            ChunkStream::Delimited(r) => Some(r.detection()),
            ChunkStream::Sheet { .. } => None,
        }
    }

    /// Parsing strategies tried before the stream started (empty for spreadsheets).
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            ChunkStream::Delimited(r) => r.attempts(),
            ChunkStream::Sheet { .. } => &[],
        }
    }

    /// Rows discarded as malformed so far.
    pub fn rows_dropped(&self) -> u64 {
        match self {
            ChunkStream::Delimited(r) => r.rows_dropped(),
            ChunkStream::Sheet { .. } => 0,
        }
    }
}

impl Iterator for ChunkStream<'_> {
    type Item = PipelineResult<Table>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ChunkStream::Delimited(r) => r.next(),
            ChunkStream::Sheet { table, .. } => table.take().filter(|t| t.row_count() > 0).map(Ok),
        }
    }
}

/// Open a source as a chunk stream.
///
/// # Examples
///
/// ```rust
/// use tabmerge::ingestion::{open_source, ReadOptions, SourceInput};
///
/// # fn main() -> Result<(), tabmerge::PipelineError> {
/// let data = b"id;val\n1;x\n1;y\n2;z\n";
/// let opts = ReadOptions { chunk_size: 2, ..Default::default() };
/// let stream = open_source(&SourceInput::new("data.csv", data), &opts)?;
/// let sizes: Vec<usize> = stream.map(|c| c.map(|t| t.row_count())).collect::<Result<_, _>>()?;
/// assert_eq!(sizes, vec![2, 1]);
/// # Ok(())
/// # }
/// ```
pub fn open_source<'a>(source: &SourceInput<'a>, options: &ReadOptions) -> PipelineResult<ChunkStream<'a>> {
    match source.kind(options) {
        SourceKind::Delimited => Ok(ChunkStream::Delimited(ChunkedReader::open(source.bytes, options)?)),
        SourceKind::Spreadsheet => {
            let table = read_sheet_dispatch(source.bytes, &options.sheet)?;
            Ok(ChunkStream::Sheet {
                schema: table.schema.clone(),
                table: Some(table),
            })
        }
    }
}

/// Read a whole source into memory (e.g. a reference table).
pub fn read_table(source: &SourceInput<'_>, options: &ReadOptions) -> PipelineResult<Table> {
    let stream = open_source(source, options)?;
    let mut table = Table::empty(stream.schema().clone());
    for chunk in stream {
        table.append(chunk?)?;
    }
    Ok(table)
}

/// First rows of a source plus, for delimited text, the detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Detected format (delimited text only).
    pub format: Option<FormatDescriptor>,
    /// At most `limit` rows.
    pub table: Table,
}

/// Read at most `limit` rows for display.
///
/// Delimited text is parsed from a bounded leading prefix cut at its last line break, so
/// previewing a large file costs about the same as previewing a small one. The reported format
/// is detected over the whole source, as a full run would detect it, and its encoding is used
/// to decode the prefix.
pub fn preview(source: &SourceInput<'_>, options: &ReadOptions, limit: usize) -> PipelineResult<Preview> {
    match source.kind(options) {
        SourceKind::Delimited => {
            let format = super::detect::detect_format(source.bytes).format;
            let prefix = bounded_prefix(source.bytes, SNIFF_BYTES);
            let opts = ReadOptions {
                chunk_size: limit.max(1),
                encoding: options.encoding.or(Some(format.encoding)),
                ..options.clone()
            };
            let mut reader = ChunkedReader::open(prefix, &opts)?;
            let table = match reader.next() {
                Some(chunk) => chunk?.head(limit),
                None => Table::empty(reader.schema().clone()),
            };
            Ok(Preview {
                format: Some(format),
                table,
            })
        }
        SourceKind::Spreadsheet => Ok(Preview {
            format: None,
            table: read_sheet_dispatch(source.bytes, &options.sheet)?.head(limit),
        }),
    }
}

/// Sheet names of a workbook source.
pub fn list_sheets(source: &SourceInput<'_>) -> PipelineResult<Vec<String>> {
    #[cfg(feature = "excel")]
    {
        super::excel::list_sheets(source.bytes)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = source;
        Err(excel_disabled())
    }
}

fn bounded_prefix(bytes: &[u8], max: usize) -> &[u8] {
    if bytes.len() <= max {
        return bytes;
    }
    let head = &bytes[..max];
    match head.iter().rposition(|&b| b == b'\n') {
        Some(pos) => &head[..=pos],
        None => head,
    }
}

fn read_sheet_dispatch(bytes: &[u8], sel: &SheetSelection) -> PipelineResult<Table> {
    #[cfg(feature = "excel")]
    {
        super::excel::read_sheet(bytes, sel)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = (bytes, sel);
        Err(excel_disabled())
    }
}

#[cfg(not(feature = "excel"))]
fn excel_disabled() -> crate::error::PipelineError {
    crate::error::PipelineError::InvalidConfig {
        message: "excel ingestion not enabled (enable cargo feature 'excel')".to_string(),
    }
}
