//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`open_source`] (from [`unified`]) which:
//!
//! - infers the source kind from the filename (or you can override via [`ReadOptions`])
//! - detects encoding, delimiter and quote character of delimited text ([`detect`])
//! - walks the fallback ladder of parsing strategies ([`ladder`]) until one is accepted
//! - streams bounded [`crate::types::Table`] chunks
//!
//! Format-specific pieces are also available under:
//! - [`csv`]
//! - [`encoding`]
//! - `excel` (feature `excel`)

pub mod csv;
pub mod detect;
pub mod encoding;
#[cfg(feature = "excel")]
pub mod excel;
pub mod ladder;
pub mod unified;

pub use csv::ChunkedReader;
pub use detect::{detect_format, detect_format_of_prefix, FormatDescriptor, FormatDetection};
pub use encoding::TextEncoding;
pub use ladder::{ParseStrategy, StrategyAttempt, StrategyKind};
pub use unified::{
    list_sheets, open_source, preview, read_table, ChunkStream, Preview, ReadOptions, SheetSelection, SourceInput,
    SourceKind,
};
