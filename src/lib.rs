//! `tabmerge` ingests delimited text or spreadsheets of unknown encoding and delimiter,
//! optionally joins them against a reference table, groups and aggregates the result, and
//! writes it back out as delimited text in a chosen delimiter and encoding.
//!
//! The primary entrypoint is [`pipeline::run_pipeline`], driven by one immutable
//! [`pipeline::PipelineConfig`] (which can be loaded from JSON).
//!
//! ## What you can ingest
//!
//! **Source kinds (inferred from the filename extension):**
//!
//! - **Delimited text**: `.csv`, `.tsv`, `.txt`, `.tab` (and anything unrecognised)
//! - **Spreadsheets** (requires the Cargo feature `excel`): `.xlsx`, `.xls`, `.xlsm`, `.xlsb`, `.ods`
//!
//! **Delimited text detection:**
//!
//! - encoding: UTF-8, UTF-8 with BOM, Windows-1252, then Latin-1 (which always succeeds)
//! - delimiter: `;`, `,`, tab or `|`, by structural sniffing and then by counting occurrences
//! - parsing walks an ordered ladder of strategies (strict, permissive, forced delimiter,
//!   unquoted) and stops at the first one that yields a plausible table
//!
//! All cell values are text. Numbers are only parsed on demand, by
//! [`processing::ColumnPolicy::MinMaxRange`].
//!
//! ## Quick example: read a source in chunks
//!
//! ```rust
//! use tabmerge::ingestion::{open_source, ReadOptions, SourceInput};
//!
//! # fn main() -> Result<(), tabmerge::PipelineError> {
//! let bytes = "name|city\nZoë|Gent\nJan|Brugge\n".as_bytes();
//! let stream = open_source(&SourceInput::new("people.txt", bytes), &ReadOptions::default())?;
//! assert_eq!(stream.schema().columns, vec!["name", "city"]);
//! let rows: usize = stream.map(|c| c.map(|t| t.row_count())).sum::<Result<usize, _>>()?;
//! assert_eq!(rows, 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: format detection, the chunked reader and spreadsheet reading
//! - [`types`]: schema + in-memory table types
//! - [`processing`]: merge and aggregation
//! - [`export`]: delimited-text serialization
//! - [`pipeline`]: the run driver, configuration, observers and metrics
//! - [`error`]: error types used across the crate
//!
//! ## Pipeline example: merge → aggregate → export
//!
//! ```rust
//! use tabmerge::ingestion::{SourceInput, TextEncoding};
//! use tabmerge::pipeline::{run_pipeline, PipelineConfig, RunContext};
//!
//! # fn main() -> Result<(), tabmerge::PipelineError> {
//! let cfg = PipelineConfig::from_json_str(r#"{
//!     "merge": { "left_keys": ["sku"], "right_keys": ["sku"], "join": "left" },
//!     "aggregation": {
//!         "group_keys": ["family"],
//!         "policies": { "qty": "min_max_range" },
//!         "terminator_columns": ["qty"],
//!         "output_columns": ["family", "qty"]
//!     },
//!     "export": { "delimiter": "comma", "encoding": "utf-8" }
//! }"#)?;
//!
//! let orders = SourceInput::new("orders.csv", b"sku;qty\nA;2\nB;10\nA;7,5\n");
//! let products = SourceInput::new("products.csv", b"sku;family\nA;fruit\nB;fruit\n");
//! let out = run_pipeline(orders, Some(products), &cfg, &RunContext::default())?;
//! assert_eq!(String::from_utf8(out.bytes).unwrap(), "family,qty\nfruit,2 - 10;\n");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod export;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod types;

pub use error::{PipelineError, PipelineResult, Severity};
