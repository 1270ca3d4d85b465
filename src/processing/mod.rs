//! In-memory table transformations.
//!
//! The processing layer operates on [`crate::types::Table`] values produced by ingestion.
//! It is purely in-memory and never mutates its inputs.
//!
//! Currently implemented:
//!
//! - [`merge()`]: relational join against a reference table ([`ReferenceIndex`] for repeated
//!   joins against many chunks)
//! - [`aggregate()`]: group-by with per-column [`ColumnPolicy`]s
//! - [`numeric`]: the decimal parsing rule used by range aggregation
//!
//! ## Example: merge → aggregate
//!
//! ```rust
//! use tabmerge::processing::{aggregate, merge, AggregationOptions, ColumnPolicy, JoinKind};
//! use tabmerge::types::{Schema, Table};
//!
//! fn t(cols: &[&str], rows: &[&[&str]]) -> Table {
//!     Table::new(
//!         Schema::new(cols.iter().map(|c| c.to_string()).collect()),
//!         rows.iter().map(|r| r.iter().map(|v| v.to_string()).collect()).collect(),
//!     )
//! }
//!
//! let orders = t(&["sku", "qty"], &[&["A", "2"], &["B", "10"], &["A", "7,5"]]);
//! let products = t(&["sku", "group"], &[&["A", "fruit"], &["B", "fruit"]]);
//!
//! let keys = vec!["sku".to_string()];
//! let merged = merge(&orders, &products, &keys, &keys, JoinKind::Left).unwrap();
//!
//! let opts = AggregationOptions {
//!     group_keys: vec!["group".to_string()],
//!     policies: [("qty".to_string(), ColumnPolicy::MinMaxRange)].into_iter().collect(),
//!     output_columns: Some(vec!["group".to_string(), "qty".to_string()]),
//!     ..Default::default()
//! };
//! let out = aggregate(&merged, &opts).unwrap();
//! assert_eq!(out.rows, vec![vec!["fruit".to_string(), "2 - 10".to_string()]]);
//! ```

pub mod aggregate;
pub mod merge;
pub mod numeric;

pub use aggregate::{
    aggregate, aggregate_with_report, AggregationOptions, AggregationReport, ColumnPolicy, ConcatOrder,
    ConcatSeparator, ConcatStyle, TERMINATOR,
};
pub use merge::{merge, JoinKind, MergeOptions, ReferenceIndex};
pub use numeric::parse_decimal;
