//! Group-by aggregation with per-column policies.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::numeric::{format_decimal, min_max};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Schema, Table};

/// Suffix appended to values of terminator columns.
pub const TERMINATOR: char = ';';

/// How a non-key column is reduced to one value per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPolicy {
    /// First non-empty value (trailing line breaks trimmed); empty if there is none.
    #[default]
    PassthroughFirst,
    /// Distinct non-empty values, line breaks turned into spaces and trimmed, joined.
    ConcatDedup,
    /// `"{min} - {max}"` over the values that parse as decimal numbers.
    MinMaxRange,
}

/// Order of the surviving values of [`ColumnPolicy::ConcatDedup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatOrder {
    /// Order of first appearance within the group.
    FirstSeen,
    /// Lexicographic order.
    Sorted,
}

/// Separator between the values of [`ColumnPolicy::ConcatDedup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatSeparator {
    /// `|`
    Pipe,
    /// `;`
    Semicolon,
}

impl ConcatSeparator {
    /// The separator text.
    pub fn as_str(self) -> &'static str {
        match self {
            ConcatSeparator::Pipe => "|",
            ConcatSeparator::Semicolon => ";",
        }
    }
}

/// Formatting of concatenated values. It has no default: callers that use
/// [`ColumnPolicy::ConcatDedup`] must choose both order and separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatStyle {
    /// Value order.
    pub order: ConcatOrder,
    /// Value separator.
    pub separator: ConcatSeparator,
}

/// Grouping columns plus the aggregation policy of every other column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationOptions {
    /// Columns whose value combination defines a group.
    pub group_keys: Vec<String>,
    /// Policy per column; unlisted columns use [`ColumnPolicy::PassthroughFirst`].
    /// Entries for group key columns are ignored.
    pub policies: BTreeMap<String, ColumnPolicy>,
    /// Required when any column uses [`ColumnPolicy::ConcatDedup`].
    pub concat: Option<ConcatStyle>,
    /// Columns whose output value gets a [`TERMINATOR`] suffix.
    pub terminator_columns: Vec<String>,
    /// Suffix every output column with [`TERMINATOR`].
    pub terminate_all: bool,
    /// Output column order; defaults to the group keys followed by the remaining columns
    /// in table order.
    pub output_columns: Option<Vec<String>>,
}

/// Result of [`aggregate_with_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationReport {
    /// One row per group, in first-seen order.
    pub table: Table,
    /// Non-empty values that a [`ColumnPolicy::MinMaxRange`] column could not parse.
    pub numeric_values_skipped: usize,
}

/// Group `table` and compute one output row per distinct key tuple.
///
/// # Examples
///
/// ```rust
/// use tabmerge::processing::{aggregate, AggregationOptions, ColumnPolicy, ConcatOrder, ConcatSeparator, ConcatStyle};
/// use tabmerge::types::{Schema, Table};
///
/// let table = Table::new(
///     Schema::new(vec!["id".into(), "val".into()]),
///     vec![
///         vec!["1".into(), "x".into()],
///         vec!["1".into(), "y".into()],
///         vec!["2".into(), "z".into()],
///     ],
/// );
/// let opts = AggregationOptions {
///     group_keys: vec!["id".into()],
///     policies: [("val".to_string(), ColumnPolicy::ConcatDedup)].into_iter().collect(),
///     concat: Some(ConcatStyle { order: ConcatOrder::FirstSeen, separator: ConcatSeparator::Pipe }),
///     ..Default::default()
/// };
/// let out = aggregate(&table, &opts).unwrap();
/// assert_eq!(out.column_values("val").unwrap(), vec!["x|y", "z"]);
/// ```
pub fn aggregate(table: &Table, options: &AggregationOptions) -> PipelineResult<Table> {
    aggregate_with_report(table, options).map(|r| r.table)
}

/// Like [`aggregate`], also reporting how many numeric values were skipped.
pub fn aggregate_with_report(table: &Table, options: &AggregationOptions) -> PipelineResult<AggregationReport> {
    let schema = &table.schema;
    if options.group_keys.is_empty() {
        return Err(PipelineError::InvalidConfig {
            message: "aggregation needs at least one group key".to_string(),
        });
    }
    let key_idx = schema.indices_of(&options.group_keys, "group keys")?;
    for name in options.policies.keys() {
        schema.indices_of(&[name], "aggregation policies")?;
    }
    schema.indices_of(&options.terminator_columns, "terminator columns")?;

    let concat = options.concat;
    let needs_concat = options
        .policies
        .iter()
        .any(|(col, p)| *p == ColumnPolicy::ConcatDedup && !options.group_keys.contains(col));
    if needs_concat && concat.is_none() {
        return Err(PipelineError::InvalidConfig {
            message: "concat_dedup requires an explicit concat order and separator".to_string(),
        });
    }

    let output_names: Vec<String> = match &options.output_columns {
        Some(cols) => cols.clone(),
        None => {
            let mut cols = options.group_keys.clone();
            cols.extend(
                schema
                    .column_names()
                    .filter(|c| !options.group_keys.iter().any(|k| k == c))
                    .map(str::to_owned),
            );
            cols
        }
    };
    let output_idx = schema.indices_of(&output_names, "output columns")?;

    let groups = group_rows(table, &key_idx);

    let mut numeric_values_skipped = 0usize;
    let mut rows = Vec::with_capacity(groups.len());
    for members in &groups {
        let mut out = Vec::with_capacity(output_idx.len());
        for (name, &col) in output_names.iter().zip(output_idx.iter()) {
            let values = members.iter().map(|&r| table.rows[r][col].as_str());
            let mut value = if key_idx.contains(&col) {
                // Every member shares the key value.
                table.rows[members[0]][col].clone()
            } else {
                match options.policies.get(name).copied().unwrap_or_default() {
                    ColumnPolicy::PassthroughFirst => first_value(values),
                    ColumnPolicy::ConcatDedup => match concat {
                        Some(style) => concat_dedup(values, style),
                        None => String::new(),
                    },
                    ColumnPolicy::MinMaxRange => {
                        let (range, skipped) = min_max(values);
                        numeric_values_skipped += skipped;
                        range
                            .map(|(lo, hi)| format!("{} - {}", format_decimal(lo), format_decimal(hi)))
                            .unwrap_or_default()
                    }
                }
            };
            if options.terminate_all || options.terminator_columns.iter().any(|c| c == name) {
                value.push(TERMINATOR);
            }
            out.push(value);
        }
        rows.push(out);
    }

    Ok(AggregationReport {
        table: Table::new(Schema::new(output_names), rows),
        numeric_values_skipped,
    })
}

/// Member row indexes of every group, groups in first-seen order.
fn group_rows(table: &Table, key_idx: &[usize]) -> Vec<Vec<usize>> {
    let mut slots: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        let key: Vec<&str> = key_idx.iter().map(|&i| row[i].as_str()).collect();
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row_idx);
    }
    groups
}

fn first_value<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|v| v.trim_end_matches(['\r', '\n']))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
        .to_owned()
}

fn concat_dedup<'a>(values: impl Iterator<Item = &'a str>, style: ConcatStyle) -> String {
    let cleaned = values
        .map(|v| v.replace("\r\n", " ").replace(['\r', '\n'], " ").trim().to_owned())
        .filter(|v| !v.is_empty());

    let survivors: Vec<String> = match style.order {
        ConcatOrder::FirstSeen => {
            let mut seen = HashSet::new();
            cleaned.filter(|v| seen.insert(v.clone())).collect()
        }
        ConcatOrder::Sorted => cleaned.collect::<BTreeSet<_>>().into_iter().collect(),
    };
    survivors.join(style.separator.as_str())
}
