//! Relational merge of a primary table against an in-memory reference table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::types::{Schema, Table};

/// Join kinds supported by [`merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Only rows with a match on both sides.
    Inner,
    /// Every primary row; reference columns empty when unmatched.
    #[default]
    Left,
    /// Every reference row; primary columns empty when unmatched.
    Right,
    /// Every row of both sides.
    Outer,
}

/// Key columns and join kind for a merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Key columns of the primary table.
    pub left_keys: Vec<String>,
    /// Key columns of the reference table, paired positionally with `left_keys`.
    pub right_keys: Vec<String>,
    /// Join kind.
    pub join: JoinKind,
}

impl MergeOptions {
    /// `true` when both key lists are non-empty and of equal length.
    ///
    /// When this is `false` a merge is skipped and the primary table passes through unchanged.
    pub fn keys_compatible(&self) -> bool {
        !self.left_keys.is_empty() && self.left_keys.len() == self.right_keys.len()
    }
}

type KeyIndex<'t> = HashMap<Vec<&'t str>, Vec<usize>>;

fn lookup<'m, 'k>(index: &'m KeyIndex<'k>, key: &[&'k str]) -> Option<&'m Vec<usize>> {
    index.get(key)
}

fn build_index<'t>(table: &'t Table, key_idx: &[usize]) -> KeyIndex<'t> {
    let mut index: KeyIndex<'t> = HashMap::new();
    for (row_idx, row) in table.rows.iter().enumerate() {
        index.entry(key_of(row, key_idx)).or_default().push(row_idx);
    }
    index
}

fn key_of<'t>(row: &'t [String], key_idx: &[usize]) -> Vec<&'t str> {
    key_idx
        .iter()
        .map(|&i| row.get(i).map(|s| s.as_str()).unwrap_or(""))
        .collect()
}

/// A reference table indexed by its key columns, built once and joined against many chunks.
///
/// Neither the reference nor any primary table is mutated.
#[derive(Debug)]
pub struct ReferenceIndex<'r> {
    reference: &'r Table,
    options: MergeOptions,
    right_key_idx: Vec<usize>,
    index: KeyIndex<'r>,
}

/// Output column layout of one merge.
struct Layout {
    schema: Schema,
    /// Reference columns copied to the output, in order.
    right_cols: Vec<usize>,
    /// `(primary column, reference column)` pairs for key columns shared by name.
    coalesced: Vec<(usize, usize)>,
    left_key_idx: Vec<usize>,
}

impl<'r> ReferenceIndex<'r> {
    /// Index `reference` by `options.right_keys`.
    ///
    /// Returns `Ok(None)` when the key lists are not compatible (the merge must be skipped).
    pub fn build(reference: &'r Table, options: &MergeOptions) -> PipelineResult<Option<Self>> {
        if !options.keys_compatible() {
            return Ok(None);
        }
        let right_key_idx = reference
            .schema
            .indices_of(&options.right_keys, "reference join keys")?;
        let index = build_index(reference, &right_key_idx);
        Ok(Some(Self {
            reference,
            options: options.clone(),
            right_key_idx,
            index,
        }))
    }

    /// Number of distinct key tuples in the reference table.
    pub fn distinct_keys(&self) -> usize {
        self.index.len()
    }

    /// Schema that [`Self::join`] produces for primary tables of `primary` shape.
    pub fn output_schema(&self, primary: &Schema) -> PipelineResult<Schema> {
        Ok(self.layout(primary)?.schema)
    }

    fn layout(&self, primary: &Schema) -> PipelineResult<Layout> {
        let left_key_idx = primary.indices_of(&self.options.left_keys, "primary join keys")?;
        let right_schema = &self.reference.schema;

        let mut coalesced = Vec::new();
        let mut right_cols = Vec::new();
        for (r_idx, r_name) in right_schema.columns.iter().enumerate() {
            let shared_key = self
                .right_key_idx
                .iter()
                .position(|&k| k == r_idx)
                .filter(|&pos| self.options.left_keys[pos] == *r_name);
            match shared_key {
                Some(pos) => coalesced.push((left_key_idx[pos], r_idx)),
                None => right_cols.push(r_idx),
            }
        }

        let mut names: Vec<String> = primary.columns.clone();
        let mut right_names = Vec::with_capacity(right_cols.len());
        for &r_idx in &right_cols {
            let r_name = &right_schema.columns[r_idx];
            match names.iter().position(|n| n == r_name) {
                Some(l_pos) => {
                    names[l_pos] = format!("{r_name}_x");
                    right_names.push(format!("{r_name}_y"));
                }
                None => right_names.push(r_name.clone()),
            }
        }
        names.extend(right_names);

        Ok(Layout {
            schema: Schema::from_header_cells(names),
            right_cols,
            coalesced,
            left_key_idx,
        })
    }

    /// Join `primary` against the reference table.
    ///
    /// Key tuples match by exact string equality. Row order follows the primary table for
    /// inner/left/outer joins (matches fan out in reference order) and the reference table for
    /// right joins; an outer join appends unmatched reference rows at the end.
    pub fn join(&self, primary: &Table) -> PipelineResult<Table> {
        let layout = self.layout(&primary.schema)?;
        let left_width = primary.schema.len();
        let empty_right = vec![String::new(); layout.right_cols.len()];

        let combine = |left: &[String], right: Option<&[String]>| -> Vec<String> {
            let mut out = Vec::with_capacity(layout.schema.len());
            out.extend_from_slice(left);
            out.resize(left_width, String::new());
            match right {
                Some(r) => out.extend(layout.right_cols.iter().map(|&i| r[i].clone())),
                None => out.extend_from_slice(&empty_right),
            }
            out
        };
        let right_only = |right: &[String]| -> Vec<String> {
            let mut left = vec![String::new(); left_width];
            for &(l, r) in &layout.coalesced {
                left[l] = right[r].clone();
            }
            combine(&left, Some(right))
        };

        let reference = &self.reference.rows;
        let mut rows = Vec::with_capacity(primary.row_count());
        match self.options.join {
            JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
                let mut matched = vec![false; reference.len()];
                for left in &primary.rows {
                    let key = key_of(left, &layout.left_key_idx);
                    match lookup(&self.index, &key) {
                        Some(hits) => {
                            for &r in hits {
                                matched[r] = true;
                                rows.push(combine(left, Some(&reference[r])));
                            }
                        }
                        None if self.options.join != JoinKind::Inner => rows.push(combine(left, None)),
                        None => {}
                    }
                }
                if self.options.join == JoinKind::Outer {
                    for (r, right) in reference.iter().enumerate() {
                        if !matched[r] {
                            rows.push(right_only(right));
                        }
                    }
                }
            }
            JoinKind::Right => {
                let left_index = build_index(primary, &layout.left_key_idx);
                for right in reference {
                    let key = key_of(right, &self.right_key_idx);
                    match lookup(&left_index, &key) {
                        Some(hits) => {
                            for &l in hits {
                                rows.push(combine(&primary.rows[l], Some(right)));
                            }
                        }
                        None => rows.push(right_only(right)),
                    }
                }
            }
        }

        Ok(Table::new(layout.schema, rows))
    }
}

/// Join `primary` against `reference` on positionally paired key columns.
///
/// If the key lists are empty or of different lengths the merge is skipped and a copy of
/// `primary` is returned unchanged.
pub fn merge(
    primary: &Table,
    reference: &Table,
    left_keys: &[String],
    right_keys: &[String],
    join: JoinKind,
) -> PipelineResult<Table> {
    let options = MergeOptions {
        left_keys: left_keys.to_vec(),
        right_keys: right_keys.to_vec(),
        join,
    };
    match ReferenceIndex::build(reference, &options)? {
        Some(index) => index.join(primary),
        None => Ok(primary.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cols: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            Schema::new(cols.iter().map(|c| c.to_string()).collect()),
            rows.iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
        )
    }

    fn keys(k: &[&str]) -> Vec<String> {
        k.iter().map(|s| s.to_string()).collect()
    }

    fn orders() -> Table {
        table(&["id", "qty"], &[&["1", "5"], &["2", "3"], &["1", "7"], &["9", "1"]])
    }

    fn products() -> Table {
        table(&["id", "name"], &[&["1", "apple"], &["2", "pear"], &["3", "plum"]])
    }

    #[test]
    fn left_join_keeps_primary_order_and_coalesces_key() {
        let out = merge(&orders(), &products(), &keys(&["id"]), &keys(&["id"]), JoinKind::Left).unwrap();
        assert_eq!(out.schema.columns, keys(&["id", "qty", "name"]));
        assert_eq!(
            out.column_values("name").unwrap(),
            vec!["apple", "pear", "apple", ""]
        );
    }

    #[test]
    fn inner_join_drops_unmatched() {
        let out = merge(&orders(), &products(), &keys(&["id"]), &keys(&["id"]), JoinKind::Inner).unwrap();
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.column_values("id").unwrap(), vec!["1", "2", "1"]);
    }

    #[test]
    fn right_join_follows_reference_order() {
        let out = merge(&orders(), &products(), &keys(&["id"]), &keys(&["id"]), JoinKind::Right).unwrap();
        assert_eq!(out.column_values("id").unwrap(), vec!["1", "1", "2", "3"]);
        assert_eq!(out.column_values("qty").unwrap(), vec!["5", "7", "3", ""]);
    }

    #[test]
    fn outer_join_appends_unmatched_reference_rows() {
        let out = merge(&orders(), &products(), &keys(&["id"]), &keys(&["id"]), JoinKind::Outer).unwrap();
        assert_eq!(out.row_count(), 5);
        assert_eq!(out.rows[4], keys(&["3", "", "plum"]));
    }

    #[test]
    fn fan_out_on_duplicate_reference_keys() {
        let reference = table(&["k", "v"], &[&["1", "a"], &["1", "b"]]);
        let primary = table(&["k"], &[&["1"], &["2"]]);
        let out = merge(&primary, &reference, &keys(&["k"]), &keys(&["k"]), JoinKind::Left).unwrap();
        assert_eq!(out.column_values("v").unwrap(), vec!["a", "b", ""]);
    }

    #[test]
    fn differently_named_keys_and_overlapping_columns() {
        let primary = table(&["pid", "name"], &[&["1", "left"]]);
        let reference = table(&["id", "name"], &[&["1", "right"], &["2", "other"]]);
        let out = merge(&primary, &reference, &keys(&["pid"]), &keys(&["id"]), JoinKind::Outer).unwrap();
        assert_eq!(out.schema.columns, keys(&["pid", "name_x", "id", "name_y"]));
        assert_eq!(out.rows[0], keys(&["1", "left", "1", "right"]));
        assert_eq!(out.rows[1], keys(&["", "", "2", "other"]));
    }

    #[test]
    fn keys_match_exactly_without_normalization() {
        let primary = table(&["k"], &[&["01"], &["1 "], &["1"]]);
        let reference = table(&["k", "v"], &[&["1", "hit"]]);
        let out = merge(&primary, &reference, &keys(&["k"]), &keys(&["k"]), JoinKind::Left).unwrap();
        assert_eq!(out.column_values("v").unwrap(), vec!["", "", "hit"]);
    }

    #[test]
    fn arity_mismatch_passes_primary_through() {
        let out = merge(&orders(), &products(), &keys(&["id", "qty"]), &keys(&["id"]), JoinKind::Inner).unwrap();
        assert_eq!(out, orders());
        let out = merge(&orders(), &products(), &[], &[], JoinKind::Inner).unwrap();
        assert_eq!(out, orders());
    }

    #[test]
    fn unknown_key_column_is_an_error() {
        let err = merge(&orders(), &products(), &keys(&["nope"]), &keys(&["id"]), JoinKind::Left).unwrap_err();
        assert!(err.to_string().contains("unknown column 'nope'"));
    }

    #[test]
    fn multi_column_keys() {
        let primary = table(&["a", "b"], &[&["1", "x"], &["1", "y"]]);
        let reference = table(&["a", "b", "v"], &[&["1", "y", "hit"]]);
        let out = merge(&primary, &reference, &keys(&["a", "b"]), &keys(&["a", "b"]), JoinKind::Inner).unwrap();
        assert_eq!(out.rows, vec![keys(&["1", "y", "hit"])]);
    }
}
