//! Core data model types.
//!
//! Every cell is text. An empty string is the only representation of a missing value, so
//! "absent" and "empty" can never diverge between ingestion, merge, aggregation and export.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Field delimiter of a delimited text source or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `\t`
    Tab,
    /// `|`
    Pipe,
    /// `#`
    Hash,
}

impl Delimiter {
    /// Delimiters considered by detection, in tie-breaking priority order.
    pub const CANDIDATES: [Delimiter; 4] = [
        Delimiter::Semicolon,
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Pipe,
    ];

    /// The delimiter as a single ASCII byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
            Delimiter::Pipe => b'|',
            Delimiter::Hash => b'#',
        }
    }

    /// The delimiter as a `char`.
    pub fn as_char(self) -> char {
        char::from(self.as_byte())
    }

    /// Inverse of [`Delimiter::as_byte`].
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b',' => Some(Delimiter::Comma),
            b';' => Some(Delimiter::Semicolon),
            b'\t' => Some(Delimiter::Tab),
            b'|' => Some(Delimiter::Pipe),
            b'#' => Some(Delimiter::Hash),
            _ => None,
        }
    }
}

/// Ordered list of unique column names describing the shape of a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered column names.
    pub columns: Vec<String>,
}

impl Schema {
    /// Create a schema from column names that are already known to be unique.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Build a schema from raw header cells.
    ///
    /// Empty header cells become `Unnamed: {index}` and repeated names get `.1`, `.2`, ...
    /// suffixes so that every column can still be addressed by name.
    pub fn from_header_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns: Vec<String> = Vec::new();
        for (idx, cell) in cells.into_iter().enumerate() {
            let raw = cell.as_ref();
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {idx}")
            } else {
                raw.to_owned()
            };
            let mut name = base.clone();
            let mut n = 1usize;
            while columns.contains(&name) {
                name = format!("{base}.{n}");
                n += 1;
            }
            columns.push(name);
        }
        Self { columns }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.as_str())
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Resolve several column names to indexes, failing on the first unknown name.
    ///
    /// `context` names the configuration item for the error message (e.g. "group keys").
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S], context: &str) -> PipelineResult<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                self.index_of(n)
                    .ok_or_else(|| PipelineError::unknown_column(n, context))
            })
            .collect()
    }

    /// Fails with [`PipelineError::SchemaMismatch`] unless `other` has exactly the same columns.
    pub fn ensure_matches(&self, other: &Schema) -> PipelineResult<()> {
        if self == other {
            return Ok(());
        }
        Err(PipelineError::SchemaMismatch {
            message: format!(
                "expected columns {:?}, found {:?}",
                self.columns, other.columns
            ),
        })
    }
}

/// In-memory text table: a [`Schema`] plus row-major cells in schema order.
///
/// A chunk of a streamed source, a fully loaded reference table and the output of a merge
/// or an aggregation are all `Table`s.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage. Each row has exactly `schema.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a table from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<String>>) -> Self {
        Self { schema, rows }
    }

    /// Create an empty table with the given schema.
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Value of `column` in row `row`; absent cells read as the empty string.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.schema.index_of(column)?;
        let row = self.rows.get(row)?;
        Some(row.get(idx).map(|s| s.as_str()).unwrap_or(""))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Option<Vec<&str>> {
        let idx = self.schema.index_of(column)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).map(|s| s.as_str()).unwrap_or(""))
                .collect(),
        )
    }

    /// Append the rows of `other`, which must share this table's schema.
    pub fn append(&mut self, mut other: Table) -> PipelineResult<()> {
        self.schema.ensure_matches(&other.schema)?;
        self.rows.append(&mut other.rows);
        Ok(())
    }

    /// Copy of the first `limit` rows.
    pub fn head(&self, limit: usize) -> Table {
        Table {
            schema: self.schema.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }
}
