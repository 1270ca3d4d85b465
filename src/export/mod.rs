//! Serialization of tables to delimited text in a chosen delimiter and encoding.
//!
//! Export never fails because of a character the target encoding cannot represent: such
//! characters are written as `?` and counted in [`ExportOutput::replaced_chars`].

use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;
use crate::ingestion::TextEncoding;
use crate::types::{Delimiter, Schema, Table};

/// Output delimiter and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Field delimiter.
    pub delimiter: Delimiter,
    /// Output encoding.
    pub encoding: TextEncoding,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Semicolon,
            encoding: TextEncoding::Utf8Bom,
        }
    }
}

/// Final bytes of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    /// Encoded output, header first.
    pub bytes: Vec<u8>,
    /// Data rows written (header excluded).
    pub rows: usize,
    /// Characters replaced because the encoding cannot represent them.
    pub replaced_chars: usize,
}

/// Incremental writer: the header is written once, then tables are appended in call order.
#[derive(Debug)]
pub struct DelimitedWriter {
    options: ExportOptions,
    out: Vec<u8>,
    header_written: bool,
    rows: usize,
    replaced_chars: usize,
}

impl DelimitedWriter {
    /// Create a writer; a UTF-8 BOM is emitted immediately when the encoding asks for one.
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            out: options.encoding.bom().to_vec(),
            header_written: false,
            rows: 0,
            replaced_chars: 0,
        }
    }

    /// Write the header row unless it has been written already.
    pub fn write_header(&mut self, schema: &Schema) -> PipelineResult<()> {
        if self.header_written {
            return Ok(());
        }
        self.header_written = true;
        self.write_records(std::iter::once(&schema.columns))
    }

    /// Append all rows of `table`, writing its header first if needed.
    pub fn write_table(&mut self, table: &Table) -> PipelineResult<()> {
        self.write_header(&table.schema)?;
        self.write_records(table.rows.iter())?;
        self.rows += table.row_count();
        Ok(())
    }

    /// Data rows written so far.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Characters replaced so far.
    pub fn replaced_chars(&self) -> usize {
        self.replaced_chars
    }

    /// Finish and return the encoded bytes.
    pub fn finish(self) -> ExportOutput {
        ExportOutput {
            bytes: self.out,
            rows: self.rows,
            replaced_chars: self.replaced_chars,
        }
    }

    fn write_records<'a, I>(&mut self, records: I) -> PipelineResult<()>
    where
        I: Iterator<Item = &'a Vec<String>>,
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(self.options.delimiter.as_byte())
            .from_writer(Vec::new());
        for record in records {
            wtr.write_record(record)?;
        }
        let buf = wtr.into_inner().map_err(|e| e.into_error())?;
        let text = String::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let (bytes, replaced) = self.options.encoding.encode_lossy(&text);
        self.out.extend_from_slice(&bytes);
        self.replaced_chars += replaced;
        Ok(())
    }
}

/// Serialize a whole table in one call.
pub fn serialize(table: &Table, options: &ExportOptions) -> PipelineResult<ExportOutput> {
    let mut writer = DelimitedWriter::new(*options);
    writer.write_table(table)?;
    Ok(writer.finish())
}
