#![cfg(feature = "excel")]

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, ExcelDateTime, Reader};

use super::unified::SheetSelection;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{Schema, Table};

/// Names of all sheets in a workbook, in workbook order.
pub fn list_sheets(bytes: &[u8]) -> PipelineResult<Vec<String>> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    Ok(workbook.sheet_names().to_vec())
}

/// Read one sheet of an Excel document (`.xlsx`, `.xls`, `.ods`, etc.) into a text [`Table`].
///
/// Behavior:
/// - Picks the named sheet if requested; otherwise uses the first sheet in the workbook
/// - Detects the first non-empty row as the header row
/// - Renders every cell as text; empty cells become empty strings and dates become
///   `YYYY-MM-DD HH:MM:SS`
pub fn read_sheet(bytes: &[u8], selection: &SheetSelection) -> PipelineResult<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let sheet = match selection {
        SheetSelection::Named(name) => name.clone(),
        SheetSelection::First => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::SchemaMismatch {
                message: "workbook has no sheets".to_string(),
            })?,
    };

    let range = workbook.worksheet_range(&sheet)?;
    sheet_to_table(&range).map_err(|e| wrap_schema_err_with_sheet(&sheet, e))
}

fn sheet_to_table(range: &calamine::Range<Data>) -> PipelineResult<Table> {
    let mut rows_iter = range
        .rows()
        .skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));

    let header = rows_iter.next().ok_or_else(|| PipelineError::SchemaMismatch {
        message: "sheet has no non-empty rows (no header row found)".to_string(),
    })?;
    let schema = Schema::from_header_cells(header.iter().map(cell_to_string));
    let width = schema.len();

    let rows = rows_iter
        .map(|row| {
            let mut out: Vec<String> = row.iter().take(width).map(cell_to_string).collect();
            out.resize(width, String::new());
            out
        })
        .collect();

    Ok(Table::new(schema, rows))
}

fn wrap_schema_err_with_sheet(sheet: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::SchemaMismatch { message } => PipelineError::SchemaMismatch {
            message: format!("sheet '{sheet}': {message}"),
        },
        other => other,
    }
}

/// Whole-number floats are written without a fractional part, so an id typed as `42` in a
/// spreadsheet joins with `42` from a CSV file.
fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => datetime_to_string(dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

/// Durations and serials outside the calendar keep their numeric form.
fn datetime_to_string(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(value) if dt.is_datetime() => value.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => dt.to_string(),
    }
}
