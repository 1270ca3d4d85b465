#![cfg(feature = "excel_test_writer")]

use tabmerge::ingestion::{list_sheets, open_source, preview, ReadOptions, SheetSelection, SourceInput, TextEncoding};
use tabmerge::pipeline::{run_pipeline, PipelineConfig, RunContext};
use tabmerge::processing::{JoinKind, MergeOptions};
use tabmerge::types::Delimiter;

fn products_workbook() -> Vec<u8> {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();

    // Sheet1: numeric codes, a blank leading row and an empty cell
    let ws1 = wb.add_worksheet();
    ws1.set_name("Products").unwrap();
    ws1.write_string(1, 0, "code").unwrap();
    ws1.write_string(1, 1, "label").unwrap();
    ws1.write_string(1, 2, "weight").unwrap();
    ws1.write_number(2, 0, 42).unwrap();
    ws1.write_string(2, 1, "Apple").unwrap();
    ws1.write_number(2, 2, 0.25).unwrap();
    ws1.write_number(3, 0, 7).unwrap();
    ws1.write_string(3, 1, "Pear").unwrap();

    // Sheet2: a single row
    let ws2 = wb.add_worksheet();
    ws2.set_name("Suppliers").unwrap();
    ws2.write_string(0, 0, "name").unwrap();
    ws2.write_string(0, 1, "active").unwrap();
    ws2.write_string(1, 0, "Acme").unwrap();
    ws2.write_boolean(1, 1, true).unwrap();

    wb.save_to_buffer().unwrap()
}

#[test]
fn lists_sheets_in_workbook_order() {
    let bytes = products_workbook();
    let sheets = list_sheets(&SourceInput::new("p.xlsx", &bytes)).unwrap();
    assert_eq!(sheets, vec!["Products", "Suppliers"]);
}

#[test]
fn first_sheet_is_one_chunk_of_text() {
    let bytes = products_workbook();
    let mut stream = open_source(&SourceInput::new("p.xlsx", &bytes), &ReadOptions::default()).unwrap();
    assert!(stream.detection().is_none());
    assert_eq!(stream.schema().columns, vec!["code", "label", "weight"]);

    let chunk = stream.next().unwrap().unwrap();
    assert!(stream.next().is_none());
    assert_eq!(chunk.rows[0], vec!["42", "Apple", "0.25"]);
    assert_eq!(chunk.rows[1], vec!["7", "Pear", ""]);
}

#[test]
fn named_sheet_is_selected() {
    let bytes = products_workbook();
    let opts = ReadOptions {
        sheet: SheetSelection::Named("Suppliers".to_string()),
        ..Default::default()
    };
    let p = preview(&SourceInput::new("p.xlsx", &bytes), &opts, 20).unwrap();
    assert!(p.format.is_none());
    assert_eq!(p.table.rows, vec![vec!["Acme", "true"]]);
}

#[test]
fn missing_sheet_is_an_error() {
    let bytes = products_workbook();
    let opts = ReadOptions {
        sheet: SheetSelection::Named("Nope".to_string()),
        ..Default::default()
    };
    assert!(open_source(&SourceInput::new("p.xlsx", &bytes), &opts).is_err());
}

#[test]
fn csv_joins_against_spreadsheet_reference() {
    let bytes = products_workbook();
    let cfg = PipelineConfig {
        merge: MergeOptions {
            left_keys: vec!["product".into()],
            right_keys: vec!["code".into()],
            join: JoinKind::Inner,
        },
        export: tabmerge::export::ExportOptions {
            delimiter: Delimiter::Tab,
            encoding: TextEncoding::Utf8,
        },
        ..Default::default()
    };
    let main = SourceInput::new("orders.csv", b"order;product\n1;42\n2;99\n3;7\n");
    let out = run_pipeline(main, Some(SourceInput::new("p.xlsx", &bytes)), &cfg, &RunContext::default()).unwrap();
    assert_eq!(
        String::from_utf8(out.bytes).unwrap(),
        "order\tproduct\tcode\tlabel\tweight\n1\t42\t42\tApple\t0.25\n3\t7\t7\tPear\t\n"
    );
}

#[test]
fn date_cells_are_rendered_as_calendar_text() {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let stamp_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
    ws.write_string(0, 0, "day").unwrap();
    ws.write_string(0, 1, "stamp").unwrap();
    ws.write_datetime_with_format(1, 0, &ExcelDateTime::from_ymd(2024, 3, 15).unwrap(), &date_format)
        .unwrap();
    let stamp = ExcelDateTime::from_ymd(2023, 12, 31).unwrap().and_hms(8, 30, 5).unwrap();
    ws.write_datetime_with_format(1, 1, &stamp, &stamp_format).unwrap();
    let bytes = wb.save_to_buffer().unwrap();

    let mut stream = open_source(&SourceInput::new("dates.xlsx", &bytes), &ReadOptions::default()).unwrap();
    let chunk = stream.next().unwrap().unwrap();
    assert_eq!(chunk.rows, vec![vec!["2024-03-15 00:00:00", "2023-12-31 08:30:05"]]);
}
