use tabmerge::ingestion::{
    detect_format, open_source, preview, read_table, ChunkedReader, ReadOptions, SourceInput, StrategyKind,
    TextEncoding,
};
use tabmerge::types::{Delimiter, Table};
use tabmerge::PipelineError;

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("tests/fixtures/{name}")).unwrap()
}

fn read_with_chunk_size(bytes: &[u8], chunk_size: usize) -> (Vec<usize>, Table) {
    let opts = ReadOptions {
        chunk_size,
        ..Default::default()
    };
    let reader = ChunkedReader::open(bytes, &opts).unwrap();
    let mut all = Table::empty(reader.schema().clone());
    let mut sizes = Vec::new();
    for chunk in reader {
        let chunk = chunk.unwrap();
        sizes.push(chunk.row_count());
        all.append(chunk).unwrap();
    }
    (sizes, all)
}

#[test]
fn chunks_concatenate_to_a_full_read_for_any_chunk_size() {
    let bytes = fixture("orders.csv");
    let (_, full) = read_with_chunk_size(&bytes, 10_000);
    assert_eq!(full.row_count(), 5);
    assert_eq!(full.schema.columns, vec!["order_id", "sku", "qty", "note"]);
    assert_eq!(full.value(1, "note"), Some("multi\nline"));
    assert_eq!(full.value(3, "note"), Some(""));

    for k in 1..=6 {
        let (sizes, table) = read_with_chunk_size(&bytes, k);
        assert_eq!(table, full, "chunk size {k}");
        assert!(sizes.iter().all(|&n| n <= k && n > 0), "chunk size {k}: {sizes:?}");
        assert_eq!(sizes.len(), full.row_count().div_ceil(k));
    }
}

#[test]
fn detection_is_idempotent() {
    let bytes = fixture("orders.csv");
    let first = detect_format(&bytes);
    for _ in 0..3 {
        assert_eq!(detect_format(&bytes), first);
    }
    assert_eq!(first.format.delimiter, Delimiter::Semicolon);
    assert_eq!(first.format.encoding, TextEncoding::Utf8);
}

#[test]
fn legacy_encoding_is_decoded() {
    let bytes = fixture("legacy_cp1252.tsv");
    let reader = ChunkedReader::open(&bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.detection().format.encoding, TextEncoding::Windows1252);
    assert_eq!(reader.detection().format.delimiter, Delimiter::Tab);
    let table = reader.read_all().unwrap();
    assert_eq!(table.column_values("name").unwrap(), vec!["Zoë", "René"]);
    assert_eq!(table.value(1, "city"), Some("Liège"));
}

#[test]
fn single_column_source_escalates_to_the_last_rung() {
    let bytes = fixture("single_column.txt");
    let reader = ChunkedReader::open(&bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.strategy().kind, StrategyKind::Unquoted);
    // 4 strict + 4 permissive + 16 forced-delimiter rungs fail before the first unquoted one.
    assert_eq!(reader.attempts().len(), 25);
    assert!(reader.attempts()[..24].iter().all(|a| a.outcome.is_err()));
    assert!(reader.attempts()[0]
        .outcome
        .as_ref()
        .unwrap_err()
        .contains("probable delimiter miss"));
    let table = reader.read_all().unwrap();
    assert_eq!(table.column_values("name").unwrap(), vec!["Ada", "Grace"]);
}

#[test]
fn explicit_delimiter_accepts_a_single_column() {
    let bytes = fixture("single_column.txt");
    let opts = ReadOptions {
        delimiter: Some(Delimiter::Comma),
        ..Default::default()
    };
    let reader = ChunkedReader::open(&bytes, &opts).unwrap();
    assert_eq!(reader.strategy().kind, StrategyKind::Strict);
    assert_eq!(reader.attempts().len(), 1);
}

#[test]
fn long_rows_move_the_ladder_to_permissive_parsing() {
    let bytes = b"a;b\n1;2\n3;4;5\n6;7\n";
    let mut reader = ChunkedReader::open(bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.strategy().kind, StrategyKind::Permissive);
    assert!(reader.attempts()[..4]
        .iter()
        .all(|a| a.strategy.kind == StrategyKind::Strict && a.outcome.is_err()));

    let chunk = reader.next().unwrap().unwrap();
    assert_eq!(chunk.rows, vec![vec!["1", "2"], vec!["6", "7"]]);
    assert_eq!(reader.rows_dropped(), 1);
    assert_eq!(reader.rows_read(), 2);
}

#[test]
fn short_rows_are_padded() {
    let table = read_table(&SourceInput::new("x.csv", b"a,b,c\n1,2,3\n4\n"), &ReadOptions::default()).unwrap();
    assert_eq!(table.rows[1], vec!["4", "", ""]);
}

#[test]
fn empty_input_exhausts_the_ladder() {
    let err = ChunkedReader::open(b"", &ReadOptions::default()).err().unwrap();
    match &err {
        PipelineError::IngestionExhausted { attempts, last_error } => {
            assert_eq!(*attempts, 28);
            assert!(last_error.contains("no header row"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("try selecting the delimiter explicitly"));
}

#[test]
fn zero_chunk_size_is_invalid() {
    let opts = ReadOptions {
        chunk_size: 0,
        ..Default::default()
    };
    let err = ChunkedReader::open(b"a,b\n1,2\n", &opts).err().unwrap();
    assert!(matches!(err, PipelineError::InvalidConfig { .. }));
}

#[test]
fn duplicate_and_blank_headers_are_normalized() {
    let table = read_table(
        &SourceInput::new("x.csv", b"id;;id;name\n1;2;3;4\n"),
        &ReadOptions::default(),
    )
    .unwrap();
    assert_eq!(table.schema.columns, vec!["id", "Unnamed: 1", "id.1", "name"]);
}

#[test]
fn preview_is_bounded_and_reports_the_format() {
    let mut bytes = b"k|v\n".to_vec();
    for i in 0..100 {
        bytes.extend_from_slice(format!("{i}|row {i}\n").as_bytes());
    }
    let source = SourceInput::new("big.txt", &bytes);
    let p = preview(&source, &ReadOptions::default(), 20).unwrap();
    assert_eq!(p.table.row_count(), 20);
    assert_eq!(p.table.value(19, "v"), Some("row 19"));
    assert_eq!(p.format.unwrap().delimiter, Delimiter::Pipe);
}

#[test]
fn open_source_streams_delimited_text() {
    let bytes = fixture("products.csv");
    let opts = ReadOptions {
        chunk_size: 2,
        ..Default::default()
    };
    let stream = open_source(&SourceInput::new("products.csv", &bytes), &opts).unwrap();
    assert_eq!(stream.schema().columns, vec!["sku", "family", "supplier"]);
    assert_eq!(stream.detection().unwrap().format.delimiter, Delimiter::Comma);
    let sizes: Vec<usize> = stream.map(|c| c.unwrap().row_count()).collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[test]
fn unterminated_quote_escalates_to_unquoted_parsing() {
    let bytes = b"id;name\n1;\"Ann\n2;Bob\n3;Cy\n";
    let reader = ChunkedReader::open(bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.strategy().kind, StrategyKind::Unquoted);
    assert!(reader.attempts()[0]
        .outcome
        .as_ref()
        .unwrap_err()
        .contains("line 2: quoted field is never closed"));

    let table = reader.read_all().unwrap();
    assert_eq!(
        table.rows,
        vec![vec!["1", "\"Ann"], vec!["2", "Bob"], vec!["3", "Cy"]]
    );
}

#[test]
fn unquoted_parsing_keeps_escaped_delimiters() {
    let bytes = b"name;note\nA\\;B;x\nC\\;D;y\n";
    let reader = ChunkedReader::open(bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.strategy().kind, StrategyKind::Unquoted);
    let table = reader.read_all().unwrap();
    assert_eq!(table.rows, vec![vec!["A;B", "x"], vec!["C;D", "y"]]);
}

#[test]
fn wrong_guess_is_recovered_by_a_forced_delimiter() {
    // semicolons in free text outnumber the commas that actually separate fields
    let bytes = b"name,note\nAda,a;b;c;d\nGrace\n";
    let reader = ChunkedReader::open(bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.detection().format.delimiter, Delimiter::Semicolon);
    assert_eq!(reader.strategy().kind, StrategyKind::ForcedDelimiter);
    assert_eq!(reader.strategy().delimiter, Delimiter::Comma);
    // 8 strict/permissive rungs and 4 forced `;` rungs come first
    assert_eq!(reader.attempts().len(), 13);

    let table = reader.read_all().unwrap();
    assert_eq!(table.schema.columns, vec!["name", "note"]);
    assert_eq!(table.rows, vec![vec!["Ada", "a;b;c;d"], vec!["Grace", ""]]);
}

#[test]
fn utf8_bom_is_dropped_for_legacy_encodings() {
    // BOM-prefixed, but the body is Windows-1252
    let bytes = b"\xEF\xBB\xBFid;city\n1;Li\xe8ge\n";
    let reader = ChunkedReader::open(bytes, &ReadOptions::default()).unwrap();
    assert_eq!(reader.strategy().encoding, TextEncoding::Windows1252);
    let table = reader.read_all().unwrap();
    assert_eq!(table.schema.columns, vec!["id", "city"]);
    assert_eq!(table.value(0, "city"), Some("Liège"));
}
