use std::collections::HashSet;

use tabmerge::export::{serialize, ExportOptions};
use tabmerge::ingestion::{read_table, ReadOptions, SourceInput, TextEncoding};
use tabmerge::pipeline::{run_pipeline, PipelineConfig, RunContext};
use tabmerge::processing::{
    aggregate, AggregationOptions, ColumnPolicy, ConcatOrder, ConcatSeparator, ConcatStyle, JoinKind, MergeOptions,
};
use tabmerge::types::{Delimiter, Schema, Table};

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(format!("tests/fixtures/{name}")).unwrap()
}

fn utf8_out(delimiter: Delimiter) -> ExportOptions {
    ExportOptions {
        delimiter,
        encoding: TextEncoding::Utf8,
    }
}

#[test]
fn groups_and_concatenates_the_reference_scenario() {
    let cfg = PipelineConfig {
        aggregation: Some(AggregationOptions {
            group_keys: vec!["id".into()],
            policies: [("val".to_string(), ColumnPolicy::ConcatDedup)].into_iter().collect(),
            concat: Some(ConcatStyle {
                order: ConcatOrder::FirstSeen,
                separator: ConcatSeparator::Pipe,
            }),
            ..Default::default()
        }),
        export: utf8_out(Delimiter::Semicolon),
        ..Default::default()
    };
    let main = SourceInput::new("in.csv", "id;val\n1;x\n1;y\n2;z\n".as_bytes());
    let out = run_pipeline(main, None, &cfg, &RunContext::default()).unwrap();

    assert_eq!(out.rows_written, 2);
    assert_eq!(String::from_utf8(out.bytes).unwrap(), "id;val\n1;x|y\n2;z\n");
    let format = out.format.unwrap();
    assert_eq!(format.delimiter, Delimiter::Semicolon);
    assert_eq!(format.encoding, TextEncoding::Utf8);
}

#[test]
fn merges_aggregates_and_terminates_fixture_orders() {
    let cfg = PipelineConfig::from_json_str(
        r#"{
            "read": { "chunk_size": 2 },
            "merge": { "left_keys": ["sku"], "right_keys": ["sku"], "join": "left" },
            "aggregation": {
                "group_keys": ["family"],
                "policies": { "qty": "min_max_range", "note": "concat_dedup" },
                "concat": { "order": "sorted", "separator": "semicolon" },
                "terminator_columns": ["note"],
                "output_columns": ["family", "qty", "note", "supplier"]
            },
            "export": { "delimiter": "comma", "encoding": "utf-8" }
        }"#,
    )
    .unwrap();

    let orders = fixture("orders.csv");
    let products = fixture("products.csv");
    let out = run_pipeline(
        SourceInput::new("orders.csv", &orders),
        Some(SourceInput::new("products.csv", &products)),
        &cfg,
        &RunContext::default(),
    )
    .unwrap();

    assert_eq!(
        String::from_utf8(out.bytes).unwrap(),
        "family,qty,note,supplier\n\
         fruit,2 - 10,first;multi line;,Acme\n\
         veg,,;,Acme\n\
         ,1 - 1,unknown sku;,\n"
    );
    assert_eq!(out.chunks, 3);
    assert_eq!(out.metrics.rows_read, 5);
    assert_eq!(out.metrics.numeric_values_skipped, 1);
    assert_eq!(out.metrics.rows_written, 3);
}

#[test]
fn left_join_without_matches_keeps_every_primary_row() {
    let cfg = PipelineConfig {
        merge: MergeOptions {
            left_keys: vec!["sku".into()],
            right_keys: vec!["code".into()],
            join: JoinKind::Left,
        },
        export: utf8_out(Delimiter::Pipe),
        ..Default::default()
    };
    let main = SourceInput::new("m.csv", b"sku;qty\nA;1\nB;2\nC;3\n");
    let reference = SourceInput::new("r.csv", b"code;label\nX;ex\nY;why\n");
    let out = run_pipeline(main, Some(reference), &cfg, &RunContext::default()).unwrap();

    assert_eq!(out.rows_written, 3);
    assert_eq!(
        String::from_utf8(out.bytes).unwrap(),
        "sku|qty|code|label\nA|1||\nB|2||\nC|3||\n"
    );
}

#[test]
fn inner_join_fans_out_per_chunk() {
    let cfg = PipelineConfig {
        read: ReadOptions {
            chunk_size: 1,
            ..Default::default()
        },
        merge: MergeOptions {
            left_keys: vec!["k".into()],
            right_keys: vec!["k".into()],
            join: JoinKind::Inner,
        },
        export: utf8_out(Delimiter::Semicolon),
        ..Default::default()
    };
    let main = SourceInput::new("m.csv", b"k;a\n1;p\n2;q\n1;r\n");
    let reference = SourceInput::new("r.csv", b"k;b\n1;u\n1;v\n");
    let out = run_pipeline(main, Some(reference), &cfg, &RunContext::default()).unwrap();

    assert_eq!(out.chunks, 3);
    assert_eq!(
        String::from_utf8(out.bytes).unwrap(),
        "k;a;b\n1;p;u\n1;p;v\n1;r;u\n1;r;v\n"
    );
}

#[test]
fn aggregation_yields_one_row_per_distinct_key_tuple() {
    let mut rows = Vec::new();
    for i in 0..60 {
        rows.push(vec![format!("g{}", i % 7), format!("h{}", i % 2), i.to_string()]);
    }
    let table = Table::new(Schema::new(vec!["a".into(), "b".into(), "n".into()]), rows);
    let opts = AggregationOptions {
        group_keys: vec!["a".into(), "b".into()],
        policies: [("n".to_string(), ColumnPolicy::MinMaxRange)].into_iter().collect(),
        ..Default::default()
    };
    let out = aggregate(&table, &opts).unwrap();

    let distinct: HashSet<(String, String)> = table
        .rows
        .iter()
        .map(|r| (r[0].clone(), r[1].clone()))
        .collect();
    assert_eq!(out.row_count(), distinct.len());
    let keys: HashSet<(String, String)> = out.rows.iter().map(|r| (r[0].clone(), r[1].clone())).collect();
    assert_eq!(keys.len(), out.row_count());
    // first-seen order
    assert_eq!(out.rows[0][..2], ["g0".to_string(), "h0".to_string()]);
    assert_eq!(out.rows[1][..2], ["g1".to_string(), "h1".to_string()]);
}

#[test]
fn export_then_reingest_is_lossless() {
    let table = Table::new(
        Schema::new(vec!["id".into(), "text".into(), "other".into()]),
        vec![
            vec!["1".into(), "plain".into(), "".into()],
            vec!["2".into(), "with;semi, comma".into(), "tab\tinside".into()],
            vec!["3".into(), "pipe|and #hash".into(), "quote \"q\"".into()],
            vec!["4".into(), "line\nbreak".into(), "  padded  ".into()],
            vec!["5".into(), "Zoë Liège".into(), "3,5".into()],
        ],
    );

    for delimiter in [
        Delimiter::Comma,
        Delimiter::Semicolon,
        Delimiter::Tab,
        Delimiter::Pipe,
        Delimiter::Hash,
    ] {
        for encoding in [
            TextEncoding::Utf8,
            TextEncoding::Utf8Bom,
            TextEncoding::Windows1252,
            TextEncoding::from_label("utf-16le").unwrap(),
            TextEncoding::from_label("utf-16be").unwrap(),
        ] {
            let opts = ExportOptions { delimiter, encoding };
            let out = serialize(&table, &opts).unwrap();
            assert_eq!(out.replaced_chars, 0);

            let read_opts = ReadOptions {
                delimiter: Some(delimiter),
                encoding: Some(encoding),
                ..Default::default()
            };
            let back = read_table(&SourceInput::new("out.csv", &out.bytes), &read_opts).unwrap();
            assert_eq!(back, table, "{delimiter:?} / {encoding}");
        }
    }
}

#[test]
fn unencodable_output_is_replaced_and_counted() {
    let cfg = PipelineConfig {
        export: ExportOptions {
            delimiter: Delimiter::Comma,
            encoding: TextEncoding::Latin1,
        },
        ..Default::default()
    };
    let main = SourceInput::new("m.csv", "name;sym\nZoë;€\n".as_bytes());
    let out = run_pipeline(main, None, &cfg, &RunContext::default()).unwrap();
    assert_eq!(out.bytes, b"name,sym\nZo\xeb,?\n");
    assert_eq!(out.metrics.chars_replaced, 1);
}
