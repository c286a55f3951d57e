use std::io::Write;
use std::path::Path;

use evidence_loader::ingestion::json::{parse_json_data, preview_json_with_expression, read_json_header_from_bytes};
use evidence_loader::ingestion::{FileReader, read_header_for_path, row_count_for_path};
use evidence_loader::{FileOptions, IngestSession, IngestionError};

fn alerts() -> &'static Path {
    Path::new("tests/fixtures/alerts.json")
}

#[test]
fn header_is_sorted_union_of_keys() {
    let session = IngestSession::new();
    let header = read_header_for_path(&session, alerts(), &FileOptions::with_jpath("$.alerts")).unwrap();
    assert_eq!(header, vec!["host", "rule", "severity", "tags", "time"]);
}

#[test]
fn rows_are_blank_filled_and_nested_values_stay_json() {
    let session = IngestSession::new();
    let result = FileReader::new(&session, alerts(), FileOptions::with_jpath("$.alerts"))
        .read_rows()
        .unwrap();

    assert_eq!(result.row_count(), 3);
    assert_eq!(result.rows[0].data, vec!["ws-01", "powershell", "", "", "2024-03-01T12:00:00Z"]);
    assert_eq!(result.rows[1].data, vec!["", "rdp", "high", "", "2024-03-01T08:15:00Z"]);
    assert_eq!(result.rows[2].data[3], r#"["removable","storage"]"#);
    for row in result.rows.iter() {
        assert_eq!(row.data.len(), result.header.len());
    }
}

#[test]
fn time_column_is_detected_and_parsed() {
    let session = IngestSession::new();
    let result = FileReader::new(&session, alerts(), FileOptions::with_jpath("$.alerts"))
        .read_rows()
        .unwrap();

    let stats = result.timestamp_stats.unwrap();
    assert_eq!(stats.time_field_idx, 4);
    assert_eq!(stats.valid_count, 2);
    // 2024-03-01T12:00:00Z
    assert_eq!(stats.max_timestamp, 1_709_294_400_000);
    assert!(!result.rows[2].has_time);
}

#[test]
fn union_example_maps_rows_after_sorting() {
    let doc = parse_json_data(br#"[{"a":1,"c":3},{"b":2}]"#).unwrap();
    let table = evidence_loader::ingestion::json_path::apply_json_path(&doc, "$").unwrap();
    assert_eq!(table.header, vec!["a", "b", "c"]);
    assert_eq!(table.rows, vec![vec!["1", "", "3"], vec!["", "2", ""]]);
}

#[test]
fn json_lines_are_read_as_one_array() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    writeln!(file, r#"{{"id":1,"msg":"a"}}"#).unwrap();
    writeln!(file, r#"{{"id":2,"msg":"b"}}"#).unwrap();
    writeln!(file, r#"{{"id":3}}"#).unwrap();

    let session = IngestSession::new();
    let opts = FileOptions::with_jpath("$");
    assert_eq!(row_count_for_path(&session, file.path(), &opts).unwrap(), 3);
    let result = FileReader::new(&session, file.path(), opts).read_rows().unwrap();
    assert_eq!(result.header, vec!["id", "msg"]);
    assert_eq!(result.rows[2].data, vec!["3", ""]);
}

#[test]
fn missing_jpath_is_rejected() {
    let session = IngestSession::new();
    let err = FileReader::new(&session, alerts(), FileOptions::default())
        .read_rows()
        .unwrap_err();
    assert!(matches!(err, IngestionError::FormatContract { .. }));
    assert!(err.to_string().contains("JSONPath expression is required"));
}

#[test]
fn object_match_reports_available_keys() {
    let session = IngestSession::new();
    let err = preview_json_with_expression(&session, alerts(), "$.meta", 0).unwrap_err();
    match err {
        IngestionError::JsonPath { available_keys, message } => {
            assert!(message.contains("object"));
            let mut keys = available_keys;
            keys.sort();
            assert_eq!(keys, vec!["source", "version"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn preview_truncates_rows_but_reports_total() {
    let session = IngestSession::new();
    let preview = preview_json_with_expression(&session, alerts(), "$.alerts", 2).unwrap();
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.total_rows, 3);
    assert_eq!(preview.headers[0], "host");
}

#[test]
fn array_of_arrays_uses_first_row_as_header() {
    let header = read_json_header_from_bytes(br#"{"t":[["ts","",""],["1","2","3"]]}"#, "$.t").unwrap();
    assert_eq!(header, vec!["ts", "Unnamed_A", "Unnamed_B"]);
}

#[test]
fn scalar_result_is_a_contract_error() {
    let session = IngestSession::new();
    let err = read_header_for_path(&session, alerts(), &FileOptions::with_jpath("$.meta.version")).unwrap_err();
    assert!(matches!(err, IngestionError::JsonPath { .. }));
}
