use std::io::Write;
use std::path::Path;

use evidence_loader::ingestion::csv::{count_csv_rows, count_rows_from_reader, read_csv_header, read_header_from_reader};
use evidence_loader::ingestion::{FileReader, open_reader};
use evidence_loader::{CancellationToken, FileOptions, IngestSession, IngestionError};

#[test]
fn read_csv_header_normalizes_blank_names() {
    let header = read_csv_header("tests/fixtures/events.csv", &FileOptions::default()).unwrap();
    assert_eq!(header, vec!["timestamp", "user", "action", "Unnamed_A"]);
}

#[test]
fn count_csv_rows_excludes_header() {
    assert_eq!(count_csv_rows("tests/fixtures/events.csv", &FileOptions::default()).unwrap(), 3);

    let opts = FileOptions {
        no_header_row: true,
        ..Default::default()
    };
    assert_eq!(count_csv_rows("tests/fixtures/events.csv", &opts).unwrap(), 4);
}

#[test]
fn ragged_rows_are_kept_as_is() {
    let input = "a,b\n1,2,3\n";
    let header = read_header_from_reader(input.as_bytes(), &FileOptions::default()).unwrap();
    assert_eq!(header, vec!["a", "b"]);

    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(input.as_bytes()).unwrap();

    let session = IngestSession::new();
    let result = FileReader::new(&session, file.path(), FileOptions::default())
        .read_rows()
        .unwrap();
    assert_eq!(result.header, vec!["a", "b"]);
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.rows[0].data, vec!["1", "2", "3"]);
}

#[test]
fn no_header_row_synthesizes_names_from_first_record() {
    let opts = FileOptions {
        no_header_row: true,
        ..Default::default()
    };
    let header = read_header_from_reader("x,y,z\n1,2,3\n".as_bytes(), &opts).unwrap();
    assert_eq!(header, vec!["Unnamed_A", "Unnamed_B", "Unnamed_C"]);
    assert_eq!(count_rows_from_reader("x,y,z\n1,2,3\n".as_bytes(), &opts).unwrap(), 2);
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(b"name,value\nok,1\nbad\xff,2\n").unwrap();

    let session = IngestSession::new();
    let result = FileReader::new(&session, file.path(), FileOptions::default())
        .read_rows()
        .unwrap();
    assert_eq!(result.row_count(), 2);
    assert!(result.rows[1].data[0].starts_with("bad"));
}

#[test]
fn empty_csv_is_a_format_error() {
    let err = read_header_from_reader("".as_bytes(), &FileOptions::default()).unwrap_err();
    assert!(matches!(err, IngestionError::FormatContract { .. }));
    assert!(err.to_string().contains("CSV input is empty"));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = read_csv_header("tests/fixtures/does_not_exist.csv", &FileOptions::default()).unwrap_err();
    assert!(matches!(err, IngestionError::Io(_)));
}

#[test]
fn open_reader_streams_from_the_first_record() {
    let session = IngestSession::new();
    let rows: Vec<Vec<String>> = open_reader(
        &session,
        Path::new("tests/fixtures/events.csv"),
        &FileOptions::default(),
        &CancellationToken::new(),
    )
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][0], "timestamp");
    assert_eq!(rows[3], vec!["", "carol", "login", "y"]);
}
