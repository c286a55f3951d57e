#![cfg(feature = "excel_test_writer")]

use std::path::Path;

use evidence_loader::ingestion::FileReader;
use evidence_loader::ingestion::excel::read_xlsx_rows_from_path;
use evidence_loader::{FileOptions, FileType, IngestSession};

fn tmp_xlsx(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(format!("{name}.xlsx"))
}

fn write_logons_xlsx(path: &Path) {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    let mut wb = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    let ws = wb.add_worksheet();
    ws.set_name("Logons").unwrap();

    // header, with a blank column name
    ws.write_string(0, 0, "Timestamp").unwrap();
    ws.write_string(0, 1, "user").unwrap();
    ws.write_string(0, 3, "count").unwrap();

    // row 1
    let dt = ExcelDateTime::parse_from_str("2024-01-02 10:00:00").unwrap();
    ws.write_datetime_with_format(1, 0, &dt, &date_format).unwrap();
    ws.write_string(1, 1, "alice").unwrap();
    ws.write_string(1, 2, "x").unwrap();
    ws.write_number(1, 3, 3).unwrap();

    // row 3 (row 2 left blank)
    ws.write_string(3, 0, "2024-01-01 09:30:00").unwrap();
    ws.write_string(3, 1, "bob").unwrap();
    ws.write_number(3, 3, 1.5).unwrap();

    // a second sheet that must be ignored
    let ws2 = wb.add_worksheet();
    ws2.set_name("Ignored").unwrap();
    ws2.write_string(0, 0, "other").unwrap();

    wb.save(path).unwrap();
}

#[test]
fn first_sheet_rows_skip_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = tmp_xlsx(&dir, "logons");
    write_logons_xlsx(&path);

    let rows = read_xlsx_rows_from_path(&path).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec!["Timestamp", "user", "", "count"]);
    assert_eq!(rows[1][0], "2024-01-02 10:00:00");
    assert_eq!(rows[1][3], "3");
    assert_eq!(rows[2][3], "1.5");
}

#[test]
fn facade_reads_xlsx_with_normalized_header_and_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = tmp_xlsx(&dir, "facade");
    write_logons_xlsx(&path);

    let session = IngestSession::new();
    let reader = FileReader::new(&session, &path, FileOptions::default());
    assert_eq!(reader.file_type(), FileType::Xlsx);

    let result = reader.read_rows().unwrap();
    assert_eq!(result.header, vec!["Timestamp", "user", "Unnamed_A", "count"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[0].data[1], "alice");

    let stats = result.timestamp_stats.unwrap();
    assert_eq!(stats.time_field_idx, 0);
    assert_eq!(stats.valid_count, 2);
    assert_eq!(stats.min_timestamp, 1_704_101_400_000);
    assert_eq!(stats.max_timestamp, 1_704_189_600_000);
}

#[test]
fn unreadable_workbook_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = tmp_xlsx(&dir, "garbage");
    std::fs::write(&path, b"not a zip archive").unwrap();

    let session = IngestSession::new();
    assert!(FileReader::new(&session, &path, FileOptions::default()).read_rows().is_err());
}
