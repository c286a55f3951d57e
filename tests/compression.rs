use std::io::Write;
use std::path::{Path, PathBuf};

use evidence_loader::ingestion::compression::{decompress_file, detect_compression_by_magic};
use evidence_loader::ingestion::{FileReader, detect_file_type_and_compression, read_header_for_path, row_count_for_path};
use evidence_loader::{CompressionType, FileOptions, FileType, IngestSession, IngestionError};

const EVENTS: &str = "timestamp,host,msg\n2024-01-01 00:00:00,a,boot\n2024-01-01 00:00:05,b,\"x,y\"\n";

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn xz(data: &[u8]) -> Vec<u8> {
    let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn every_codec_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        ("e.csv.gz", gzip(EVENTS.as_bytes()), CompressionType::Gzip),
        ("e.csv.bz2", bzip2(EVENTS.as_bytes()), CompressionType::Bzip2),
        ("e.csv.xz", xz(EVENTS.as_bytes()), CompressionType::Xz),
    ];
    for (name, bytes, expected) in cases {
        let path = write(dir.path(), name, &bytes);
        assert_eq!(detect_file_type_and_compression(&path), (FileType::Csv, expected));
        assert_eq!(detect_compression_by_magic(&path), expected);

        let out = decompress_file(&path, expected).unwrap();
        assert_eq!(out.data, EVENTS.as_bytes(), "{name}");
        assert!(out.warning.is_none());
    }
}

#[test]
fn compressed_csv_reads_like_plain_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "events.csv.gz", &gzip(EVENTS.as_bytes()));
    let session = IngestSession::new();
    let opts = FileOptions::default();

    assert_eq!(read_header_for_path(&session, &path, &opts).unwrap(), vec!["timestamp", "host", "msg"]);
    assert_eq!(row_count_for_path(&session, &path, &opts).unwrap(), 2);

    let reader = FileReader::new(&session, &path, opts);
    assert_eq!(reader.compression(), CompressionType::Gzip);
    let result = reader.read_rows().unwrap();
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[1].data, vec!["2024-01-01 00:00:05", "b", "x,y"]);
    assert_eq!(result.timestamp_stats.unwrap().valid_count, 2);
}

#[test]
fn magic_bytes_without_a_known_name_default_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "capture.unknownext", &xz(EVENTS.as_bytes()));
    assert_eq!(detect_file_type_and_compression(&path), (FileType::Csv, CompressionType::Xz));

    let session = IngestSession::new();
    let result = FileReader::new(&session, &path, FileOptions::default()).read_rows().unwrap();
    assert_eq!(result.row_count(), 2);
}

#[test]
fn magic_bytes_win_over_a_plain_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "events.csv", &gzip(EVENTS.as_bytes()));
    assert_eq!(detect_file_type_and_compression(&path), (FileType::Csv, CompressionType::Gzip));

    let session = IngestSession::new();
    let reader = FileReader::new(&session, &path, FileOptions::default());
    assert_eq!(reader.compression(), CompressionType::Gzip);
    let result = reader.read_rows().unwrap();
    assert_eq!(result.header, vec!["timestamp", "host", "msg"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.rows[0].data, vec!["2024-01-01 00:00:00", "a", "boot"]);

    // The inner type is not taken from the name, so JSON needs the forced type.
    let json = write(dir.path(), "alerts.json", &gzip(br#"{"items":[{"id":"1"}]}"#));
    assert_eq!(detect_file_type_and_compression(&json), (FileType::Csv, CompressionType::Gzip));
}

#[test]
fn forced_type_overrides_the_csv_default() {
    let dir = tempfile::tempdir().unwrap();
    let json = br#"{"items":[{"id":"1"},{"id":"2"}]}"#;
    let path = write(dir.path(), "blob.bin", &gzip(json));

    let mut opts = FileOptions::with_jpath("$.items");
    opts.detected_file_type = Some(FileType::Json);

    let session = IngestSession::new();
    let reader = FileReader::new(&session, &path, opts);
    assert_eq!(reader.file_type(), FileType::Json);
    assert_eq!(reader.compression(), CompressionType::Gzip);
    assert_eq!(reader.read_rows().unwrap().row_count(), 2);
}

#[test]
fn compressed_json_goes_through_jsonpath() {
    let dir = tempfile::tempdir().unwrap();
    let json = br#"{"alerts":[{"time":"2024-03-01T12:00:00Z","rule":"r1"}]}"#;
    let path = write(dir.path(), "alerts.json.bz2", &bzip2(json));

    let session = IngestSession::new();
    let result = FileReader::new(&session, &path, FileOptions::with_jpath("$.alerts"))
        .read_rows()
        .unwrap();
    assert_eq!(result.header, vec!["rule", "time"]);
    assert_eq!(result.rows[0].timestamp, 1_709_294_400_000);
}

fn large_csv() -> String {
    let mut s = String::from("id,payload\n");
    for i in 0..20_000 {
        s.push_str(&format!("{i},row-{i}-{}\n", i * 7919 % 10_007));
    }
    s
}

#[test]
fn truncated_gzip_keeps_partial_data_and_warns() {
    let dir = tempfile::tempdir().unwrap();
    let full = gzip(large_csv().as_bytes());
    let path = write(dir.path(), "big.csv.gz", &full[..full.len() / 2]);

    let out = decompress_file(&path, CompressionType::Gzip).unwrap();
    assert!(!out.data.is_empty());
    let warning = out.warning.unwrap();
    assert!(warning.starts_with("Decompression incomplete:"));
    assert!(warning.ends_with("Some data may be missing."));

    let session = IngestSession::new();
    let result = FileReader::new(&session, &path, FileOptions::default()).read_rows().unwrap();
    assert!(result.row_count() > 0);
    assert!(result.row_count() < 20_000);
    assert!(session.take_decompression_warning(&path).is_some());
    assert!(session.take_decompression_warning(&path).is_none());
}

#[test]
fn garbage_after_magic_is_a_decompression_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "bad.csv.gz", &[0x1f, 0x8b, 0x00, 0x01, 0x02]);
    let err = decompress_file(&path, CompressionType::Gzip).unwrap_err();
    assert!(matches!(err, IngestionError::Decompression { .. }));
}
