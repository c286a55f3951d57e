//! JSON ingestion.
//!
//! A file may hold one JSON document or a stream of top-level objects/arrays separated by
//! whitespace (JSON Lines, concatenated dumps, pretty-printed records back to back). The whole
//! document is tried first; on failure the stream scanner splits the input into values, which
//! are then treated as one array.
//!
//! Path-based reads go through the session row cache; byte-based reads never touch it.

use std::path::Path;

use serde_json::Value;

use crate::cache;
use crate::error::{IngestionError, IngestionResult};
use crate::session::IngestSession;
use crate::types::{CompressionType, FileOptions, FileType};

use super::compression::decompress_file;
use super::detection::detect_file_type_and_compression;
use super::format::{FormatReader, Input, RowStream};
use super::json_path::{JsonTable, apply_json_path};

/// Default number of rows returned by [`preview_json_with_expression`].
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Parse JSON bytes as one document or, failing that, as a stream of documents.
pub fn parse_json_data(data: &[u8]) -> IngestionResult<Value> {
    if data.is_empty() {
        return Err(IngestionError::Json {
            message: "data is empty".to_owned(),
        });
    }
    let whole_err = match serde_json::from_slice::<Value>(data) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    match parse_json_stream(data) {
        Ok(values) if !values.is_empty() => Ok(Value::Array(values)),
        Ok(_) | Err(_) => Err(IngestionError::Json {
            message: format!("failed to parse JSON: {whole_err}"),
        }),
    }
}

/// Split `data` into consecutive top-level objects/arrays and parse each one.
pub fn parse_json_stream(data: &[u8]) -> IngestionResult<Vec<Value>> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        while pos < data.len() && matches!(data[pos], b' ' | b'\t' | b'\n' | b'\r') {
            pos += 1;
        }
        if pos >= data.len() {
            break;
        }
        if data[pos] != b'{' && data[pos] != b'[' {
            return Err(stream_error(format!("expected {{ or [ at position {pos}")));
        }
        let end = find_json_value_end(data, pos)?;
        let value = serde_json::from_slice(&data[pos..end])
            .map_err(|e| stream_error(format!("failed to parse JSON at position {pos}: {e}")))?;
        values.push(value);
        pos = end;
    }
    Ok(values)
}

/// Exclusive end of the object/array starting at `start`.
///
/// Tracks a bracket stack and string state: quotes toggle string mode unless escaped, and
/// brackets inside strings are ignored.
pub fn find_json_value_end(data: &[u8], start: usize) -> IngestionResult<usize> {
    if start >= data.len() {
        return Err(stream_error("unexpected end of input"));
    }
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in data.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        if in_string {
            match b {
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let open = if b == b'}' { b'{' } else { b'[' };
                if stack.pop() != Some(open) {
                    return Err(stream_error(format!("unmatched {} at position {i}", b as char)));
                }
                if stack.is_empty() {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        Ok(data.len())
    } else {
        Err(stream_error("unclosed JSON value"))
    }
}

fn stream_error(message: impl Into<String>) -> IngestionError {
    IngestionError::Json {
        message: message.into(),
    }
}

/// Read and parse a JSON file, decompressing it when its name or magic bytes say so.
///
/// Partial decompression is recorded on the session as a warning for `path`.
pub fn parse_json_file(session: &IngestSession, path: &Path) -> IngestionResult<Value> {
    if path.as_os_str().is_empty() {
        return Err(IngestionError::format("file path is empty"));
    }
    let (_, compression) = detect_file_type_and_compression(path);
    let out = decompress_file(path, compression)?;
    if compression != CompressionType::None {
        match out.warning {
            Some(w) => session.record_decompression_warning(path, w),
            None => session.clear_decompression_warning(path),
        }
    }
    parse_json_data(&out.data)
}

/// Table for in-memory JSON bytes. Never cached.
pub fn json_table_from_bytes(data: &[u8], expression: &str) -> IngestionResult<JsonTable> {
    apply_json_path(&parse_json_data(data)?, expression)
}

/// Header of in-memory JSON bytes.
pub fn read_json_header_from_bytes(data: &[u8], expression: &str) -> IngestionResult<Vec<String>> {
    Ok(json_table_from_bytes(data, expression)?.header)
}

/// Row count of in-memory JSON bytes.
pub fn json_row_count_from_bytes(data: &[u8], expression: &str) -> IngestionResult<usize> {
    Ok(json_table_from_bytes(data, expression)?.rows.len())
}

/// First rows of a JSON file under `expression`, for interactive path editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPreview {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows the expression yields in total.
    pub total_rows: usize,
}

/// Preview up to `max_rows` rows (0 means [`DEFAULT_PREVIEW_ROWS`]).
///
/// Bypasses the row cache. When the expression selects an object, the error carries that
/// object's keys in [`IngestionError::JsonPath::available_keys`].
pub fn preview_json_with_expression(
    session: &IngestSession,
    path: &Path,
    expression: &str,
    max_rows: usize,
) -> IngestionResult<JsonPreview> {
    let max_rows = if max_rows == 0 { DEFAULT_PREVIEW_ROWS } else { max_rows };
    let table = apply_json_path(&parse_json_file(session, path)?, expression)?;
    let total_rows = table.rows.len();
    let mut rows = table.rows;
    rows.truncate(max_rows);
    Ok(JsonPreview {
        headers: table.header,
        rows,
        total_rows,
    })
}

/// JSON strategy for [`FormatReader`]. Path inputs are served from the row cache.
#[derive(Debug, Clone)]
pub struct JsonFormat {
    session: IngestSession,
}

impl JsonFormat {
    pub fn new(session: IngestSession) -> Self {
        Self { session }
    }
}

pub(crate) fn required_jpath(options: &FileOptions) -> IngestionResult<&str> {
    let jpath = options.jpath.trim();
    if jpath.is_empty() {
        return Err(IngestionError::format("JSONPath expression is required for JSON files"));
    }
    Ok(jpath)
}

impl FormatReader for JsonFormat {
    fn file_type(&self) -> FileType {
        FileType::Json
    }

    fn read_header(&self, input: &Input, options: &FileOptions) -> IngestionResult<Vec<String>> {
        let jpath = required_jpath(options)?;
        match input {
            Input::Path(p) => cache::json_header(&self.session, p, jpath),
            Input::Bytes(b) => read_json_header_from_bytes(b, jpath),
        }
    }

    fn row_count(&self, input: &Input, options: &FileOptions) -> IngestionResult<usize> {
        let jpath = required_jpath(options)?;
        match input {
            Input::Path(p) => {
                let tz = self.session.effective_timezone(options);
                cache::json_row_count(&self.session, p, jpath, &tz)
            }
            Input::Bytes(b) => json_row_count_from_bytes(b, jpath),
        }
    }

    fn open(&self, input: Input, options: &FileOptions) -> IngestionResult<RowStream> {
        let jpath = required_jpath(options)?;
        let records = match input {
            Input::Path(p) => {
                let tz = self.session.effective_timezone(options);
                let data = cache::get_or_parse_json_rows(&self.session, &p, jpath, None, &tz)?;
                let mut records = Vec::with_capacity(data.rows.len() + 1);
                records.push(data.header.clone());
                records.extend(data.rows.iter().map(|r| r.data.clone()));
                records
            }
            Input::Bytes(b) => json_table_from_bytes(&b, jpath)?.into_records(),
        };
        Ok(RowStream::from_records(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_document_is_preferred() {
        let v = parse_json_data(br#"[{"a":1}]"#).unwrap();
        assert_eq!(v, serde_json::json!([{"a": 1}]));
    }

    #[test]
    fn concatenated_values_become_an_array() {
        let data = b"{\"a\":1} {\"a\":2}\n{\n  \"a\": 3\n}\n";
        let v = parse_json_data(data).unwrap();
        assert_eq!(v.as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn braces_inside_strings_do_not_close_values() {
        let data = br#"{"msg":"a } b \" { c"}{"msg":"x"}"#;
        assert_eq!(find_json_value_end(data, 0).unwrap(), 22);
        assert_eq!(parse_json_stream(data).unwrap().len(), 2);
    }

    #[test]
    fn malformed_streams_fail() {
        assert!(parse_json_data(b"").is_err());
        assert!(parse_json_data(b"   ").is_err());
        assert!(parse_json_data(b"{\"a\":1} 42").is_err());
        assert!(find_json_value_end(b"{\"a\":[1}", 0).is_err());
        assert!(find_json_value_end(b"{\"a\":1", 0).is_err());
    }

    #[test]
    fn byte_variants_bypass_the_cache() {
        let data = br#"{"items":[{"id":1},{"id":2}]}"#;
        assert_eq!(read_json_header_from_bytes(data, "$.items").unwrap(), vec!["id"]);
        assert_eq!(json_row_count_from_bytes(data, "$.items").unwrap(), 2);
    }
}
