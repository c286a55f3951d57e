//! Core data model types for ingestion.
//!
//! Every source format is flattened into the same shape: a header (`Vec<String>`) plus a list of
//! [`Row`]s whose cells are plain strings, with timestamps pre-parsed from one chosen column.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of the column appended to directory union headers when
/// [`FileOptions::include_source_column`] is set.
pub const SOURCE_FILE_COLUMN: &str = "__source_file__";

/// Rows shared between the row cache and any number of result views.
///
/// The slice itself is immutable. Callers that need a different order must copy the slice
/// (`rows.to_vec()`) and reorder the copy; the `Row`s are never cloned.
pub type SharedRows = Arc<[Arc<Row>]>;

/// Source format of a file, resolved once per open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileType {
    #[default]
    Unknown,
    Csv,
    Xlsx,
    Json,
    Plugin,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Csv => "CSV",
            Self::Xlsx => "XLSX",
            Self::Json => "JSON",
            Self::Plugin => "Plugin",
        };
        f.write_str(s)
    }
}

/// Compression wrapping a file, detected from its name or its magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
        };
        f.write_str(s)
    }
}

/// Options that define a "virtual file": the same physical path read with different options is
/// a different logical source.
///
/// Use [`FileOptions::key`] for a canonical string identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileOptions {
    /// JSONPath expression selecting the tabular part of a JSON document.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jpath: String,
    /// Treat the first record as data and synthesize `Unnamed_*` headers.
    #[serde(skip_serializing_if = "is_false")]
    pub no_header_row: bool,
    /// Per-file ingest timezone; falls back to the session default when empty.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ingest_timezone_override: String,
    /// Identifier of the plugin that should read this file.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub plugin_id: String,
    /// The path is a directory to be read as one union-schema table.
    #[serde(skip_serializing_if = "is_false")]
    pub is_directory: bool,
    /// Glob pattern selecting files inside a directory (required for directories).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_pattern: String,
    /// Append a `__source_file__` column to directory reads.
    #[serde(skip_serializing_if = "is_false")]
    pub include_source_column: bool,
    /// Inner format forced by the caller, bypassing name-based detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_file_type: Option<FileType>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FileOptions {
    /// Options for a JSON file read through `jpath`.
    pub fn with_jpath(jpath: impl Into<String>) -> Self {
        Self {
            jpath: jpath.into(),
            ..Default::default()
        }
    }

    /// Options for a directory read of files matching `pattern`.
    pub fn directory(pattern: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            file_pattern: pattern.into(),
            ..Default::default()
        }
    }

    /// Canonical identity string, determined by every field.
    pub fn key(&self) -> String {
        let no_header = if self.no_header_row { "true" } else { "false" };
        let tz = if self.ingest_timezone_override.is_empty() {
            "default"
        } else {
            self.ingest_timezone_override.as_str()
        };
        let plugin = if self.plugin_id.is_empty() {
            "default"
        } else {
            self.plugin_id.as_str()
        };
        let mut dir = String::from("file");
        if self.is_directory {
            dir = String::from("dir");
            if !self.file_pattern.is_empty() {
                dir.push(':');
                dir.push_str(&self.file_pattern);
            }
            if self.include_source_column {
                dir.push_str(":src");
            }
        }
        let mut key = format!("{}::{no_header}::{tz}::{plugin}::{dir}", self.jpath);
        if let Some(ft) = self.detected_file_type {
            key.push_str("::type:");
            key.push_str(&ft.to_string());
        }
        key
    }

    /// Returns `true` if all options are at their default values.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The timezone override, if one is set.
    pub fn timezone_override(&self) -> Option<&str> {
        if self.ingest_timezone_override.trim().is_empty() {
            None
        } else {
            Some(self.ingest_timezone_override.as_str())
        }
    }
}

/// One data row of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// 0-based position among the source's data rows (header excluded). Never reassigned.
    pub row_index: usize,
    /// Position in a query result; [`Row::UNASSIGNED`] until the query layer sets it.
    pub display_index: i64,
    /// Cell values in header order.
    pub data: Vec<String>,
    /// Epoch milliseconds parsed from the time column (meaningful only if `has_time`).
    pub timestamp: i64,
    pub has_time: bool,
}

impl Row {
    /// Sentinel for a display index that has not been assigned yet.
    pub const UNASSIGNED: i64 = -1;

    pub fn new(row_index: usize, data: Vec<String>) -> Self {
        Self {
            row_index,
            display_index: Self::UNASSIGNED,
            data,
            timestamp: 0,
            has_time: false,
        }
    }
}

/// Timestamp aggregates computed while rows are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampStats {
    pub time_field_idx: usize,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub valid_count: usize,
}

impl TimestampStats {
    pub fn new(time_field_idx: usize) -> Self {
        Self {
            time_field_idx,
            min_timestamp: 0,
            max_timestamp: 0,
            valid_count: 0,
        }
    }

    /// Fold one parsed timestamp into the aggregate.
    pub fn observe(&mut self, ms: i64) {
        if self.valid_count == 0 || ms < self.min_timestamp {
            self.min_timestamp = ms;
        }
        if self.valid_count == 0 || ms > self.max_timestamp {
            self.max_timestamp = ms;
        }
        self.valid_count += 1;
    }
}

/// Accumulates [`Row`]s and their [`TimestampStats`] in a single pass.
#[derive(Debug)]
pub struct RowBuilder {
    time_idx: Option<usize>,
    rows: Vec<Arc<Row>>,
    stats: Option<TimestampStats>,
}

impl RowBuilder {
    pub fn new(time_idx: Option<usize>) -> Self {
        Self {
            time_idx,
            rows: Vec::new(),
            stats: time_idx.map(TimestampStats::new),
        }
    }

    pub fn with_capacity(time_idx: Option<usize>, capacity: usize) -> Self {
        let mut b = Self::new(time_idx);
        b.rows.reserve(capacity);
        b
    }

    /// Append the next row. `parse` is called with the time cell, if the row has one.
    pub fn push<F>(&mut self, data: Vec<String>, parse: F)
    where
        F: FnOnce(&str) -> Option<i64>,
    {
        let mut row = Row::new(self.rows.len(), data);
        if let Some(idx) = self.time_idx {
            if let Some(ms) = row.data.get(idx).and_then(|cell| parse(cell.as_str())) {
                row.timestamp = ms;
                row.has_time = true;
                if let Some(stats) = self.stats.as_mut() {
                    stats.observe(ms);
                }
            }
        }
        self.rows.push(Arc::new(row));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn finish(self) -> (SharedRows, Option<TimestampStats>) {
        (self.rows.into(), self.stats)
    }
}

/// Result handed to the query layer.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Header of the result (identical to `original_header` at ingestion time).
    pub header: Vec<String>,
    /// Full source header.
    pub original_header: Vec<String>,
    /// Indices into `original_header` of the columns to display.
    pub display_columns: Vec<usize>,
    pub rows: SharedRows,
    pub timestamp_stats: Option<TimestampStats>,
}

impl StageResult {
    /// Build a result showing every column of `header`.
    pub fn identity(header: Vec<String>, rows: SharedRows, timestamp_stats: Option<TimestampStats>) -> Self {
        Self {
            display_columns: (0..header.len()).collect(),
            original_header: header.clone(),
            header,
            rows,
            timestamp_stats,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Files discovered under a directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryInfo {
    /// Absolute path of the directory.
    pub root_path: PathBuf,
    /// Absolute file paths in discovery order.
    pub files: Vec<PathBuf>,
    pub total_files: usize,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_virtual_files() {
        let a = FileOptions::with_jpath("$.a");
        let b = FileOptions::with_jpath("$.b");
        assert_ne!(a.key(), b.key());
        assert_eq!(FileOptions::default().key(), "::false::default::default::file");

        let mut dir = FileOptions::directory("*.csv");
        dir.include_source_column = true;
        assert_eq!(dir.key(), "::false::default::default::dir:*.csv:src");
    }

    #[test]
    fn key_includes_forced_type() {
        let mut opts = FileOptions::default();
        opts.detected_file_type = Some(FileType::Json);
        assert!(opts.key().ends_with("::type:JSON"));
        assert!(!opts.is_empty());
    }

    #[test]
    fn options_serialize_camel_case_and_skip_defaults() {
        let mut opts = FileOptions::with_jpath("$.items");
        opts.no_header_row = true;
        let json = serde_json::to_string(&opts).unwrap();
        assert_eq!(json, r#"{"jpath":"$.items","noHeaderRow":true}"#);

        let back: FileOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn row_builder_tracks_stats_in_one_pass() {
        let mut b = RowBuilder::new(Some(1));
        b.push(vec!["a".into(), "20".into()], |s| s.parse().ok());
        b.push(vec!["b".into(), "bad".into()], |s| s.parse().ok());
        b.push(vec!["c".into(), "10".into()], |s| s.parse().ok());
        b.push(vec!["d".into()], |s| s.parse().ok());
        let (rows, stats) = b.finish();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].row_index, 2);
        assert!(rows[0].has_time);
        assert!(!rows[1].has_time);
        assert!(!rows[3].has_time);
        assert_eq!(rows[0].display_index, Row::UNASSIGNED);

        let stats = stats.unwrap();
        assert_eq!(stats.min_timestamp, 10);
        assert_eq!(stats.max_timestamp, 20);
        assert_eq!(stats.valid_count, 2);
    }

    #[test]
    fn negative_timestamps_update_max_on_first_observation() {
        let mut stats = TimestampStats::new(0);
        stats.observe(-5);
        assert_eq!(stats.max_timestamp, -5);
        assert_eq!(stats.min_timestamp, -5);
    }
}
