//! Row-based cache for parsed JSON sources.
//!
//! JSON documents are parsed and flattened once per (file, JSONPath, time column, timezone)
//! combination; later reads share the same `Arc`'d rows. Headers are cached separately so a
//! reader that auto-detects its time column can compute the full cache key without parsing.
//!
//! Key layout:
//! - full data: `basedata:{path}::{jpath}::time:{idx|-1}::tz:{tz}`
//! - header only: `header:{path}::{jpath}`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::IngestionResult;
use crate::ingestion::{json, json_path};
use crate::session::IngestSession;
use crate::types::{RowBuilder, SharedRows, TimestampStats};

/// Parsed rows of one JSON source, as stored in the cache.
#[derive(Debug, Clone)]
pub struct BaseData {
    pub header: Vec<String>,
    pub rows: SharedRows,
    pub timestamp_stats: Option<TimestampStats>,
}

impl BaseData {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Storage used by [`get_or_parse_json_rows`].
///
/// `file_path` is passed alongside each key so implementations can evict per file.
pub trait RowCache: Send + Sync {
    fn get_base_data(&self, key: &str, file_path: &Path) -> Option<Arc<BaseData>>;
    fn store_base_data(&self, key: &str, file_path: &Path, data: Arc<BaseData>);
    fn get_header(&self, key: &str, file_path: &Path) -> Option<Vec<String>>;
    fn store_header(&self, key: &str, file_path: &Path, header: Vec<String>);
}

/// Cache key for fully parsed rows.
pub fn base_data_key(path: &Path, jpath: &str, time_idx: Option<usize>, timezone: &str) -> String {
    let idx = time_idx.map_or_else(|| "-1".to_owned(), |i| i.to_string());
    format!("basedata:{}::{jpath}::time:{idx}::tz:{timezone}", path.display())
}

/// Cache key for a header alone.
pub fn header_key(path: &Path, jpath: &str) -> String {
    format!("header:{}::{jpath}", path.display())
}

/// Process-local [`RowCache`] backed by two hash maps.
#[derive(Debug, Default)]
pub struct InMemoryRowCache {
    base: RwLock<HashMap<String, (PathBuf, Arc<BaseData>)>>,
    headers: RwLock<HashMap<String, (PathBuf, Vec<String>)>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl InMemoryRowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of full-data entries.
    pub fn len(&self) -> usize {
        self.base.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full-data lookups that found an entry.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Full-data lookups that found nothing.
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// Drop every entry (data and header) belonging to `file_path`.
    pub fn invalidate_file(&self, file_path: &Path) {
        if let Ok(mut m) = self.base.write() {
            m.retain(|_, (p, _)| p != file_path);
        }
        if let Ok(mut m) = self.headers.write() {
            m.retain(|_, (p, _)| p != file_path);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.base.write() {
            m.clear();
        }
        if let Ok(mut m) = self.headers.write() {
            m.clear();
        }
    }
}

impl RowCache for InMemoryRowCache {
    fn get_base_data(&self, key: &str, _file_path: &Path) -> Option<Arc<BaseData>> {
        let found = self
            .base
            .read()
            .ok()
            .and_then(|m| m.get(key).map(|(_, d)| Arc::clone(d)));
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn store_base_data(&self, key: &str, file_path: &Path, data: Arc<BaseData>) {
        if let Ok(mut m) = self.base.write() {
            m.insert(key.to_owned(), (file_path.to_path_buf(), data));
        }
    }

    fn get_header(&self, key: &str, _file_path: &Path) -> Option<Vec<String>> {
        self.headers
            .read()
            .ok()
            .and_then(|m| m.get(key).map(|(_, h)| h.clone()))
    }

    fn store_header(&self, key: &str, file_path: &Path, header: Vec<String>) {
        if let Ok(mut m) = self.headers.write() {
            m.insert(key.to_owned(), (file_path.to_path_buf(), header));
        }
    }
}

/// Parsed rows of a JSON source, from the cache when possible.
///
/// With `time_idx = None` the time column is auto-detected: a cached header is used to compute
/// the full key before falling back to a parse. After a parse both the rows and the header are
/// stored. Without a cache on the session every call parses.
pub fn get_or_parse_json_rows(
    session: &IngestSession,
    path: &Path,
    jpath: &str,
    time_idx: Option<usize>,
    timezone: &str,
) -> IngestionResult<Arc<BaseData>> {
    if let Some(cache) = session.cache() {
        let idx = match time_idx {
            Some(i) => Some(Some(i)),
            None => cache
                .get_header(&header_key(path, jpath), path)
                .map(|h| session.timestamps().detect_timestamp_index(&h)),
        };
        if let Some(idx) = idx {
            let key = base_data_key(path, jpath, idx, timezone);
            if let Some(hit) = cache.get_base_data(&key, path) {
                tracing::debug!(key = %key, rows = hit.row_count(), "row cache hit");
                return Ok(hit);
            }
        }
    }

    let doc = json::parse_json_file(session, path)?;
    let data = Arc::new(build_base_data(
        session,
        json_path::apply_json_path(&doc, jpath)?,
        time_idx,
        timezone,
    ));

    if let Some(cache) = session.cache() {
        let idx = data.timestamp_stats.as_ref().map(|s| s.time_field_idx);
        let key = base_data_key(path, jpath, idx, timezone);
        tracing::debug!(key = %key, rows = data.row_count(), "row cache store");
        cache.store_base_data(&key, path, Arc::clone(&data));
        cache.store_header(&header_key(path, jpath), path, data.header.clone());
    }
    Ok(data)
}

/// Parsed rows of in-memory JSON bytes, such as a decompressed stream. Never cached.
pub fn json_rows_from_bytes(
    session: &IngestSession,
    data: &[u8],
    jpath: &str,
    time_idx: Option<usize>,
    timezone: &str,
) -> IngestionResult<BaseData> {
    let table = json::json_table_from_bytes(data, jpath)?;
    Ok(build_base_data(session, table, time_idx, timezone))
}

fn build_base_data(
    session: &IngestSession,
    table: json_path::JsonTable,
    time_idx: Option<usize>,
    timezone: &str,
) -> BaseData {
    let resolver = session.timestamps();
    let idx = time_idx.or_else(|| resolver.detect_timestamp_index(&table.header));
    let mut builder = RowBuilder::with_capacity(idx, table.rows.len());
    for data in table.rows {
        builder.push(data, |cell| resolver.parse_timestamp_millis(cell, timezone));
    }
    let (rows, timestamp_stats) = builder.finish();
    BaseData {
        header: table.header,
        rows,
        timestamp_stats,
    }
}

/// Header of a JSON source. A cached header avoids parsing entirely.
pub fn json_header(session: &IngestSession, path: &Path, jpath: &str) -> IngestionResult<Vec<String>> {
    if let Some(h) = session
        .cache()
        .and_then(|c| c.get_header(&header_key(path, jpath), path))
    {
        return Ok(h);
    }
    let tz = session.timestamps().default_ingest_timezone();
    Ok(get_or_parse_json_rows(session, path, jpath, None, &tz)?.header.clone())
}

/// Row count of a JSON source.
pub fn json_row_count(
    session: &IngestSession,
    path: &Path,
    jpath: &str,
    timezone: &str,
) -> IngestionResult<usize> {
    Ok(get_or_parse_json_rows(session, path, jpath, None, timezone)?.row_count())
}
