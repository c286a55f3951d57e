//! Unified reader facade.
//!
//! [`FileReader`] turns one logical source (a file or a directory, plus its [`FileOptions`])
//! into a [`StageResult`]:
//!
//! - directories are read through [`super::directory::DirectoryReader`];
//! - JSON goes through the session row cache, so repeated reads share rows;
//! - everything else is streamed record by record.
//!
//! The time column is the explicit index when one is given, otherwise whatever the session's
//! [`crate::timestamps::TimestampResolver`] detects in the header. Cancellation is checked once
//! per row and yields [`IngestionError::Cancelled`] with no partial result.
//!
//! # Examples
//!
//! ```no_run
//! use evidence_loader::ingestion::FileReader;
//! use evidence_loader::{FileOptions, IngestSession};
//!
//! # fn main() -> Result<(), evidence_loader::IngestionError> {
//! let session = IngestSession::new();
//! let reader = FileReader::new(&session, "events.csv", FileOptions::default());
//! let result = reader.read_rows()?;
//! println!("rows={} header={:?}", result.row_count(), result.header);
//! # Ok(())
//! # }
//! ```
//!
//! ## JSON through a JSONPath, newest first
//!
//! ```no_run
//! use evidence_loader::ingestion::FileReader;
//! use evidence_loader::{FileOptions, IngestSession};
//!
//! # fn main() -> Result<(), evidence_loader::IngestionError> {
//! let session = IngestSession::new();
//! let reader = FileReader::new(&session, "alerts.json.gz", FileOptions::with_jpath("$.alerts"));
//! let result = reader.read_rows_with_sort(None, true)?;
//! if let Some(stats) = result.timestamp_stats {
//!     println!("{} rows with time, newest {}", stats.valid_count, stats.max_timestamp);
//! }
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::cache;
use crate::error::{IngestionError, IngestionResult};
use crate::session::{CancellationToken, IngestSession};
use crate::types::{
    CompressionType, DirectoryInfo, FileOptions, FileType, Row, RowBuilder, SharedRows, StageResult, TimestampStats,
};

use super::directory::{self, DirectoryReader, DiscoveryOptions};
use super::format::{ResolvedSource, detect_source, read_source_header, source_for};
use super::json::required_jpath;
use super::observability::{
    IngestionContext, IngestionObserver, IngestionProgress, IngestionSeverity, IngestionStats,
};

/// Rows between two progress callbacks.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 1000;

/// Facade configuration: progress cadence and observer.
#[derive(Clone)]
pub struct ReaderConfig {
    /// Rows between two `on_progress` callbacks (0 disables periodic progress).
    pub progress_interval: usize,
    /// Optional observer for progress, warnings and outcomes.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("progress_interval", &self.progress_interval)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Directory,
    File(FileType, CompressionType),
}

/// Reads one logical source into a [`StageResult`].
///
/// The source kind (directory, or file format plus compression) is resolved once in
/// [`FileReader::new`] and never changes afterwards.
pub struct FileReader {
    path: PathBuf,
    options: FileOptions,
    session: IngestSession,
    config: ReaderConfig,
    cancel: CancellationToken,
    kind: SourceKind,
    timezone: String,
    header: OnceLock<Vec<String>>,
    row_count: Mutex<Option<usize>>,
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("kind", &self.kind)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl FileReader {
    pub fn new(session: &IngestSession, path: impl AsRef<Path>, options: FileOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        let kind = if options.is_directory || directory::is_directory(&path) {
            SourceKind::Directory
        } else {
            let (file_type, compression) = detect_source(session, &path, &options);
            SourceKind::File(file_type, compression)
        };
        Self {
            timezone: session.effective_timezone(&options),
            path,
            options,
            session: session.clone(),
            config: ReaderConfig::default(),
            cancel: CancellationToken::new(),
            kind,
            header: OnceLock::new(),
            row_count: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `token` to cancel reads (and running plugins) from another thread.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    pub fn is_directory(&self) -> bool {
        self.kind == SourceKind::Directory
    }

    /// Resolved format; [`FileType::Unknown`] for directories.
    pub fn file_type(&self) -> FileType {
        match self.kind {
            SourceKind::Directory => FileType::Unknown,
            SourceKind::File(ft, _) => ft,
        }
    }

    pub fn compression(&self) -> CompressionType {
        match self.kind {
            SourceKind::Directory => CompressionType::None,
            SourceKind::File(_, c) => c,
        }
    }

    /// Timezone used for the time column.
    pub fn ingest_timezone(&self) -> &str {
        &self.timezone
    }

    /// Row count of the last completed read, if any.
    pub fn estimate_row_count(&self) -> Option<usize> {
        self.row_count.lock().ok().and_then(|g| *g)
    }

    fn set_row_count(&self, n: usize) {
        if let Ok(mut g) = self.row_count.lock() {
            *g = Some(n);
        }
    }

    fn remember_header(&self, header: &[String]) {
        let _ = self.header.set(header.to_vec());
    }

    fn source(&self) -> IngestionResult<ResolvedSource> {
        match self.kind {
            SourceKind::Directory => Err(IngestionError::format("directory sources have no single format")),
            SourceKind::File(ft, c) => source_for(&self.session, &self.path, &self.options, (ft, c), &self.cancel),
        }
    }

    fn discover(&self) -> IngestionResult<DirectoryInfo> {
        directory::discover_files(&self.path, &DiscoveryOptions::from_file_options(&self.options))
    }

    /// Header of the source (the union header for directories). Cached after the first call.
    pub fn header(&self) -> IngestionResult<Vec<String>> {
        if let Some(h) = self.header.get() {
            return Ok(h.clone());
        }
        let header = match self.kind {
            SourceKind::Directory => directory::directory_header(&self.session, &self.discover()?, &self.options)?,
            SourceKind::File(FileType::Json, _) => {
                let jpath = required_jpath(&self.options)?;
                cache::json_header(&self.session, &self.path, jpath)?
            }
            SourceKind::File(..) => read_source_header(&self.session, &self.source()?, &self.options)?,
        };
        self.remember_header(&header);
        Ok(header)
    }

    /// All rows in source order, time column auto-detected.
    pub fn read_rows(&self) -> IngestionResult<StageResult> {
        self.load(None, None)
    }

    /// All rows in source order, with the time column at `time_idx` (`None` to auto-detect).
    pub fn read_rows_with_time_idx(&self, time_idx: Option<usize>) -> IngestionResult<StageResult> {
        self.load(time_idx, None)
    }

    /// All rows sorted by timestamp. Rows without a timestamp come last in both directions and
    /// ties keep source order.
    pub fn read_rows_with_sort(&self, time_idx: Option<usize>, desc: bool) -> IngestionResult<StageResult> {
        self.load(time_idx, Some(desc))
    }

    fn context(&self) -> IngestionContext {
        IngestionContext {
            path: self.path.clone(),
            file_type: self.file_type(),
            is_directory: self.is_directory(),
        }
    }

    fn load(&self, time_idx: Option<usize>, sort: Option<bool>) -> IngestionResult<StageResult> {
        let ctx = self.context();
        let result = match self.kind {
            SourceKind::Directory => self.load_directory(&ctx, time_idx, sort),
            SourceKind::File(FileType::Json, _) => self.load_json(&ctx, time_idx, sort),
            SourceKind::File(..) => self.load_streaming(&ctx, time_idx, sort),
        };

        match &result {
            Ok(r) => {
                self.set_row_count(r.row_count());
                tracing::debug!(path = %self.path.display(), rows = r.row_count(), "read complete");
                if let Some(obs) = &self.config.observer {
                    obs.on_success(&ctx, IngestionStats { rows: r.row_count() });
                }
            }
            Err(e) => {
                let sev = IngestionSeverity::for_error(e);
                if e.is_cancelled() {
                    tracing::info!(path = %self.path.display(), "read cancelled");
                } else {
                    tracing::warn!(path = %self.path.display(), error = %e, "read failed");
                }
                if let Some(obs) = &self.config.observer {
                    obs.on_failure(&ctx, sev, e);
                    if sev >= self.config.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }
        result
    }

    fn progress(&self, ctx: &IngestionContext, stage: &'static str, current: usize, total: Option<usize>, message: String) {
        if let Some(obs) = &self.config.observer {
            obs.on_progress(
                ctx,
                &IngestionProgress {
                    stage,
                    current,
                    total,
                    message,
                },
            );
        }
    }

    fn warn(&self, ctx: &IngestionContext, message: &str) {
        tracing::warn!(path = %self.path.display(), "{message}");
        if let Some(obs) = &self.config.observer {
            obs.on_warning(ctx, message);
        }
    }

    fn resolve_time_idx(&self, header: &[String], explicit: Option<usize>) -> Option<usize> {
        explicit.or_else(|| self.session.timestamps().detect_timestamp_index(header))
    }

    /// Drain `rows` into a builder, honoring cancellation and progress cadence.
    fn collect_rows<I>(
        &self,
        ctx: &IngestionContext,
        rows: I,
        time_idx: Option<usize>,
        suffix: &str,
    ) -> IngestionResult<(SharedRows, Option<TimestampStats>)>
    where
        I: Iterator<Item = IngestionResult<Vec<String>>>,
    {
        let resolver = self.session.timestamps();
        let total = self.estimate_row_count();
        let mut builder = RowBuilder::with_capacity(time_idx, total.unwrap_or(0));

        for row in rows {
            if self.cancel.is_cancelled() {
                return Err(IngestionError::Cancelled);
            }
            match row {
                Ok(data) => builder.push(data, |cell| resolver.parse_timestamp_millis(cell, &self.timezone)),
                Err(err) => {
                    self.warn(ctx, &format!("skipping unreadable row after {} rows: {err}", builder.len()));
                    continue;
                }
            }
            let n = builder.len();
            if self.config.progress_interval > 0 && n % self.config.progress_interval == 0 {
                self.progress(ctx, "reading", n, total, format!("Read {n} rows{suffix}"));
            }
        }
        let n = builder.len();
        self.progress(ctx, "reading", n, Some(n), format!("Completed reading {n} rows{suffix}"));
        Ok(builder.finish())
    }

    fn finish(
        &self,
        ctx: &IngestionContext,
        header: Vec<String>,
        rows: SharedRows,
        stats: Option<TimestampStats>,
        sort: Option<bool>,
        time_idx: Option<usize>,
    ) -> StageResult {
        let rows = match (sort, time_idx) {
            (Some(desc), Some(_)) => {
                let sorted = sorted_by_time(&rows, desc);
                let n = sorted.len();
                self.progress(ctx, "sorting", n, Some(n), format!("Sorted {n} rows"));
                sorted
            }
            _ => rows,
        };
        StageResult::identity(header, rows, stats)
    }

    fn load_streaming(
        &self,
        ctx: &IngestionContext,
        explicit_idx: Option<usize>,
        sort: Option<bool>,
    ) -> IngestionResult<StageResult> {
        let header = self.header()?;
        let time_idx = self.resolve_time_idx(&header, explicit_idx);

        let source = self.source()?;
        let input = source.input(&self.session)?;
        if let Some(w) = self.session.decompression_warning(&self.path) {
            self.warn(ctx, &w);
        }
        let mut stream = source.format.open(input, &self.options)?;
        if !self.options.no_header_row {
            stream.next();
        }

        let (rows, stats) = self.collect_rows(ctx, stream, time_idx, "")?;
        Ok(self.finish(ctx, header, rows, stats, sort, time_idx))
    }

    fn load_json(
        &self,
        ctx: &IngestionContext,
        explicit_idx: Option<usize>,
        sort: Option<bool>,
    ) -> IngestionResult<StageResult> {
        let jpath = required_jpath(&self.options)?;
        let data = cache::get_or_parse_json_rows(&self.session, &self.path, jpath, explicit_idx, &self.timezone)?;
        if self.cancel.is_cancelled() {
            return Err(IngestionError::Cancelled);
        }
        self.remember_header(&data.header);
        if let Some(w) = self.session.decompression_warning(&self.path) {
            self.warn(ctx, &w);
        }

        let n = data.row_count();
        self.progress(ctx, "reading", n, Some(n), format!("Loaded {n} rows from JSON cache"));

        let time_idx = data.timestamp_stats.map(|s| s.time_field_idx).or(explicit_idx);
        Ok(self.finish(
            ctx,
            data.header.clone(),
            Arc::clone(&data.rows),
            data.timestamp_stats,
            sort,
            time_idx,
        ))
    }

    fn load_directory(
        &self,
        ctx: &IngestionContext,
        explicit_idx: Option<usize>,
        sort: Option<bool>,
    ) -> IngestionResult<StageResult> {
        let info = self.discover()?;
        let reader = DirectoryReader::with_cancellation(
            self.session.clone(),
            info,
            self.options.clone(),
            self.cancel.clone(),
        )?;
        let header = reader.header().to_vec();
        self.remember_header(&header);
        let time_idx = self.resolve_time_idx(&header, explicit_idx);

        let (rows, stats) = self.collect_rows(ctx, reader.map(Ok), time_idx, " from directory")?;
        Ok(self.finish(ctx, header, rows, stats, sort, time_idx))
    }
}

/// Copy of `rows` ordered by timestamp. The shared slice itself is left untouched.
pub fn sorted_by_time(rows: &SharedRows, desc: bool) -> SharedRows {
    let mut sorted: Vec<Arc<Row>> = rows.to_vec();
    sorted.sort_by(|a, b| compare_by_time(a, b, desc));
    sorted.into()
}

fn compare_by_time(a: &Row, b: &Row, desc: bool) -> Ordering {
    match (a.has_time, b.has_time) {
        (true, true) => {
            let ord = a.timestamp.cmp(&b.timestamp);
            let ord = if desc { ord.reverse() } else { ord };
            ord.then(a.row_index.cmp(&b.row_index))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.row_index.cmp(&b.row_index),
    }
}
