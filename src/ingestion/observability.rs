use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IngestionError;
use crate::types::FileType;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event (including cancellation).
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity of a terminal error.
    pub fn for_error(error: &IngestionError) -> Self {
        match error {
            IngestionError::Io(_) => Self::Critical,
            IngestionError::Csv(err) if err.is_io_error() => Self::Critical,
            IngestionError::Cancelled => Self::Info,
            _ => Self::Error,
        }
    }
}

/// Context about a read.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// The path being read (file or directory).
    pub path: PathBuf,
    /// Resolved format; [`FileType::Unknown`] for directories.
    pub file_type: FileType,
    pub is_directory: bool,
}

/// Minimal stats reported on a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of rows read.
    pub rows: usize,
}

/// Periodic progress of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionProgress {
    pub stage: &'static str,
    pub current: usize,
    /// Known total, when an estimate was available.
    pub total: Option<usize>,
    pub message: String,
}

/// Observer interface for ingestion events.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called every progress interval and once when reading completes.
    fn on_progress(&self, _ctx: &IngestionContext, _progress: &IngestionProgress) {}

    /// Called for non-fatal problems (skipped rows, partial decompression).
    fn on_warning(&self, _ctx: &IngestionContext, _message: &str) {}

    /// Called when a read succeeds.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when a read fails or is cancelled.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_progress(&self, ctx: &IngestionContext, progress: &IngestionProgress) {
        for o in &self.observers {
            o.on_progress(ctx, progress);
        }
    }

    fn on_warning(&self, ctx: &IngestionContext, message: &str) {
        for o in &self.observers {
            o.on_warning(ctx, message);
        }
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_progress(&self, ctx: &IngestionContext, progress: &IngestionProgress) {
        tracing::debug!(
            path = %ctx.path.display(),
            stage = progress.stage,
            current = progress.current,
            total = ?progress.total,
            "{}",
            progress.message
        );
    }

    fn on_warning(&self, ctx: &IngestionContext, message: &str) {
        tracing::warn!(path = %ctx.path.display(), file_type = %ctx.file_type, "{message}");
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::info!(
            path = %ctx.path.display(),
            file_type = %ctx.file_type,
            rows = stats.rows,
            "ingest ok"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::error!(
            path = %ctx.path.display(),
            file_type = %ctx.file_type,
            severity = ?severity,
            error = %error,
            "ingest failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        tracing::error!(
            path = %ctx.path.display(),
            file_type = %ctx.file_type,
            severity = ?severity,
            error = %error,
            "ALERT ingest failed"
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_warning(&self, ctx: &IngestionContext, message: &str) {
        self.append_line(&format!(
            "{} warn type={} path={} msg={message}",
            unix_ts(),
            ctx.file_type,
            ctx.path.display()
        ));
    }

    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok type={} path={} rows={}",
            unix_ts(),
            ctx.file_type,
            ctx.path.display(),
            stats.rows
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} fail severity={severity:?} type={} path={} err={error}",
            unix_ts(),
            ctx.file_type,
            ctx.path.display()
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "{} ALERT severity={severity:?} type={} path={} err={error}",
            unix_ts(),
            ctx.file_type,
            ctx.path.display()
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_error_kind() {
        let io = IngestionError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(IngestionSeverity::for_error(&io), IngestionSeverity::Critical);
        assert_eq!(IngestionSeverity::for_error(&IngestionError::Cancelled), IngestionSeverity::Info);
        assert_eq!(
            IngestionSeverity::for_error(&IngestionError::format("bad")),
            IngestionSeverity::Error
        );
        assert!(IngestionSeverity::Critical > IngestionSeverity::Error);
    }
}
