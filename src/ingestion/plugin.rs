//! Subprocess plugin protocol.
//!
//! A plugin is an external executable invoked as
//! `<exe> --mode=<header|count|stream> --file=<absolute path>`:
//!
//! - `header`: one CSV header line on stdout
//! - `count`: a single non-negative integer (data rows, header excluded)
//! - `stream`: a complete CSV document (header + rows)
//!
//! Exit code 0 means success. Any other exit status is a failure whose message is read from
//! stderr. Each invocation is a request/response exchange: [`PluginExecutor::execute`] spawns the
//! child, drains stdout and stderr on helper threads, and maps the exit status to a typed
//! [`PluginResponse`].

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{IngestionError, IngestionResult};
use crate::session::CancellationToken;
use crate::types::FileOptions;

use super::headers::{normalize_headers, synthetic_headers};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Registered plugin executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub exec_path: PathBuf,
    /// Handled extensions, with leading dot (`.evtx`). Matched case-insensitively.
    pub extensions: Vec<String>,
}

impl PluginInfo {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        exec_path: impl Into<PathBuf>,
        extensions: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            exec_path: exec_path.into(),
            extensions: extensions.iter().map(|e| normalize_extension(e)).collect(),
        }
    }

    pub fn handles_extension(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.extensions.iter().any(|e| *e == ext)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') { ext } else { format!(".{ext}") }
}

/// Plugins known to a session. Registration order decides ties between plugins that claim the
/// same extension.
#[derive(Debug, Clone, Default)]
pub struct PluginTable {
    plugins: Vec<PluginInfo>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin, replacing any previous plugin with the same id.
    pub fn register(&mut self, plugin: PluginInfo) {
        self.plugins.retain(|p| p.id != plugin.id);
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&PluginInfo> {
        self.plugins.iter().find(|p| p.id == id)
    }

    /// First plugin claiming `ext` (with or without leading dot).
    pub fn for_extension(&self, ext: &str) -> Option<&PluginInfo> {
        self.plugins.iter().find(|p| p.handles_extension(ext))
    }

    /// Plugin for a file: the explicit `plugin_id` if given, else by extension.
    pub fn resolve(&self, path: &Path, options: &FileOptions) -> Option<&PluginInfo> {
        if !options.plugin_id.is_empty() {
            return self.by_id(&options.plugin_id);
        }
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.for_extension(e))
    }
}

/// Invocation mode passed as `--mode=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginMode {
    Header,
    Count,
    Stream,
}

impl fmt::Display for PluginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Count => "count",
            Self::Stream => "stream",
        })
    }
}

/// One request sent to a plugin.
#[derive(Debug, Clone)]
pub struct PluginRequest {
    pub mode: PluginMode,
    pub file: PathBuf,
}

/// Everything a finished plugin process produced.
#[derive(Debug, Clone)]
pub struct PluginResponse {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl PluginResponse {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }
}

/// Runs one plugin under a cancellation token.
#[derive(Debug, Clone)]
pub struct PluginExecutor {
    plugin: PluginInfo,
    cancel: CancellationToken,
}

impl PluginExecutor {
    pub fn new(plugin: PluginInfo) -> Self {
        Self::with_cancellation(plugin, CancellationToken::new())
    }

    pub fn with_cancellation(plugin: PluginInfo, cancel: CancellationToken) -> Self {
        Self { plugin, cancel }
    }

    pub fn plugin(&self) -> &PluginInfo {
        &self.plugin
    }

    fn error(&self, message: impl Into<String>) -> IngestionError {
        IngestionError::Plugin {
            plugin: self.plugin.name.clone(),
            message: message.into(),
        }
    }

    /// Spawn the plugin, wait for it and collect its output.
    ///
    /// Only spawn and wait failures are errors here; a non-zero exit is reported through
    /// [`PluginResponse::status`].
    pub fn execute(&self, request: &PluginRequest) -> IngestionResult<PluginResponse> {
        let file = std::path::absolute(&request.file)?;
        tracing::debug!(
            plugin = %self.plugin.id,
            mode = %request.mode,
            file = %file.display(),
            "running plugin"
        );

        let mut child = Command::new(&self.plugin.exec_path)
            .arg(format!("--mode={}", request.mode))
            .arg(format!("--file={}", file.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.error(format!("failed to start {}: {e}", self.plugin.exec_path.display())))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.wait(&mut child) {
            Ok(status) => status,
            Err(err) => {
                let _ = stdout.join();
                let _ = stderr.join();
                return Err(err);
            }
        };

        Ok(PluginResponse {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn wait(&self, child: &mut Child) -> IngestionResult<ExitStatus> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(plugin = %self.plugin.id, "cancelling plugin");
                let _ = child.kill();
                let _ = child.wait();
                return Err(IngestionError::Cancelled);
            }
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run `mode` against `file` and return stdout, failing on a non-zero exit.
    pub fn run(&self, mode: PluginMode, file: &Path) -> IngestionResult<Vec<u8>> {
        let response = self.execute(&PluginRequest {
            mode,
            file: file.to_path_buf(),
        })?;
        if !response.success() {
            let stderr = response.stderr_text();
            let message = if stderr.is_empty() {
                format!("exited with {}", response.status)
            } else {
                format!("exited with {}: {stderr}", response.status)
            };
            return Err(self.error(message));
        }
        Ok(response.stdout)
    }

    /// Header of `file`. With `no_header_row` the plugin is run in stream mode and the width of
    /// the first record determines the synthetic header.
    pub fn read_header(&self, file: &Path, options: &FileOptions) -> IngestionResult<Vec<String>> {
        let mode = if options.no_header_row {
            PluginMode::Stream
        } else {
            PluginMode::Header
        };
        let output = self.run(mode, file)?;
        let first = first_csv_record(&output)
            .map_err(|e| self.error(format!("returned invalid CSV: {e}")))?
            .ok_or_else(|| self.error("returned empty header"))?;
        if options.no_header_row {
            Ok(synthetic_headers(first.len()))
        } else {
            Ok(normalize_headers(&first))
        }
    }

    /// Number of data rows reported by the plugin.
    pub fn row_count(&self, file: &Path) -> IngestionResult<usize> {
        let output = self.run(PluginMode::Count, file)?;
        let text = String::from_utf8_lossy(&output);
        let text = text.trim();
        let n: i64 = text
            .parse()
            .map_err(|e| self.error(format!("returned invalid count {text:?}: {e}")))?;
        usize::try_from(n).map_err(|_| self.error(format!("returned negative count: {n}")))
    }

    /// Full CSV output (header + rows).
    pub fn stream(&self, file: &Path) -> IngestionResult<Vec<u8>> {
        self.run(PluginMode::Stream, file)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn first_csv_record(data: &[u8]) -> Result<Option<Vec<String>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut record = csv::ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        return Ok(None);
    }
    Ok(Some(
        record
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect(),
    ))
}
