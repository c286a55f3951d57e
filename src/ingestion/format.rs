//! Per-format strategy and the dispatching proxy.
//!
//! A source's [`FileType`] is resolved once, at open time, into a boxed [`FormatReader`]. Every
//! format answers the same three questions (header, row count, record stream) so callers never
//! switch on the type themselves.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{IngestionError, IngestionResult};
use crate::session::{CancellationToken, IngestSession};
use crate::types::{CompressionType, FileOptions, FileType};

use super::compression::{DecompressingReader, decompress_file, detect_compression_by_magic};
use super::detection::{compression_from_name, detect_file_type_and_compression_with_plugins};
use super::plugin::{PluginExecutor, PluginInfo};
use super::{csv as csv_format, directory, json};

/// Bytes handed to a [`FormatReader`].
#[derive(Debug, Clone)]
pub enum Input {
    /// Read the file directly (uncompressed sources, plugins, cached JSON).
    Path(PathBuf),
    /// Already decompressed content.
    Bytes(Vec<u8>),
}

/// Uniform contract implemented once per source format.
///
/// Streams returned by [`FormatReader::open`] start at the very first record, so a caller that
/// treats the first record as a header must skip it.
pub trait FormatReader: Send + Sync {
    fn file_type(&self) -> FileType;

    fn read_header(&self, input: &Input, options: &FileOptions) -> IngestionResult<Vec<String>>;

    /// Data rows, header excluded unless `no_header_row` is set.
    fn row_count(&self, input: &Input, options: &FileOptions) -> IngestionResult<usize>;

    fn open(&self, input: Input, options: &FileOptions) -> IngestionResult<RowStream>;
}

/// Sequential record source produced by a [`FormatReader`].
///
/// Yields `Err` for records that could not be decoded; the stream ends after an I/O error.
pub struct RowStream {
    inner: StreamInner,
    done: bool,
}

enum StreamInner {
    Csv(::csv::Reader<Box<dyn Read + Send>>),
    Records(std::vec::IntoIter<Vec<String>>),
}

impl RowStream {
    /// Stream the records of a CSV byte source.
    pub fn from_csv_reader<R: Read + Send + 'static>(reader: R) -> Self {
        let boxed: Box<dyn Read + Send> = Box::new(reader);
        Self {
            inner: StreamInner::Csv(csv_format::reader_builder().from_reader(boxed)),
            done: false,
        }
    }

    pub fn from_csv_bytes(data: Vec<u8>) -> Self {
        Self::from_csv_reader(Cursor::new(data))
    }

    /// Stream already materialized records.
    pub fn from_records(records: Vec<Vec<String>>) -> Self {
        Self {
            inner: StreamInner::Records(records.into_iter()),
            done: false,
        }
    }
}

impl Iterator for RowStream {
    type Item = IngestionResult<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match &mut self.inner {
            StreamInner::Records(it) => it.next().map(Ok),
            StreamInner::Csv(reader) => {
                let mut record = ::csv::ByteRecord::new();
                match reader.read_byte_record(&mut record) {
                    Ok(true) => Some(Ok(csv_format::record_to_strings(&record))),
                    Ok(false) => {
                        self.done = true;
                        None
                    }
                    Err(err) => {
                        if err.is_io_error() {
                            self.done = true;
                        }
                        Some(Err(err.into()))
                    }
                }
            }
        }
    }
}

/// Plugin strategy: the subprocess reads the file itself, so only [`Input::Path`] is accepted.
pub struct PluginFormat {
    executor: PluginExecutor,
}

impl PluginFormat {
    pub fn new(plugin: PluginInfo, cancel: CancellationToken) -> Self {
        Self {
            executor: PluginExecutor::with_cancellation(plugin, cancel),
        }
    }

    fn path<'a>(&self, input: &'a Input) -> IngestionResult<&'a Path> {
        match input {
            Input::Path(p) => Ok(p),
            Input::Bytes(_) => Err(IngestionError::format(format!(
                "plugin '{}' can only read files from disk",
                self.executor.plugin().id
            ))),
        }
    }
}

impl FormatReader for PluginFormat {
    fn file_type(&self) -> FileType {
        FileType::Plugin
    }

    fn read_header(&self, input: &Input, options: &FileOptions) -> IngestionResult<Vec<String>> {
        self.executor.read_header(self.path(input)?, options)
    }

    fn row_count(&self, input: &Input, _options: &FileOptions) -> IngestionResult<usize> {
        self.executor.row_count(self.path(input)?)
    }

    fn open(&self, input: Input, _options: &FileOptions) -> IngestionResult<RowStream> {
        let output = self.executor.stream(self.path(&input)?)?;
        Ok(RowStream::from_csv_bytes(output))
    }
}

/// A source whose format has been resolved.
pub struct ResolvedSource {
    pub path: PathBuf,
    pub file_type: FileType,
    pub compression: CompressionType,
    pub format: Box<dyn FormatReader>,
}

impl ResolvedSource {
    /// Input for this source, decompressing into memory where the format needs it.
    ///
    /// Partial decompression is recorded as a warning on the session; a clean read clears any
    /// stale warning for the path.
    pub fn input(&self, session: &IngestSession) -> IngestionResult<Input> {
        let direct = self.compression == CompressionType::None
            || matches!(self.file_type, FileType::Plugin | FileType::Json);
        if direct {
            return Ok(Input::Path(self.path.clone()));
        }
        let out = decompress_file(&self.path, self.compression)?;
        match out.warning {
            Some(w) => session.record_decompression_warning(&self.path, w),
            None => session.clear_decompression_warning(&self.path),
        }
        Ok(Input::Bytes(out.data))
    }
}

/// Format and compression of a single file.
///
/// Precedence: a forced `detected_file_type`, then an explicit `plugin_id`, then detection from
/// the name and magic bytes.
pub fn detect_source(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
) -> (FileType, CompressionType) {
    match options.detected_file_type {
        Some(forced) if forced != FileType::Unknown => {
            let compression = match compression_from_name(path) {
                CompressionType::None => detect_compression_by_magic(path),
                c => c,
            };
            (forced, compression)
        }
        _ if !options.plugin_id.is_empty() => (FileType::Plugin, CompressionType::None),
        _ => detect_file_type_and_compression_with_plugins(path, session.plugins()),
    }
}

/// Build the strategy for an already detected source.
pub fn source_for(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
    (file_type, compression): (FileType, CompressionType),
    cancel: &CancellationToken,
) -> IngestionResult<ResolvedSource> {
    let format: Box<dyn FormatReader> = match file_type {
        FileType::Csv => Box::new(csv_format::CsvFormat),
        #[cfg(feature = "excel")]
        FileType::Xlsx => Box::new(super::excel::XlsxFormat),
        #[cfg(not(feature = "excel"))]
        FileType::Xlsx => {
            return Err(IngestionError::format(
                "XLSX support is not enabled (build with the `excel` feature)",
            ));
        }
        FileType::Json => Box::new(json::JsonFormat::new(session.clone())),
        FileType::Plugin => {
            let plugin = session.plugins().resolve(path, options).ok_or_else(|| {
                IngestionError::format(format!("no plugin registered for {}", path.display()))
            })?;
            Box::new(PluginFormat::new(plugin.clone(), cancel.clone()))
        }
        FileType::Unknown => {
            return Err(IngestionError::format(format!(
                "unsupported file type: {}",
                path.display()
            )));
        }
    };

    Ok(ResolvedSource {
        path: path.to_path_buf(),
        file_type,
        compression,
        format,
    })
}

/// Detect and build the strategy for a single file.
pub fn resolve_format(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
    cancel: &CancellationToken,
) -> IngestionResult<ResolvedSource> {
    let detected = detect_source(session, path, options);
    tracing::debug!(
        path = %path.display(),
        file_type = %detected.0,
        compression = %detected.1,
        "resolved source format"
    );
    source_for(session, path, options, detected, cancel)
}

/// Header of a resolved source.
///
/// Compressed CSV only decodes as far as the first record.
pub fn read_source_header(
    session: &IngestSession,
    source: &ResolvedSource,
    options: &FileOptions,
) -> IngestionResult<Vec<String>> {
    if source.file_type == FileType::Csv && source.compression != CompressionType::None {
        let reader = DecompressingReader::open(&source.path, source.compression)?;
        return csv_format::read_header_from_reader(reader, options);
    }
    let input = source.input(session)?;
    source.format.read_header(&input, options)
}

/// Header of a single file.
pub fn read_header_with_options(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
) -> IngestionResult<Vec<String>> {
    let source = resolve_format(session, path, options, &CancellationToken::new())?;
    read_source_header(session, &source, options)
}

/// Data row count of a single file.
pub fn row_count_with_options(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
) -> IngestionResult<usize> {
    let source = resolve_format(session, path, options, &CancellationToken::new())?;
    let input = source.input(session)?;
    source.format.row_count(&input, options)
}

/// Record stream of a single file, positioned at the first record.
pub fn open_reader(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
    cancel: &CancellationToken,
) -> IngestionResult<RowStream> {
    let source = resolve_format(session, path, options, cancel)?;
    let input = source.input(session)?;
    source.format.open(input, options)
}

fn is_directory_source(path: &Path, options: &FileOptions) -> bool {
    options.is_directory || path.is_dir()
}

/// Header of a file or (union header of) a directory.
pub fn read_header_for_path(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
) -> IngestionResult<Vec<String>> {
    if is_directory_source(path, options) {
        let info = directory::discover_files(path, &directory::DiscoveryOptions::from_file_options(options))?;
        return directory::directory_header(session, &info, options);
    }
    read_header_with_options(session, path, options)
}

/// Row count of a file or the summed row count of a directory.
pub fn row_count_for_path(
    session: &IngestSession,
    path: &Path,
    options: &FileOptions,
) -> IngestionResult<usize> {
    if is_directory_source(path, options) {
        let info = directory::discover_files(path, &directory::DiscoveryOptions::from_file_options(options))?;
        return Ok(directory::directory_row_count(session, &info, options));
    }
    row_count_with_options(session, path, options)
}
