//! Directory sources: many files read as one union-schema table.
//!
//! Discovery walks the directory depth first in file-name order and keeps files whose path
//! relative to the root matches the glob pattern (`*.csv` only matches top-level files,
//! `**/*.json.gz` matches at any depth). Exclude patterns are matched against the base name.
//!
//! The union header lists columns in order of first appearance across files, with
//! `__source_file__` last when requested. [`DirectoryReader`] then opens one file at a time and
//! maps each row onto the union header by column name.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{IngestionError, IngestionResult};
use crate::session::{CancellationToken, IngestSession};
use crate::types::{DirectoryInfo, FileOptions, SOURCE_FILE_COLUMN};

use super::format::{RowStream, read_header_with_options, resolve_format, row_count_with_options};

/// Controls file discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Glob pattern matched against the path relative to the root. Required.
    pub pattern: String,
    /// Base-name patterns that drop an otherwise matching file.
    pub exclude_patterns: Vec<String>,
    /// Stop after this many files.
    pub max_files: Option<usize>,
    /// Deepest level to descend to; `Some(1)` keeps only files directly under the root.
    pub max_depth: Option<usize>,
}

impl DiscoveryOptions {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn from_file_options(options: &FileOptions) -> Self {
        Self::new(options.file_pattern.clone())
    }
}

/// Snapshot passed to a discovery progress callback after each accepted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryProgress {
    pub files_found: usize,
    pub dirs_scanned: usize,
    pub current_path: PathBuf,
    pub total_size: u64,
}

/// Returns `true` if `path` exists and is a directory.
pub fn is_directory(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_dir()
}

fn discovery_error(message: impl Into<String>) -> IngestionError {
    IngestionError::Discovery {
        message: message.into(),
    }
}

/// Find the files under `dir` matching `options`.
pub fn discover_files(dir: impl AsRef<Path>, options: &DiscoveryOptions) -> IngestionResult<DirectoryInfo> {
    discover_files_with_progress(dir, options, |_| {})
}

/// [`discover_files`] with a callback invoked after each accepted file.
pub fn discover_files_with_progress<F>(
    dir: impl AsRef<Path>,
    options: &DiscoveryOptions,
    mut progress: F,
) -> IngestionResult<DirectoryInfo>
where
    F: FnMut(&DiscoveryProgress),
{
    if options.pattern.trim().is_empty() {
        return Err(discovery_error("file pattern is required (e.g., *.json.gz, *.csv)"));
    }
    let root = std::path::absolute(dir.as_ref())?;
    if !root.is_dir() {
        return Err(discovery_error(format!("not a directory: {}", root.display())));
    }

    let pattern = Pattern::new(&options.pattern)
        .map_err(|e| discovery_error(format!("invalid pattern {:?}: {e}", options.pattern)))?;
    let excludes = options
        .exclude_patterns
        .iter()
        .map(|p| Pattern::new(p).map_err(|e| discovery_error(format!("invalid exclude pattern {p:?}: {e}"))))
        .collect::<IngestionResult<Vec<_>>>()?;
    let match_opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut walker = WalkDir::new(&root).follow_links(true).sort_by_file_name();
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    let mut info = DirectoryInfo {
        root_path: root.clone(),
        ..Default::default()
    };
    let mut dirs_scanned = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            dirs_scanned += 1;
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        if !pattern.matches_path_with(rel, match_opts) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if excludes.iter().any(|p| p.matches(&name)) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };

        info.files.push(entry.path().to_path_buf());
        info.total_size += meta.len();
        progress(&DiscoveryProgress {
            files_found: info.files.len(),
            dirs_scanned,
            current_path: entry.path().to_path_buf(),
            total_size: info.total_size,
        });

        if options.max_files.is_some_and(|max| info.files.len() >= max) {
            break;
        }
    }

    info.total_files = info.files.len();
    tracing::debug!(
        root = %root.display(),
        files = info.total_files,
        bytes = info.total_size,
        "directory discovery finished"
    );
    Ok(info)
}

/// Options for reading one member file of a directory source.
fn member_options(options: &FileOptions) -> FileOptions {
    FileOptions {
        is_directory: false,
        file_pattern: String::new(),
        include_source_column: false,
        ..options.clone()
    }
}

/// Union header of all files, in order of first appearance.
///
/// Files whose header cannot be read are skipped. With `include_source_column`, a member
/// column named [`SOURCE_FILE_COLUMN`] is not part of the union; the appended source column
/// takes its place.
pub fn directory_header(
    session: &IngestSession,
    info: &DirectoryInfo,
    options: &FileOptions,
) -> IngestionResult<Vec<String>> {
    let member = member_options(options);
    let mut header: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for file in &info.files {
        match read_header_with_options(session, file, &member) {
            Ok(file_header) => {
                for col in file_header {
                    if options.include_source_column && col == SOURCE_FILE_COLUMN {
                        continue;
                    }
                    if seen.insert(col.clone()) {
                        header.push(col);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "skipping file without readable header");
            }
        }
    }

    if header.is_empty() {
        return Err(discovery_error("no valid headers found in any files"));
    }
    if options.include_source_column {
        header.push(SOURCE_FILE_COLUMN.to_owned());
    }
    Ok(header)
}

/// Total data rows across all files. Files that cannot be counted contribute nothing.
pub fn directory_row_count(session: &IngestSession, info: &DirectoryInfo, options: &FileOptions) -> usize {
    let member = member_options(options);
    info.files
        .iter()
        .map(|file| match row_count_with_options(session, file, &member) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "skipping file in row count");
                0
            }
        })
        .sum()
}

fn relative_display(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .into_owned()
}

struct OpenFile {
    stream: RowStream,
    /// Union index for each column of this file's header.
    mapping: Vec<Option<usize>>,
    source: String,
}

/// Pull iterator over the rows of every file, mapped onto the union header.
///
/// At most one file is open at a time. Files that fail to open and rows that fail to decode are
/// skipped with a warning.
pub struct DirectoryReader {
    session: IngestSession,
    info: DirectoryInfo,
    options: FileOptions,
    cancel: CancellationToken,
    header: Vec<String>,
    columns: HashMap<String, usize>,
    source_col: Option<usize>,
    next_file: usize,
    current: Option<OpenFile>,
}

impl DirectoryReader {
    pub fn new(session: IngestSession, info: DirectoryInfo, options: FileOptions) -> IngestionResult<Self> {
        Self::with_cancellation(session, info, options, CancellationToken::new())
    }

    /// Reader whose plugin invocations observe `cancel`.
    pub fn with_cancellation(
        session: IngestSession,
        info: DirectoryInfo,
        options: FileOptions,
        cancel: CancellationToken,
    ) -> IngestionResult<Self> {
        let header = directory_header(&session, &info, &options)?;
        let source_col = options.include_source_column.then(|| header.len() - 1);
        let columns = header
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self {
            session,
            info,
            options: member_options(&options),
            cancel,
            header,
            columns,
            source_col,
            next_file: 0,
            current: None,
        })
    }

    /// The union header.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn info(&self) -> &DirectoryInfo {
        &self.info
    }

    fn open_file(&self, file: &Path) -> IngestionResult<OpenFile> {
        let source = resolve_format(&self.session, file, &self.options, &self.cancel)?;
        let input = source.input(&self.session)?;
        let file_header = source.format.read_header(&input, &self.options)?;
        let mut stream = source.format.open(input, &self.options)?;
        if !self.options.no_header_row {
            stream.next();
        }
        let mapping = file_header.iter().map(|col| self.columns.get(col).copied()).collect();
        Ok(OpenFile {
            stream,
            mapping,
            source: relative_display(&self.info.root_path, file),
        })
    }
}

fn unify(width: usize, source_col: Option<usize>, file: &OpenFile, row: Vec<String>) -> Vec<String> {
    let mut out = vec![String::new(); width];
    for (value, target) in row.into_iter().zip(&file.mapping) {
        if let Some(idx) = target {
            out[*idx] = value;
        }
    }
    if let Some(idx) = source_col {
        out[idx] = file.source.clone();
    }
    out
}

impl Iterator for DirectoryReader {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let file = self.info.files.get(self.next_file)?.clone();
                self.next_file += 1;
                match self.open_file(&file) {
                    Ok(open) => {
                        tracing::debug!(file = %file.display(), "reading directory member");
                        self.current = Some(open);
                    }
                    Err(err) => {
                        tracing::warn!(file = %file.display(), error = %err, "skipping unreadable file");
                        continue;
                    }
                }
            }

            let current = self.current.as_mut()?;
            match current.stream.next() {
                Some(Ok(row)) => {
                    return Some(unify(self.header.len(), self.source_col, current, row));
                }
                Some(Err(err)) => {
                    tracing::warn!(source = %current.source, error = %err, "skipping undecodable row");
                }
                None => self.current = None,
            }
        }
    }
}

fn file_digest(path: &Path) -> io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

/// Content identity of a directory source.
///
/// SHA-256 over, for each file in sorted path order, the file's own SHA-256 followed by its
/// path relative to the root. Unreadable files are left out. File digests are computed in
/// parallel.
pub fn directory_hash(info: &DirectoryInfo) -> IngestionResult<String> {
    if info.files.is_empty() {
        return Err(discovery_error("no files in directory info"));
    }
    let mut files = info.files.clone();
    files.sort();

    let digests: Vec<Option<Vec<u8>>> = files
        .par_iter()
        .map(|f| match file_digest(f) {
            Ok(d) => Some(d),
            Err(err) => {
                tracing::warn!(file = %f.display(), error = %err, "skipping file in directory hash");
                None
            }
        })
        .collect();

    let mut combined = Vec::new();
    for (file, digest) in files.iter().zip(digests) {
        let (Some(digest), Ok(rel)) = (digest, file.strip_prefix(&info.root_path)) else {
            continue;
        };
        combined.extend_from_slice(&digest);
        combined.extend_from_slice(rel.to_string_lossy().as_bytes());
    }
    if combined.is_empty() {
        return Err(discovery_error("failed to hash any files in directory"));
    }
    Ok(hex::encode(Sha256::digest(&combined)))
}

/// Summary shown before a directory is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryPreview {
    /// Discovered files, relative to the root.
    pub files: Vec<String>,
    pub headers: Vec<String>,
    pub total_files: usize,
    pub total_size: u64,
}

/// Discover up to `max_files` files (`0` for no limit) and compute their union header.
pub fn preview_directory(
    session: &IngestSession,
    dir: impl AsRef<Path>,
    pattern: &str,
    jpath: &str,
    max_files: usize,
) -> IngestionResult<DirectoryPreview> {
    let options = DiscoveryOptions {
        pattern: pattern.to_owned(),
        max_files: (max_files > 0).then_some(max_files),
        ..Default::default()
    };
    let info = discover_files(dir, &options)?;
    if info.files.is_empty() {
        return Err(discovery_error("no compatible files found in directory"));
    }
    let headers = directory_header(session, &info, &FileOptions::with_jpath(jpath))?;
    Ok(DirectoryPreview {
        files: info
            .files
            .iter()
            .map(|f| relative_display(&info.root_path, f))
            .collect(),
        headers,
        total_files: info.total_files,
        total_size: info.total_size,
    })
}
