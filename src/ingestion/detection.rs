//! File type and compression detection.
//!
//! Resolution order for a path:
//! 1. a compression suffix (`.gz`, `.bz2`, `.xz`) is stripped and the inner extension decides
//!    the format;
//! 2. otherwise the magic bytes are sniffed. Any hit means CSV, whatever the name says, since
//!    the inner format cannot be read off the name (`FileOptions::detected_file_type` overrides);
//! 3. otherwise the extension maps to CSV / XLSX / JSON, or to a registered plugin.

use std::path::Path;

use crate::types::{CompressionType, FileType};

use super::compression::detect_compression_by_magic;
use super::plugin::PluginTable;

const COMPRESSION_SUFFIXES: &[(&str, CompressionType)] = &[
    (".gz", CompressionType::Gzip),
    (".bz2", CompressionType::Bzip2),
    (".xz", CompressionType::Xz),
];

/// Format implied by an extension (with leading dot, lower case).
fn type_for_extension(ext: &str, plugins: Option<&PluginTable>) -> FileType {
    match ext {
        ".csv" => FileType::Csv,
        ".xlsx" => FileType::Xlsx,
        ".json" => FileType::Json,
        _ if plugins.is_some_and(|t| t.for_extension(ext).is_some()) => FileType::Plugin,
        _ => FileType::Unknown,
    }
}

fn lower_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .filter(|n| !n.is_empty())
}

fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 => &name[i..],
        _ => "",
    }
}

/// Compression implied by the file name suffix alone.
pub fn compression_from_name(path: impl AsRef<Path>) -> CompressionType {
    lower_name(path.as_ref())
        .and_then(|name| {
            COMPRESSION_SUFFIXES
                .iter()
                .find(|(suffix, _)| name.ends_with(suffix))
                .map(|(_, c)| *c)
        })
        .unwrap_or_default()
}

/// Returns `true` if the name carries a known compression suffix.
pub fn is_compressed_file(path: impl AsRef<Path>) -> bool {
    compression_from_name(path) != CompressionType::None
}

/// Extension of the file once any compression suffix is removed (`a.csv.gz` -> `.csv`).
pub fn uncompressed_extension(path: impl AsRef<Path>) -> String {
    let Some(name) = lower_name(path.as_ref()) else {
        return String::new();
    };
    let inner = COMPRESSION_SUFFIXES
        .iter()
        .find_map(|(suffix, _)| name.strip_suffix(suffix))
        .unwrap_or(&name);
    extension_of(inner).to_owned()
}

/// Format and compression of `path`, without plugin lookup.
pub fn detect_file_type_and_compression(path: impl AsRef<Path>) -> (FileType, CompressionType) {
    detect_with_plugins(path.as_ref(), None)
}

/// Format and compression of `path`, consulting `plugins` for unknown extensions.
pub fn detect_file_type_and_compression_with_plugins(
    path: impl AsRef<Path>,
    plugins: &PluginTable,
) -> (FileType, CompressionType) {
    detect_with_plugins(path.as_ref(), Some(plugins))
}

/// Format of `path`, ignoring compression.
pub fn detect_file_type(path: impl AsRef<Path>) -> FileType {
    detect_file_type_and_compression(path).0
}

fn detect_with_plugins(path: &Path, plugins: Option<&PluginTable>) -> (FileType, CompressionType) {
    let Some(name) = lower_name(path) else {
        return (FileType::Unknown, CompressionType::None);
    };

    let by_name = compression_from_name(path);
    if by_name != CompressionType::None {
        return (type_for_extension(&uncompressed_extension(path), plugins), by_name);
    }

    match detect_compression_by_magic(path) {
        CompressionType::None => (type_for_extension(extension_of(&name), plugins), CompressionType::None),
        sniffed => (FileType::Csv, sniffed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::plugin::PluginInfo;

    #[test]
    fn plain_extensions() {
        assert_eq!(detect_file_type_and_compression("a/b.CSV"), (FileType::Csv, CompressionType::None));
        assert_eq!(detect_file_type_and_compression("b.xlsx"), (FileType::Xlsx, CompressionType::None));
        assert_eq!(detect_file_type_and_compression("b.json"), (FileType::Json, CompressionType::None));
        assert_eq!(detect_file_type_and_compression(""), (FileType::Unknown, CompressionType::None));
    }

    #[test]
    fn compression_suffix_reveals_inner_type() {
        assert_eq!(detect_file_type_and_compression("x.json.gz"), (FileType::Json, CompressionType::Gzip));
        assert_eq!(detect_file_type_and_compression("x.csv.bz2"), (FileType::Csv, CompressionType::Bzip2));
        assert_eq!(detect_file_type_and_compression("x.XLSX.xz"), (FileType::Xlsx, CompressionType::Xz));
        assert_eq!(detect_file_type_and_compression("x.gz"), (FileType::Unknown, CompressionType::Gzip));
    }

    #[test]
    fn suffix_helpers() {
        assert!(is_compressed_file("a.csv.gz"));
        assert!(!is_compressed_file("a.csv"));
        assert_eq!(uncompressed_extension("a.json.xz"), ".json");
        assert_eq!(uncompressed_extension("a.csv"), ".csv");
        assert_eq!(uncompressed_extension("noext"), "");
        assert_eq!(uncompressed_extension(".gz"), "");
    }

    #[test]
    fn plugin_extensions_are_recognized() {
        let mut table = PluginTable::new();
        table.register(PluginInfo::new("evtx", "EVTX", "/bin/evtx", &[".evtx"]));
        assert_eq!(
            detect_file_type_and_compression_with_plugins("Security.EVTX", &table),
            (FileType::Plugin, CompressionType::None)
        );
        assert_eq!(detect_file_type("Security.evtx"), FileType::Unknown);
    }
}
