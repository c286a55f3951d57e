//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`FileReader`] (from [`unified`]) which:
//!
//! - resolves file vs. directory and the source format once, at construction
//! - reads rows into a [`crate::types::StageResult`], through the row cache for JSON
//! - optionally reports progress, warnings and success/failure/alerts to an [`IngestionObserver`]
//!
//! Lower-level pieces are also available under:
//! - [`detection`] and [`compression`] for type and compression sniffing
//! - [`csv`], [`json`] and `excel` (feature `excel`) for the built-in formats
//! - [`plugin`] for subprocess readers
//! - [`format`] for the per-format strategy and the dispatching proxy
//! - [`directory`] for union-schema directory reads

pub mod compression;
pub mod csv;
pub mod detection;
pub mod directory;
#[cfg(feature = "excel")]
pub mod excel;
pub mod format;
pub mod headers;
pub mod json;
pub mod json_path;
pub mod observability;
pub mod plugin;
pub mod unified;

pub use detection::{detect_file_type, detect_file_type_and_compression, is_compressed_file};
pub use directory::{DirectoryReader, DiscoveryOptions, discover_files, is_directory};
pub use format::{FormatReader, Input, RowStream, open_reader, read_header_for_path, row_count_for_path};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionProgress, IngestionSeverity,
    IngestionStats, TracingObserver,
};
pub use plugin::{PluginInfo, PluginTable};
pub use unified::{DEFAULT_PROGRESS_INTERVAL, FileReader, ReaderConfig};
