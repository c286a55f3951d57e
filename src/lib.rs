//! `evidence-loader` reads heterogeneous evidence files into one uniform row model: a header of
//! strings plus [`types::Row`]s carrying a pre-parsed timestamp from a chosen column.
//!
//! The primary entrypoint is [`ingestion::FileReader`], which detects the source format from the
//! file name (or its compression magic bytes) and dispatches to the matching reader.
//!
//! ## What you can ingest
//!
//! **Sources:**
//!
//! - **CSV**: `.csv`, tolerant of ragged rows and invalid UTF-8
//! - **JSON**: `.json`, one document or a stream of documents, flattened through a JSONPath
//!   expression (`FileOptions::jpath`)
//! - **Excel** (requires the Cargo feature `excel`, on by default): `.xlsx`, first sheet only
//! - **Plugins**: any extension registered in the session's [`ingestion::PluginTable`], read by
//!   an external executable that speaks CSV
//! - **Directories**: every file matching a glob pattern, read as one union-schema table
//!
//! Any file may be wrapped in gzip, bzip2 or xz (`.gz`, `.bz2`, `.xz`, or detected by magic
//! bytes). Empty or whitespace header names become `Unnamed_A`, `Unnamed_B`, ...
//!
//! ## Quick example
//!
//! ```no_run
//! use evidence_loader::ingestion::FileReader;
//! use evidence_loader::{FileOptions, IngestSession};
//!
//! # fn main() -> Result<(), evidence_loader::IngestionError> {
//! let session = IngestSession::new();
//! let reader = FileReader::new(&session, "logs/auth.csv.gz", FileOptions::default());
//! let result = reader.read_rows()?;
//! println!("rows={} header={:?}", result.row_count(), result.header);
//! # Ok(())
//! # }
//! ```
//!
//! A directory of JSON exports, with the originating file appended as a column:
//!
//! ```no_run
//! use evidence_loader::ingestion::FileReader;
//! use evidence_loader::{FileOptions, IngestSession};
//!
//! # fn main() -> Result<(), evidence_loader::IngestionError> {
//! let session = IngestSession::new();
//! let mut options = FileOptions::directory("**/*.json");
//! options.jpath = "$.events".to_string();
//! options.include_source_column = true;
//! let result = FileReader::new(&session, "exports/", options).read_rows_with_sort(None, false)?;
//! println!("rows={}", result.row_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: the facade and the format-specific implementations
//! - [`cache`]: the row cache contract and an in-memory implementation
//! - [`session`]: shared state (cache, timestamp collaborator, plugins, warnings) and cancellation
//! - [`timestamps`]: time column detection and parsing
//! - [`types`]: options and the row model
//! - [`error`]: error types used across ingestion

pub mod cache;
pub mod error;
pub mod ingestion;
pub mod session;
pub mod timestamps;
pub mod types;

pub use error::{IngestionError, IngestionResult};
pub use session::{CancellationToken, IngestSession};
pub use types::{CompressionType, FileOptions, FileType, Row, StageResult};
